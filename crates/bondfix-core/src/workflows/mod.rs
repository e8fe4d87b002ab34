//! # Workflows Module
//!
//! High-level procedures built on top of the [`engine`](crate::engine).
//!
//! Workflows take a complete input system, drive the engine over all of it,
//! and return a new system together with a summary report. They emit progress
//! events through a [`ProgressReporter`](crate::engine::progress::ProgressReporter)
//! and structured `tracing` events, but never print anything themselves.
//!
//! - **Constrain Workflow** ([`constrain`]) - Snaps the bond lengths of every
//!   molecule in a system, re-solving one problem per distinct topology.

pub mod constrain;
