//! grader-core
//!
//! Core library for grading fragment-based programming exercises.
//!
//! An exercise is a set of named code fragments, some of which a student may
//! edit. This crate reassembles the fragments (with the student's edits) into
//! complete source files, drives them through a staged build
//! (compile, static call check, link, run) and accumulates a per-phase report.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends (CLI, sandbox-side services, etc.).

pub mod check;
pub mod config;
pub mod db;
pub mod error;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod services;

pub use error::{BuildError, ConfigurationError};

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
