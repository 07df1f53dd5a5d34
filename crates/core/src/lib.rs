//! matchcheck-core
//!
//! Core library for checking rebuilt functions against a reference binary,
//! instruction by instruction.
//!
//! This crate defines the data model, the registry loader, extraction
//! backends, object attribution, the equivalence rules, and the orchestrator
//! that turns a registry into a report.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends.

pub mod model;
pub mod project;
pub mod registry;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
