//! Project configuration, on-disk layout, and run context.
//!
//! A project root holds the registry, the reference image, and the build
//! directory with rebuilt objects. An optional `matchcheck.yaml` (or `.yml` /
//! `.json`) at the root overrides the default locations and comparison knobs.

mod config;
mod context;
mod layout;

pub use config::*;
pub use context::*;
pub use layout::*;
