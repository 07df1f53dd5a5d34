//! Verification services: extraction, attribution, comparison, orchestration.

pub mod backends;
pub mod equivalence;
pub mod extract;
pub mod resolve;
pub mod verify;
