//! Engine Module
//!
//! Registration lifecycle and the engine facade that lookups, refreshes,
//! snapshots, and statistics go through.

#[allow(clippy::module_inception)]
mod engine;
mod facade;
mod registration;

// Re-export public types
pub use engine::CacheEngine;
pub use facade::{CacheLookup, FacadeSink, GlobalVariableStore};
pub use registration::Registration;
