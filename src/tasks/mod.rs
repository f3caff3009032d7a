//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Maintenance sweep: evicts idle-expired entries across all caches at
//!   configured intervals

mod maintenance;

pub use maintenance::spawn_sweep_task;
