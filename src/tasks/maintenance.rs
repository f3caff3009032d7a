//! Maintenance Task
//!
//! Background task that periodically sweeps idle-expired entries across all
//! registered caches. Expiry is also enforced opportunistically on every
//! store operation; the sweep keeps rarely touched caches from holding
//! expired entries indefinitely.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::CacheEngine;

/// Spawns a background task that periodically evicts expired entries.
///
/// The task runs in an infinite loop, sleeping for the specified interval
/// between sweeps.
///
/// # Arguments
/// * `engine` - The engine whose caches are swept
/// * `sweep_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_sweep_task(engine: Arc<CacheEngine>, sweep_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(sweep_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting maintenance sweep task with interval of {} seconds",
            sweep_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let evicted = engine.sweep_expired().await;
            if evicted > 0 {
                info!("Maintenance sweep: evicted {} expired entries", evicted);
            } else {
                debug!("Maintenance sweep: no expired entries found");
            }
        }
    })
}
