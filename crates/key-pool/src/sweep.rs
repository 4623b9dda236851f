//! Background sweep of expired store entries
//!
//! Expired entries already read as absent, so the sweep never changes what
//! the gateway sees. It only bounds memory: rate windows are written once a
//! minute and never read again after their minute ends.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::store::MemoryStore;

/// Spawn a task that purges expired entries from `store` every `interval`.
///
/// Returns a `JoinHandle` for the spawned task.
pub fn spawn_sweep_task(store: Arc<MemoryStore>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // Skip the immediate first tick, the store was just created
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = store.purge_expired();
            debug!(removed, remaining = store.len(), "store sweep finished");
        }
    })
}
