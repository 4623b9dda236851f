//! Process-level counters and shutdown timing

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Extra drain time on top of the worst-case completion.
pub const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// How long in-flight requests may run after a shutdown signal.
///
/// A completion may try every key, each bounded by `attempt_timeout`, so the
/// window covers that worst case. A request cut off anyway is not recorded in
/// the ledger even if upstream already charged the key.
pub fn drain_timeout(attempt_timeout: Duration, key_count: usize) -> Duration {
    let attempts = u32::try_from(key_count).unwrap_or(u32::MAX);
    attempt_timeout.saturating_mul(attempts).saturating_add(DRAIN_GRACE)
}

/// Runtime metrics tracked while the service is running
#[derive(Debug, Clone)]
pub struct ServiceMetrics {
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    /// Requests currently being processed, reported when the drain deadline expires
    pub in_flight: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    /// Count a new request as in flight until the guard drops.
    ///
    /// The guard also covers handlers cancelled by a client disconnect.
    pub fn track(&self) -> InFlightGuard {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
        }
    }
}

pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
