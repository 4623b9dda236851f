//! Per-key daily usage counters
//!
//! One counter per (key index, period). The counter's expiry is pinned to the
//! next period boundary on every increment, so a new period starts from zero
//! without anyone resetting it.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::period::Period;
use crate::store::CounterStore;

pub struct QuotaLedger {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    period: Period,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, period: Period) -> Self {
        Self {
            store,
            clock,
            period,
        }
    }

    /// Count one call against `index` for the current period and return the new total.
    pub fn record_usage(&self, index: usize) -> u64 {
        let now = self.clock.now();
        let count = self
            .store
            .incr(&self.key(index, now), self.period.next_boundary(now));
        debug!(credential = index, usage = count, "recorded key usage");
        count
    }

    /// Calls counted against `index` in the current period.
    pub fn usage(&self, index: usize) -> u64 {
        let now = self.clock.now();
        self.store.get(&self.key(index, now)).unwrap_or(0)
    }

    /// Current period key, e.g. `2024-06-01`.
    pub fn current_period(&self) -> String {
        self.period.key(self.clock.now())
    }

    fn key(&self, index: usize, now: chrono::DateTime<chrono::Utc>) -> String {
        format!("usage:{index}:{}", self.period.key(now))
    }
}
