//! Global fixed-window admission
//!
//! One counter per UTC minute shared by every key. Admission fails fast: a
//! rejected request is neither queued nor delayed.

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::period::{minute_end, minute_key};
use crate::store::CounterStore;

/// How long a window counter outlives its minute.
const WINDOW_GRACE_SECS: i64 = 5;

pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    cap: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, cap: u64) -> Self {
        Self { store, clock, cap }
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Count this request against the current minute and decide admission.
    ///
    /// Rejected requests still bump the counter, so the count can pass the cap,
    /// but no more than `cap` requests per minute are ever admitted.
    pub fn admit(&self) -> bool {
        let now = self.clock.now();
        let expire_at = minute_end(now) + TimeDelta::seconds(WINDOW_GRACE_SECS);
        let count = self
            .store
            .incr(&format!("rate:{}", minute_key(now)), expire_at);

        if count <= self.cap {
            debug!(count, cap = self.cap, "request admitted");
            metrics::counter!("gateway_admission_total", "outcome" => "admitted").increment(1);
            true
        } else {
            warn!(count, cap = self.cap, "global rate limit reached, rejecting request");
            metrics::counter!("gateway_admission_total", "outcome" => "rejected").increment(1);
            false
        }
    }

    /// Requests counted in the current minute, admitted or not.
    pub fn current(&self) -> u64 {
        let now = self.clock.now();
        self.store
            .get(&format!("rate:{}", minute_key(now)))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn limiter(cap: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new("2024-06-01T12:00:10Z".parse().unwrap()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (clock.clone(), RateLimiter::new(store, clock, cap))
    }

    #[test]
    fn admits_cap_and_rejects_cap_plus_one() {
        let (_clock, limiter) = limiter(3);
        assert!(limiter.admit());
        assert!(limiter.admit());
        assert!(limiter.admit(), "the cap-th request is admitted");
        assert!(!limiter.admit(), "the (cap+1)-th request is rejected");
        assert!(!limiter.admit());
        assert_eq!(limiter.current(), 5);
    }

    #[test]
    fn new_minute_opens_new_window() {
        let (clock, limiter) = limiter(1);
        assert!(limiter.admit());
        assert!(!limiter.admit());

        clock.set("2024-06-01T12:01:00Z".parse().unwrap());
        assert!(limiter.admit());
        assert_eq!(limiter.current(), 1);
    }

    #[test]
    fn zero_cap_rejects_everything() {
        let (_clock, limiter) = limiter(0);
        assert!(!limiter.admit());
    }
}
