//! Per-key cooldown markers
//!
//! A cooldown marker stores the instant (unix millis) at which a key becomes
//! usable again. The key is cooling down only while `now < until`; the store
//! keeps the marker a little longer (`margin`) so clock skew between writers
//! cannot resurrect a key early, and then lets it expire.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::info;

use crate::clock::Clock;
use crate::store::CounterStore;

/// Default retention of a marker past its `until` instant.
pub const DEFAULT_MARGIN: Duration = Duration::from_secs(3600);

/// Why a key was put in cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownReason {
    /// Usage reached the rotation threshold after a successful call
    Threshold,
    /// An upstream call with this key failed
    Failure,
}

impl CooldownReason {
    pub fn label(&self) -> &'static str {
        match self {
            CooldownReason::Threshold => "threshold",
            CooldownReason::Failure => "failure",
        }
    }
}

pub struct CooldownRegistry {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    margin: TimeDelta,
}

impl CooldownRegistry {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, margin: Duration) -> Self {
        Self {
            store,
            clock,
            margin: TimeDelta::from_std(margin).unwrap_or(TimeDelta::hours(1)),
        }
    }

    /// Mark `index` unusable until `until`.
    pub fn put_in_cooldown(&self, index: usize, until: DateTime<Utc>, reason: CooldownReason) {
        let millis = u64::try_from(until.timestamp_millis()).unwrap_or(0);
        self.store.set(&key(index), millis, until + self.margin);
        info!(
            credential = index,
            until = %until,
            reason = reason.label(),
            "key entering cooldown"
        );
        metrics::counter!("gateway_key_cooldowns_total", "reason" => reason.label()).increment(1);
    }

    /// End of the live cooldown for `index`, if any.
    pub fn cooldown_until(&self, index: usize) -> Option<DateTime<Utc>> {
        let millis = self.store.get(&key(index))?;
        let until = DateTime::from_timestamp_millis(i64::try_from(millis).ok()?)?;
        (self.clock.now() < until).then_some(until)
    }

    pub fn is_in_cooldown(&self, index: usize) -> bool {
        self.cooldown_until(index).is_some()
    }
}

fn key(index: usize) -> String {
    format!("cooldown:{index}")
}
