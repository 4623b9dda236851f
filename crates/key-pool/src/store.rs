//! Shared counter store
//!
//! All mutable gateway state (usage counters, cooldown markers, rate windows)
//! lives in one `CounterStore`. Each operation is atomic per key and every
//! entry carries an absolute expiry, so state resets itself at period and
//! window boundaries without a reset job.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;

/// Atomic integer counters with per-entry expiry.
///
/// Expired entries behave exactly like missing ones. Implementations must make
/// each individual call atomic; sequences of calls are not transactional.
pub trait CounterStore: Send + Sync {
    /// Add one to `key` and return the new value. Expiry moves to `expire_at`.
    /// An absent or expired entry restarts at 1.
    fn incr(&self, key: &str, expire_at: DateTime<Utc>) -> u64;

    /// Current value of `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<u64>;

    /// Overwrite `key` with `value` and expiry `expire_at`.
    fn set(&self, key: &str, value: u64, expire_at: DateTime<Utc>);
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expire_at: DateTime<Utc>,
}

/// In-process store backed by a sharded concurrent map.
///
/// Per-key atomicity comes from the shard lock held by `DashMap::entry` for the
/// duration of one call. Expired entries are dropped lazily on access and by
/// `purge_expired`.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expire_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired counter entries");
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CounterStore for MemoryStore {
    fn incr(&self, key: &str, expire_at: DateTime<Utc>) -> u64 {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: 0,
            expire_at,
        });
        if entry.expire_at <= now {
            entry.value = 0;
        }
        entry.value += 1;
        entry.expire_at = expire_at;
        entry.value
    }

    fn get(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        // Copy out before touching the map again: holding a read guard while
        // removing from the same shard would deadlock.
        let found = self.entries.get(key).map(|e| *e);
        match found {
            Some(e) if e.expire_at > now => Some(e.value),
            Some(_) => {
                self.entries.remove_if(key, |_, e| e.expire_at <= now);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: u64, expire_at: DateTime<Utc>) {
        self.entries
            .insert(key.to_string(), Entry { value, expire_at });
    }
}
