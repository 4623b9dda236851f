//! Stateless key selection
//!
//! Selection is a pure function of the ledger and cooldown state: no "current
//! key" is remembered between calls, so any number of processes sharing the
//! same store agree on which key to use.
//!
//! Order of preference:
//! 1. the first key (configured order) not cooling down with usage below the
//!    rotation threshold;
//! 2. otherwise the least-used key not cooling down, if it is still below the
//!    daily limit (first in configured order on ties);
//! 3. otherwise the pool is exhausted.

use crate::cooldown::CooldownRegistry;
use crate::error::{Error, Result};
use crate::ledger::QuotaLedger;

/// Point-in-time view of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pub usage: u64,
    pub in_cooldown: bool,
}

/// Chooses a key index from ledger and cooldown state.
#[derive(Debug, Clone, Copy)]
pub struct KeySelector {
    key_count: usize,
    threshold: u64,
    daily_limit: u64,
}

impl KeySelector {
    pub fn new(key_count: usize, threshold: u64, daily_limit: u64) -> Self {
        Self {
            key_count,
            threshold,
            daily_limit,
        }
    }

    /// Select a key for the next upstream call.
    pub fn select(&self, ledger: &QuotaLedger, cooldowns: &CooldownRegistry) -> Result<usize> {
        let states = self.snapshot(ledger, cooldowns);
        choose(&states, self.threshold, self.daily_limit).ok_or_else(|| {
            let cooling_down = states.iter().filter(|s| s.in_cooldown).count();
            let at_limit = states
                .iter()
                .filter(|s| !s.in_cooldown && s.usage >= self.daily_limit)
                .count();
            Error::Exhausted {
                total: states.len(),
                cooling_down,
                at_limit,
            }
        })
    }

    /// Read the state of every key, in configured order.
    pub fn snapshot(&self, ledger: &QuotaLedger, cooldowns: &CooldownRegistry) -> Vec<KeyState> {
        (0..self.key_count)
            .map(|index| KeyState {
                usage: ledger.usage(index),
                in_cooldown: cooldowns.is_in_cooldown(index),
            })
            .collect()
    }
}

/// Pick a key index from a snapshot, or `None` if no key is usable.
pub fn choose(states: &[KeyState], threshold: u64, daily_limit: u64) -> Option<usize> {
    let usable = || {
        states
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.in_cooldown)
    };

    if let Some((index, _)) = usable().find(|(_, s)| s.usage < threshold) {
        return Some(index);
    }

    // min_by_key keeps the first minimum, so configured order breaks ties
    usable()
        .min_by_key(|(_, s)| s.usage)
        .filter(|(_, s)| s.usage < daily_limit)
        .map(|(index, _)| index)
}
