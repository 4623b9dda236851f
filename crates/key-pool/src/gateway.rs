//! Request executor
//!
//! `Gateway::execute` is the only entry point consumers use:
//!
//! 1. global admission (fail fast with `RateLimitExceeded`);
//! 2. up to one attempt per configured key: select, call upstream, then either
//!    record usage (success) or cool the key down (failure) and rotate;
//! 3. `UpstreamExhausted` with the last upstream error once every attempt failed.
//!
//! Nothing here sleeps or retries beyond that loop.

use std::sync::Arc;

use common::Secret;
use tracing::{debug, info, instrument, warn};
use upstream::{Upstream, UpstreamError};

use crate::clock::{Clock, SystemClock};
use crate::cooldown::{CooldownReason, CooldownRegistry};
use crate::error::{Error, Result};
use crate::ledger::QuotaLedger;
use crate::limits::Limits;
use crate::period::Period;
use crate::rate_limit::RateLimiter;
use crate::selector::KeySelector;
use crate::stats::{KeyUsage, PoolHealth};
use crate::store::{CounterStore, MemoryStore};

/// Quota-aware multi-key gateway in front of one upstream.
pub struct Gateway {
    keys: Vec<Secret<String>>,
    upstream: Arc<dyn Upstream>,
    limits: Limits,
    clock: Arc<dyn Clock>,
    period: Period,
    ledger: QuotaLedger,
    cooldowns: CooldownRegistry,
    rate_limiter: RateLimiter,
    selector: KeySelector,
}

impl Gateway {
    /// Gateway over a fresh in-process store and the system clock.
    pub fn new(keys: Vec<Secret<String>>, upstream: Arc<dyn Upstream>, limits: Limits) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::with_store(keys, upstream, limits, store, clock)
    }

    /// Gateway over a caller-provided store and clock.
    ///
    /// Several gateways sharing one store share quota, cooldown and rate state.
    pub fn with_store(
        keys: Vec<Secret<String>>,
        upstream: Arc<dyn Upstream>,
        limits: Limits,
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let period = Period::new(limits.timezone);
        let ledger = QuotaLedger::new(store.clone(), clock.clone(), period);
        let cooldowns = CooldownRegistry::new(store.clone(), clock.clone(), limits.cooldown_margin);
        let rate_limiter = RateLimiter::new(store, clock.clone(), limits.per_minute_cap);
        let selector = KeySelector::new(keys.len(), limits.threshold(), limits.daily_limit);

        info!(
            keys = keys.len(),
            upstream = upstream.id(),
            daily_limit = limits.daily_limit,
            threshold = limits.threshold(),
            per_minute_cap = limits.per_minute_cap,
            timezone = %limits.timezone,
            "gateway initialized"
        );

        Self {
            keys,
            upstream,
            limits,
            clock,
            period,
            ledger,
            cooldowns,
            rate_limiter,
            selector,
        }
    }

    /// Run one completion through the pool.
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    pub async fn execute(&self, prompt: &str) -> Result<String> {
        if !self.rate_limiter.admit() {
            return Err(Error::RateLimitExceeded {
                cap: self.rate_limiter.cap(),
            });
        }

        let max_attempts = self.keys.len();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            let index = self.select_key()?;
            debug!(attempt, credential = index, "attempting upstream call");

            match self.call_upstream(index, prompt).await {
                Ok(completion) => {
                    self.on_success(index);
                    return Ok(completion);
                }
                Err(e) => {
                    warn!(
                        attempt,
                        credential = index,
                        error = %e,
                        "upstream attempt failed, rotating key"
                    );
                    metrics::counter!("gateway_upstream_attempts_total", "outcome" => e.kind())
                        .increment(1);
                    self.cooldowns.put_in_cooldown(
                        index,
                        self.next_boundary(),
                        CooldownReason::Failure,
                    );
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(source) => {
                warn!(attempts = max_attempts, error = %source, "all upstream attempts failed");
                Err(Error::UpstreamExhausted {
                    attempts: max_attempts,
                    source,
                })
            }
            // Only reachable with an empty key list
            None => Err(Error::Exhausted {
                total: 0,
                cooling_down: 0,
                at_limit: 0,
            }),
        }
    }

    /// Key index the next call would use.
    pub fn select_key(&self) -> Result<usize> {
        self.selector.select(&self.ledger, &self.cooldowns)
    }

    /// Per-key usage rows, in configured order.
    pub fn usage_stats(&self) -> Vec<KeyUsage> {
        let current = self.select_key().ok();
        let threshold = self.limits.threshold();
        (0..self.keys.len())
            .map(|index| {
                let cooldown_until = self.cooldowns.cooldown_until(index);
                KeyUsage {
                    credential_index: index,
                    usage_today: self.ledger.usage(index),
                    limit: self.limits.daily_limit,
                    threshold,
                    in_cooldown: cooldown_until.is_some(),
                    cooldown_until,
                    is_current: current == Some(index),
                }
            })
            .collect()
    }

    /// Pool summary derived from `usage_stats`.
    pub fn health(&self) -> PoolHealth {
        PoolHealth::from_usage(
            &self.usage_stats(),
            self.ledger.current_period(),
            self.rate_limiter.current(),
            self.rate_limiter.cap(),
        )
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn ledger(&self) -> &QuotaLedger {
        &self.ledger
    }

    pub fn cooldowns(&self) -> &CooldownRegistry {
        &self.cooldowns
    }

    async fn call_upstream(
        &self,
        index: usize,
        prompt: &str,
    ) -> std::result::Result<String, UpstreamError> {
        let timeout = self.limits.attempt_timeout;
        let call = self.upstream.complete(self.keys[index].expose(), prompt);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(completion)) if completion.trim().is_empty() => Err(UpstreamError::Empty),
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }

    fn on_success(&self, index: usize) {
        metrics::counter!("gateway_upstream_attempts_total", "outcome" => "success").increment(1);
        let usage = self.ledger.record_usage(index);
        let threshold = self.limits.threshold();
        if usage >= threshold {
            info!(
                credential = index,
                usage,
                threshold,
                "key reached rotation threshold"
            );
            self.cooldowns
                .put_in_cooldown(index, self.next_boundary(), CooldownReason::Threshold);
        }
    }

    fn next_boundary(&self) -> chrono::DateTime<chrono::Utc> {
        self.period.next_boundary(self.clock.now())
    }
}
