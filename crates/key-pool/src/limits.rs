//! Immutable gateway limits

use std::time::Duration;

use chrono_tz::Tz;

use crate::cooldown::DEFAULT_MARGIN;

/// Quota and rate limits, fixed at startup.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Calls each key may make per period
    pub daily_limit: u64,
    /// Percentage of `daily_limit` at which a key is retired for the period (0-100)
    pub threshold_percent: u8,
    /// Admitted requests per UTC minute across all keys
    pub per_minute_cap: u64,
    /// Timezone whose midnight ends a quota period
    pub timezone: Tz,
    /// How long cooldown markers are kept past their end
    pub cooldown_margin: Duration,
    /// Upper bound on a single upstream attempt
    pub attempt_timeout: Duration,
}

impl Limits {
    /// Usage at which a key is preemptively cooled down:
    /// `ceil(daily_limit * threshold_percent / 100)`.
    pub fn threshold(&self) -> u64 {
        let percent = u64::from(self.threshold_percent.min(100));
        self.daily_limit.saturating_mul(percent).div_ceil(100)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            daily_limit: 1000,
            threshold_percent: 95,
            per_minute_cap: 60,
            timezone: chrono_tz::America::Los_Angeles,
            cooldown_margin: DEFAULT_MARGIN,
            attempt_timeout: Duration::from_secs(60),
        }
    }
}
