//! Usage statistics for monitoring and admin surfaces

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Per-key usage row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyUsage {
    pub credential_index: usize,
    pub usage_today: u64,
    pub limit: u64,
    pub threshold: u64,
    pub in_cooldown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    /// The key the selector would hand out right now
    pub is_current: bool,
}

impl KeyUsage {
    /// Usable for at least one more call this period.
    pub fn is_available(&self) -> bool {
        !self.in_cooldown && self.usage_today < self.limit
    }
}

/// Overall pool status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Every key is usable
    Healthy,
    /// Some keys are usable
    Degraded,
    /// No key is usable
    Unhealthy,
}

impl PoolStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PoolStatus::Healthy => "healthy",
            PoolStatus::Degraded => "degraded",
            PoolStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Pool summary for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PoolHealth {
    pub status: PoolStatus,
    pub period: String,
    pub keys_total: usize,
    pub keys_available: usize,
    pub keys_cooling_down: usize,
    pub keys_at_limit: usize,
    pub requests_this_minute: u64,
    pub per_minute_cap: u64,
}

impl PoolHealth {
    /// Summarize per-key rows.
    pub fn from_usage(
        keys: &[KeyUsage],
        period: String,
        requests_this_minute: u64,
        per_minute_cap: u64,
    ) -> Self {
        let keys_total = keys.len();
        let keys_available = keys.iter().filter(|k| k.is_available()).count();
        let keys_cooling_down = keys.iter().filter(|k| k.in_cooldown).count();
        let keys_at_limit = keys
            .iter()
            .filter(|k| !k.in_cooldown && k.usage_today >= k.limit)
            .count();

        let status = if keys_total > 0 && keys_available == keys_total {
            PoolStatus::Healthy
        } else if keys_available > 0 {
            PoolStatus::Degraded
        } else {
            PoolStatus::Unhealthy
        };

        Self {
            status,
            period,
            keys_total,
            keys_available,
            keys_cooling_down,
            keys_at_limit,
            requests_this_minute,
            per_minute_cap,
        }
    }
}
