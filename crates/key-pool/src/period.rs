//! Quota period and rate window arithmetic
//!
//! A quota period is one calendar day in a reference timezone. The upstream
//! provider resets daily quotas at its own midnight, which need not be UTC
//! midnight, so period keys and boundaries are computed in that zone. Rate
//! windows are plain UTC minutes.

use chrono::{DateTime, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

/// Step used to walk forward out of a DST gap when local midnight does not exist.
const GAP_PROBE_STEP_MINUTES: i64 = 15;

/// Daily quota period in a fixed reference timezone.
#[derive(Debug, Clone, Copy)]
pub struct Period {
    tz: Tz,
}

impl Period {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Local calendar date of `now` as `YYYY-MM-DD`.
    pub fn key(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.tz)
            .date_naive()
            .format("%Y-%m-%d")
            .to_string()
    }

    /// First instant of the next local day.
    ///
    /// If local midnight is skipped by a DST transition, the first valid local
    /// time after it is used. If it occurs twice, the earlier one wins.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.with_timezone(&self.tz).date_naive();
        let tomorrow = today.succ_opt().unwrap_or(today);
        self.resolve_local(tomorrow.and_time(NaiveTime::MIN))
    }

    /// Time left until the next boundary, never negative.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        (self.next_boundary(now) - now).max(TimeDelta::zero())
    }

    fn resolve_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let step = TimeDelta::minutes(GAP_PROBE_STEP_MINUTES);
        let mut probe = local;
        // DST gaps are at most a few hours; a day of probing is plenty.
        for _ in 0..(24 * 60 / GAP_PROBE_STEP_MINUTES) {
            if let Some(t) = self.tz.from_local_datetime(&probe).earliest() {
                return t.with_timezone(&Utc);
            }
            probe += step;
        }
        Utc.from_utc_datetime(&local)
    }
}

/// UTC minute of `now` as `YYYYMMDDHHMM`.
pub fn minute_key(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

/// First instant of the UTC minute after `now`.
pub fn minute_end(now: DateTime<Utc>) -> DateTime<Utc> {
    let secs = now.timestamp();
    let start = secs - secs.rem_euclid(60);
    DateTime::from_timestamp(start + 60, 0).unwrap_or(now + TimeDelta::minutes(1))
}
