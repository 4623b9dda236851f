//! Quota-aware multi-key gateway
//!
//! Spreads calls to a quota-metered text-generation upstream across several
//! API keys. Per call the gateway:
//! 1. checks a global per-minute admission window shared by all keys;
//! 2. picks a key from ledger and cooldown state (no remembered rotation index);
//! 3. calls upstream, then counts usage on success or cools the key down on failure;
//! 4. rotates to the next usable key on failure, at most once per configured key.
//!
//! Key lifecycle within one quota period (a calendar day in the reference timezone):
//! 1. Key starts the period with zero usage
//! 2. Usage reaches `ceil(daily_limit * threshold_percent / 100)` → cooling down
//! 3. Any failed upstream call with the key → cooling down
//! 4. Both cooldowns end at the next period boundary, together with the usage reset
//!
//! All state lives in a `CounterStore` whose entries expire on their own at
//! period and window boundaries; there is no reset job and no mutex around the
//! select → call → record sequence. Individual store operations are atomic, but
//! the sequence is not: concurrent callers may select the same key before any
//! of them records usage, so a key can overshoot its threshold by up to the
//! number of racing callers. Daily limits are therefore soft limits.
//!
//! Dropping an `execute` future abandons the in-flight attempt without
//! touching the ledger or cooldowns.

pub mod clock;
pub mod cooldown;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod limits;
pub mod period;
pub mod rate_limit;
pub mod selector;
pub mod stats;
pub mod store;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{CooldownReason, CooldownRegistry};
pub use error::{Error, Result};
pub use gateway::Gateway;
pub use ledger::QuotaLedger;
pub use limits::Limits;
pub use period::Period;
pub use rate_limit::RateLimiter;
pub use selector::{KeySelector, KeyState};
pub use stats::{KeyUsage, PoolHealth, PoolStatus};
pub use store::{CounterStore, MemoryStore};
pub use sweep::spawn_sweep_task;
