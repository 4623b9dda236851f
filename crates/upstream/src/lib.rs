//! Upstream text-generation abstraction
//!
//! Defines the `Upstream` trait that decouples the key pool from the concrete
//! provider wire format. The gateway hands an API key and a prompt to the
//! upstream and gets back either a completion or an `UpstreamError`. Every
//! error variant is a per-attempt failure: the gateway cools the key down and
//! rotates to the next one.

pub mod gemini;

pub use gemini::GeminiUpstream;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Errors from a single upstream attempt.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("upstream timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed upstream response: {0}")]
    Malformed(String),

    #[error("upstream returned an empty completion")]
    Empty,
}

impl UpstreamError {
    /// Short label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Transport(_) => "transport",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Status { .. } => "status",
            UpstreamError::Malformed(_) => "malformed",
            UpstreamError::Empty => "empty",
        }
    }
}

/// Result alias for upstream operations.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// A text-generation service reachable with one of several API keys.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Upstream>`).
pub trait Upstream: Send + Sync {
    /// Identifier for logging (e.g. "gemini")
    fn id(&self) -> &str;

    /// Run one completion with the given API key.
    ///
    /// Implementations do not retry and do not remember keys between calls.
    fn complete<'a>(
        &'a self,
        api_key: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}
