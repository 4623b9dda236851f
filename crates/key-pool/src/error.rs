//! Error types for gateway operations

use upstream::UpstreamError;

/// Terminal errors returned by `Gateway::execute`.
///
/// Per-attempt upstream failures never surface on their own; they are
/// absorbed by the retry loop and only reach the caller as the source of
/// `UpstreamExhausted`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("global rate limit exceeded ({cap} requests per minute)")]
    RateLimitExceeded { cap: u64 },

    #[error(
        "no usable API key: {total} configured, {cooling_down} cooling down, {at_limit} at daily limit"
    )]
    Exhausted {
        total: usize,
        cooling_down: usize,
        at_limit: usize,
    },

    #[error("all {attempts} upstream attempts failed, last error: {source}")]
    UpstreamExhausted {
        attempts: usize,
        #[source]
        source: UpstreamError,
    },
}

impl Error {
    /// Short label for metrics and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Error::Exhausted { .. } => "keys_exhausted",
            Error::UpstreamExhausted { .. } => "upstream_exhausted",
        }
    }
}

/// Result alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn upstream_exhausted_keeps_last_error_as_source() {
        let err = Error::UpstreamExhausted {
            attempts: 2,
            source: UpstreamError::Transport("connection refused".into()),
        };
        assert!(err.to_string().contains("all 2 upstream attempts failed"));
        let source = err.source().expect("source must be set");
        assert_eq!(source.to_string(), "transport error: connection refused");
    }

    #[test]
    fn exhausted_message_reports_counts() {
        let err = Error::Exhausted {
            total: 3,
            cooling_down: 2,
            at_limit: 1,
        };
        assert_eq!(
            err.to_string(),
            "no usable API key: 3 configured, 2 cooling down, 1 at daily limit"
        );
        assert_eq!(err.kind(), "keys_exhausted");
    }

    #[test]
    fn rate_limit_kind() {
        assert_eq!(
            Error::RateLimitExceeded { cap: 60 }.kind(),
            "rate_limit_exceeded"
        );
    }
}
