//! HTTP-facing errors
//!
//! Maps gateway failures onto status codes and the JSON error envelope
//! `{"error":{"type","message","request_id"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Gateway(#[from] key_pool::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Gateway(key_pool::Error::RateLimitExceeded { .. }) => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ApiError::Gateway(key_pool::Error::Exhausted { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Gateway(key_pool::Error::UpstreamExhausted { .. }) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Value of the `type` field in the error body.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Gateway(e) => e.kind(),
        }
    }

    /// Render as a JSON error response tagged with `request_id`.
    pub fn into_response_with_id(self, request_id: &str) -> Response {
        error_response(self.status(), self.kind(), &self.to_string(), request_id)
    }
}

pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (status, axum::Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use upstream::UpstreamError;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn status_codes_per_variant() {
        assert_eq!(
            ApiError::InvalidRequest("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(key_pool::Error::RateLimitExceeded { cap: 10 }).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(key_pool::Error::Exhausted {
                total: 2,
                cooling_down: 2,
                at_limit: 0
            })
            .status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(key_pool::Error::UpstreamExhausted {
                attempts: 2,
                source: UpstreamError::Empty,
            })
            .status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[tokio::test]
    async fn error_body_carries_type_message_and_request_id() {
        let err = ApiError::from(key_pool::Error::RateLimitExceeded { cap: 10 });
        let response = err.into_response_with_id("req_abc");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "rate_limit_exceeded");
        assert_eq!(json["error"]["request_id"], "req_abc");
        assert!(
            json["error"]["message"]
                .as_str()
                .unwrap()
                .contains("10 requests per minute")
        );
    }

    #[tokio::test]
    async fn invalid_request_is_400_with_its_message() {
        let response = ApiError::InvalidRequest("prompt must not be empty".into())
            .into_response_with_id("req_empty");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert_eq!(json["error"]["type"], "invalid_request");
        assert_eq!(
            json["error"]["message"],
            "invalid request: prompt must not be empty"
        );
        assert_eq!(json["error"]["request_id"], "req_empty");
    }
}
