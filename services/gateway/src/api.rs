//! Completion and admin handlers

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
struct CompleteResponse {
    completion: String,
    request_id: String,
}

/// `POST /v1/complete`
pub(crate) async fn complete_handler(
    State(state): State<AppState>,
    body: Result<Json<CompleteRequest>, JsonRejection>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    complete(&state, body, request_id).await
}

#[instrument(skip_all, fields(request_id = %request_id))]
async fn complete(
    state: &AppState,
    body: Result<Json<CompleteRequest>, JsonRejection>,
    request_id: String,
) -> Response {
    let _in_flight = state.metrics.track();
    let started = Instant::now();

    let result = match body {
        Err(rejection) => Err(ApiError::InvalidRequest(rejection.body_text())),
        Ok(Json(req)) if req.prompt.trim().is_empty() => {
            Err(ApiError::InvalidRequest("prompt must not be empty".into()))
        }
        Ok(Json(req)) => state
            .gateway
            .execute(&req.prompt)
            .await
            .map_err(ApiError::from),
    };

    let response = match result {
        Ok(completion) => {
            info!(
                completion_len = completion.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "completion served"
            );
            (
                StatusCode::OK,
                Json(CompleteResponse {
                    completion,
                    request_id,
                }),
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.errors_total.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, kind = e.kind(), "completion failed");
            e.into_response_with_id(&request_id)
        }
    };

    crate::metrics::record_request(response.status().as_u16(), started.elapsed().as_secs_f64());
    response
}

/// `GET /admin/usage`
pub(crate) async fn usage_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "keys": state.gateway.usage_stats(),
    }))
}
