//! Quota Gateway
//!
//! Single-binary Rust service that:
//! 1. Loads a pool of Gemini API keys and daily quota settings
//! 2. Admits requests against a global per-minute cap
//! 3. Routes each completion to a key with quota left, rotating on failure
//! 4. Reports per-key usage, pool health and Prometheus metrics

mod api;
mod config;
mod error;
mod metrics;
mod service;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use key_pool::{Clock, Gateway, MemoryStore, PoolStatus, SystemClock};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upstream::GeminiUpstream;

use crate::config::Config;
use crate::service::{ServiceMetrics, drain_timeout};

/// How often expired counters are purged from the in-process store.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    gateway: Arc<Gateway>,
    metrics: ServiceMetrics,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` bounds the number of requests handled concurrently.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/v1/complete", post(api::complete_handler))
        .route("/admin/usage", get(api::usage_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting quota-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let mut config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let limits = config.limits().context("invalid [quota] section")?;

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.upstream.base_url,
        model = %config.upstream.model,
        keys = config.api_keys.len(),
        "configuration loaded"
    );

    let upstream = Arc::new(GeminiUpstream::new(
        reqwest::Client::new(),
        config.upstream.base_url.clone(),
        config.upstream.model.clone(),
        limits.attempt_timeout,
    ));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(MemoryStore::new(clock.clone()));
    let gateway = Gateway::with_store(
        std::mem::take(&mut config.api_keys),
        upstream,
        limits,
        store.clone(),
        clock,
    );
    let sweep_handle = key_pool::spawn_sweep_task(store, SWEEP_INTERVAL);
    let drain_window = drain_timeout(gateway.limits().attempt_timeout, gateway.key_count());

    let metrics = ServiceMetrics::new();
    let app_state = AppState {
        gateway: Arc::new(gateway),
        metrics: metrics.clone(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;

    info!(
        addr = %listen_addr,
        drain_timeout_secs = drain_window.as_secs(),
        "accepting requests"
    );

    let in_flight = metrics.in_flight.clone();

    // The drain timeout starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;

    let _ = shutdown_tx.send(());

    match tokio::time::timeout(drain_window, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = drain_window.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    sweep_handle.abort();

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: pool summary plus process counters.
/// Returns 200 while at least one key is usable, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.gateway.health();
    let status_code = match pool.status {
        PoolStatus::Unhealthy => axum::http::StatusCode::SERVICE_UNAVAILABLE,
        PoolStatus::Healthy | PoolStatus::Degraded => axum::http::StatusCode::OK,
    };

    let body = serde_json::json!({
        "status": pool.status,
        "period": pool.period,
        "keys_total": pool.keys_total,
        "keys_available": pool.keys_available,
        "keys_cooling_down": pool.keys_cooling_down,
        "keys_at_limit": pool.keys_at_limit,
        "requests_this_minute": pool.requests_this_minute,
        "per_minute_cap": pool.per_minute_cap,
        "uptime_seconds": state.metrics.started_at.elapsed().as_secs(),
        "requests_served": state.metrics.requests_total.load(Ordering::Relaxed),
        "errors_total": state.metrics.errors_total.load(Ordering::Relaxed),
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::Secret;
    use key_pool::Limits;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use upstream::{Upstream, UpstreamError};

    /// Upstream that answers every call the same way and records the keys it saw.
    pub(crate) struct FakeUpstream {
        reply: Option<String>,
        keys_used: Mutex<Vec<String>>,
    }

    impl FakeUpstream {
        pub(crate) fn ok(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                keys_used: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                reply: None,
                keys_used: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn keys_used(&self) -> Vec<String> {
            self.keys_used.lock().unwrap().clone()
        }
    }

    impl Upstream for FakeUpstream {
        fn id(&self) -> &str {
            "fake"
        }

        fn complete<'a>(
            &'a self,
            api_key: &'a str,
            _prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = upstream::Result<String>> + Send + 'a>> {
            self.keys_used.lock().unwrap().push(api_key.to_string());
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.ok_or(UpstreamError::Status {
                    status: 500,
                    body: "internal".into(),
                })
            })
        }
    }

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        recorder.handle()
    }

    fn test_limits(daily_limit: u64, per_minute_cap: u64) -> Limits {
        Limits {
            daily_limit,
            per_minute_cap,
            ..Limits::default()
        }
    }

    fn state_with(gateway: Gateway) -> AppState {
        AppState {
            gateway: Arc::new(gateway),
            metrics: ServiceMetrics::new(),
            prometheus: test_prometheus_handle(),
        }
    }

    /// App state over a fake upstream; returns the upstream for call inspection.
    pub(crate) fn test_app_state(
        keys: &[&str],
        upstream: FakeUpstream,
        daily_limit: u64,
        per_minute_cap: u64,
    ) -> (AppState, Arc<FakeUpstream>) {
        let upstream = Arc::new(upstream);
        let keys = keys.iter().map(|k| Secret::new(k.to_string())).collect();
        let gateway = Gateway::new(
            keys,
            upstream.clone(),
            test_limits(daily_limit, per_minute_cap),
        );
        (state_with(gateway), upstream)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_pool_summary() {
        let (state, _upstream) = test_app_state(&["k1", "k2"], FakeUpstream::ok("ok"), 10, 60);
        state.metrics.requests_total.fetch_add(5, Ordering::Relaxed);

        let (status, json) = get_json(build_router(state, 1000), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["keys_total"], 2);
        assert_eq!(json["keys_available"], 2);
        assert_eq!(json["per_minute_cap"], 60);
        assert_eq!(json["requests_served"], 5);
        assert!(json["uptime_seconds"].is_u64());
        assert!(json["period"].is_string());
    }

    #[tokio::test]
    async fn health_is_503_when_every_key_is_cooling_down() {
        let (state, _upstream) = test_app_state(&["k1", "k2"], FakeUpstream::failing(), 10, 60);
        let app = build_router(state, 1000);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/complete")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"prompt":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let (status, json) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["keys_cooling_down"], 2);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let (state, _upstream) = test_app_state(&["k1"], FakeUpstream::ok("ok"), 10, 60);
        let app = build_router(state, 1000);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (state, _upstream) = test_app_state(&["k1"], FakeUpstream::ok("ok"), 10, 60);
        let response = build_router(state, 1000)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn complete_through_gemini_upstream_rotates_past_rejected_key() {
        // Mock Gemini that rejects "bad-key" and answers for any other key
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(|headers: axum::http::HeaderMap| async move {
                let key = headers
                    .get("x-goog-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                if key == "bad-key" {
                    (StatusCode::FORBIDDEN, r#"{"error":{"status":"PERMISSION_DENIED"}}"#.to_string())
                } else {
                    (
                        StatusCode::OK,
                        format!(r#"{{"candidates":[{{"content":{{"parts":[{{"text":"from {key}"}}]}}}}]}}"#),
                    )
                }
            });
            axum::serve(listener, app).await.unwrap();
        });

        let upstream = Arc::new(GeminiUpstream::new(
            reqwest::Client::new(),
            format!("http://{addr}"),
            "gemini-1.5-flash",
            Duration::from_secs(5),
        ));
        let keys = vec![
            Secret::new("bad-key".to_string()),
            Secret::new("good-key".to_string()),
        ];
        let gateway = Gateway::new(keys, upstream, test_limits(10, 60));
        let app = build_router(state_with(gateway), 1000);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/complete")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"prompt":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["completion"], "from good-key");

        let (_, usage) = get_json(app, "/admin/usage").await;
        assert_eq!(usage["keys"][0]["in_cooldown"], true);
        assert_eq!(usage["keys"][1]["usage_today"], 1);
        assert_eq!(usage["keys"][1]["is_current"], true);
    }

    #[tokio::test]
    async fn concurrency_limit_queues_excess_requests() {
        let (state, upstream) = test_app_state(&["k1"], FakeUpstream::ok("ok"), 100, 100);
        let app = build_router(state, 1);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let app = app.clone();
            handles.push(tokio::spawn(async move {
                app.oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/v1/complete")
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"prompt":"hi"}"#))
                        .unwrap(),
                )
                .await
                .unwrap()
                .status()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), StatusCode::OK);
        }
        assert_eq!(upstream.keys_used().len(), 4);
    }
}
