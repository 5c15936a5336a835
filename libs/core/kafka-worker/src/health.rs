//! HTTP probes for a running consumer:
//! - Liveness probes (`/health`, `/healthz`)
//! - Readiness probes (`/ready`, `/readyz`)
//! - Consumer monitoring (`/worker/info`)
//! - Prometheus metrics (`/metrics`)

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::metrics;
use crate::worker::WorkerState;

/// Shared state for health endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Application name.
    pub app_name: String,
    /// Application version.
    pub app_version: String,
    /// Consumer group id.
    pub group_id: String,
    /// Subscribed topics.
    pub topics: Vec<String>,
    /// Live worker lifecycle.
    pub worker_state: watch::Receiver<WorkerState>,
}

impl HealthState {
    /// Create a new health state.
    pub fn new(
        app_name: impl Into<String>,
        app_version: impl Into<String>,
        group_id: impl Into<String>,
        topics: Vec<String>,
        worker_state: watch::Receiver<WorkerState>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            app_version: app_version.into(),
            group_id: group_id.into(),
            topics,
            worker_state,
        }
    }
}

/// Health response for liveness probes.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status (always "healthy" if responding).
    pub status: &'static str,
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
}

/// Liveness probe handler.
///
/// Always returns OK if the server is running.
pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        name: state.app_name,
        version: state.app_version,
    })
}

/// Readiness probe handler.
///
/// Ready while the consumer is subscribed or polling.
pub async fn ready_handler(
    State(state): State<HealthState>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let current = *state.worker_state.borrow();

    if current.is_ready() {
        Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "consumer": current }
            })),
        ))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "consumer": current }
            })),
        ))
    }
}

/// Consumer info handler for monitoring.
pub async fn worker_info_handler(State(state): State<HealthState>) -> Json<Value> {
    let current = *state.worker_state.borrow();
    Json(json!({
        "group_id": state.group_id,
        "topics": state.topics,
        "state": current,
    }))
}

/// Prometheus metrics endpoint handler.
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::prometheus_handle() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            "Metrics not initialized. Call metrics::init_metrics() at startup.".to_string(),
        )
            .into_response(),
    }
}

/// Create a router with all health endpoints.
///
/// - `/health` - Liveness probe
/// - `/healthz` - Liveness probe (K8s style)
/// - `/ready` - Readiness probe
/// - `/readyz` - Readiness probe (K8s style)
/// - `/worker/info` - Consumer monitoring
/// - `/metrics` - Prometheus metrics
pub fn health_router(state: HealthState) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/readyz", get(ready_handler))
        .route("/worker/info", get(worker_info_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(worker: WorkerState) -> (watch::Sender<WorkerState>, HealthState) {
        let (tx, rx) = watch::channel(worker);
        let state = HealthState::new(
            "events-worker",
            "0.1.0",
            "port-events-consumer",
            vec!["port-events".to_string()],
            rx,
        );
        (tx, state)
    }

    #[tokio::test]
    async fn test_worker_info_reports_group_and_state() {
        let (_tx, state) = state(WorkerState::ConsumeError);
        let response = health_router(state)
            .oneshot(Request::builder().uri("/worker/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let info: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(info["group_id"], "port-events-consumer");
        assert_eq!(info["state"], "consume_error");
    }

    #[tokio::test]
    async fn test_ready_follows_worker_state() {
        let (tx, state) = state(WorkerState::Starting);
        let app = health_router(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        tx.send(WorkerState::Polling).unwrap();
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_liveness_always_ok() {
        let (_tx, state) = state(WorkerState::FatalError);
        let response = health_router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
