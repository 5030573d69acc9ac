//! HTTP API: monitor views, control endpoints and Prometheus metrics

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use monitor_lib::{
    agent::AlertSettingsUpdate, Agent, ComponentStatus, RunOutcome, Scheduler, TaskKind,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Snapshots returned by `/metrics` unless `window` is given
const DEFAULT_METRICS_WINDOW: usize = 60;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<Agent>,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(agent: Arc<Agent>, scheduler: Arc<Scheduler>) -> Self {
        Self { agent, scheduler }
    }
}

/// Agent liveness - 200 while operational, 503 once a component is unhealthy
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = state.agent.health_summary().await;

    let status_code = match summary.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(summary))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.agent.health_registry().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn dashboard(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.agent.dashboard().await)
}

#[derive(Debug, Deserialize)]
struct MetricsQuery {
    window: Option<usize>,
}

async fn metrics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MetricsQuery>,
) -> impl IntoResponse {
    let window = query.window.unwrap_or(DEFAULT_METRICS_WINDOW);
    Json(state.agent.metrics_view(window).await)
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode Prometheus metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", prometheus::TEXT_FORMAT)],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", prometheus::TEXT_FORMAT)],
        buffer,
    )
}

/// Run a probe cycle now, unless one is already in progress
async fn check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.scheduler.run_now(TaskKind::Probe).await {
        RunOutcome::Completed => {
            let view = state.agent.metrics_view(1).await;
            (
                StatusCode::OK,
                Json(json!({ "status": "completed", "snapshot": view.latest })),
            )
        }
        RunOutcome::Skipped => (
            StatusCode::CONFLICT,
            Json(json!({
                "status": "skipped",
                "reason": "a probe cycle is already running"
            })),
        ),
        RunOutcome::Failed(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "failed", "reason": reason })),
        ),
    }
}

async fn configure_alerts(
    State(state): State<Arc<AppState>>,
    Json(update): Json<AlertSettingsUpdate>,
) -> impl IntoResponse {
    match state.agent.configure_alerts(update).await {
        Ok(settings) => (StatusCode::OK, Json(json!(settings))),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

/// Accept an external event; unparseable bodies are ignored with 200
async fn webhook_event(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let accepted = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => state.agent.record_event(payload).await,
        Err(_) => false,
    };
    Json(json!({ "accepted": accepted }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/dashboard", get(dashboard))
        .route("/metrics", get(metrics))
        .route("/metrics/prometheus", get(prometheus_metrics))
        .route("/check", post(check))
        .route("/alerts/configure", post(configure_alerts))
        .route("/webhook/event", post(webhook_event))
        .with_state(state)
}

/// Serve the API until `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
