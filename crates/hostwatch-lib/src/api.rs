//! Monitor status endpoints
//!
//! `/healthz` reports the sampler, calibrator and notifier, `/readyz` opens
//! once the first network baseline is in place and `/metrics` exposes the
//! `hostwatch_*` Prometheus families.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::health::{ComponentStatus, HealthRegistry};
use crate::observability::AgentMetrics;

/// Prefix shared by every family this monitor registers
pub const METRIC_PREFIX: &str = "hostwatch_";

/// State handed to every endpoint
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    /// Held so the `hostwatch_*` families are registered before the first scrape
    pub metrics: AgentMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: AgentMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Liveness code for an aggregate component status
///
/// A fallback baseline or a failed delivery leaves the monitor degraded but
/// still sampling, so only repeated read failures take it down.
pub fn liveness_status(status: ComponentStatus) -> StatusCode {
    match status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    (liveness_status(health.status), Json(health))
}

/// Sampling only starts after calibration, so readiness follows the baseline
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let families: Vec<_> = prometheus::gather()
        .into_iter()
        .filter(|family| family.get_name().starts_with(METRIC_PREFIX))
        .collect();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        warn!(error = %e, "Failed to encode monitor metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the status endpoints on every interface until the task is aborted
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Status endpoints listening");

    axum::serve(listener, create_router(state)).await?;
    Ok(())
}
