//! Prometheus metrics endpoint handler.
//!
//! # Security
//!
//! This endpoint is unauthenticated so Prometheus can scrape it. Labels are
//! bounded (route paths are normalized) and carry no identities or tokens.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns Prometheus text format:
/// ```text
/// # TYPE ea_http_requests_total counter
/// ea_http_requests_total{method="GET",endpoint="{base}/login",status_code="302"} 42
/// ```
#[tracing::instrument(skip_all, name = "ea.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
