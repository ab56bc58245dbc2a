//! Metrics definitions for the edge auth service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ea_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `endpoint`: normalized to the OIDC step names, the guard paths and the
//!   operational paths; everything else is `/other`
//! - `step`, `outcome`, `kind`: fixed sets chosen by the code

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle that renders it.
///
/// # Errors
///
/// Returns error if the recorder cannot be installed (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("ea_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.200, 0.500, 1.000, 2.000, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion.
///
/// Metric: `ea_http_requests_total`, `ea_http_request_duration_seconds`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("ea_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint.clone(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("ea_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=399 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize a request path so base paths do not become label values.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/health" | "/metrics" => return path.to_string(),
        _ => {}
    }

    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment {
        "login" | "callback" | "logout" => format!("{{base}}/{last_segment}"),
        "verify" | "debug" => format!("{{guard}}/{last_segment}"),
        _ => "/other".to_string(),
    }
}

// ============================================================================
// Flow Metrics
// ============================================================================

/// Record one OIDC step.
///
/// Metric: `ea_oidc_requests_total`
/// Labels: `step` (login, callback, logout), `outcome` (redirect, granted,
/// denied, error)
pub fn record_oidc_step(step: &'static str, outcome: &'static str) {
    counter!("ea_oidc_requests_total",
        "step" => step,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record a JWT verification by the guard.
///
/// Metric: `ea_jwt_validations_total`
/// Labels: `status` (success, failure), `error_kind`
pub fn record_jwt_validation(status: &'static str, error_kind: &'static str) {
    counter!("ea_jwt_validations_total",
        "status" => status,
        "error_kind" => error_kind
    )
    .increment(1);
}

// ============================================================================
// Error Metrics
// ============================================================================

/// Record an error response.
///
/// Metric: `ea_errors_total`
/// Labels: `kind`
pub fn record_error(kind: &'static str) {
    counter!("ea_errors_total", "kind" => kind).increment(1);
}
