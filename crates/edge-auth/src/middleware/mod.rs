//! Middleware for the edge auth service.

pub mod http_metrics;
pub mod jwt_guard;

pub use http_metrics::http_metrics_middleware;
pub use jwt_guard::{require_jwt, VerifiedClaims};
