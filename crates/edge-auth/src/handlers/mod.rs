//! HTTP request handlers for the edge auth service.

pub mod guard;
pub mod health;
pub mod metrics;
pub mod oidc;

pub use guard::{debug_echo, verify};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use oidc::oidc_dispatch;
