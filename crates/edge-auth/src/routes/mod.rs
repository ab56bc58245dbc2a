//! HTTP routes for the edge auth service.
//!
//! Defines the Axum router and application state.

use crate::auth::{AccessPolicy, EmailSuffixPolicyFactory, PolicyFactory, RequestOrigin};
use crate::config::Config;
use crate::errors::EdgeAuthError;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_jwt};
use crate::services::{IdpClient, JwksClient};
use axum::{middleware, routing::get, Router};
use common::verifier::{JwtVerifier, VerifyPolicy};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Path of the JWKS endpoint when `JWKS_URL` is not configured.
pub const DEFAULT_JWKS_PATH: &str = "/oidc/certs";

/// Whole-request timeout; covers the upstream calls made by a callback.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application state shared across all handlers.
pub struct AppState {
    pub config: Config,

    pub idp_client: IdpClient,

    pub jwks_client: JwksClient,

    /// Verifier for the request-time guard.
    pub guard_verifier: JwtVerifier,

    /// Verifier for ID tokens in the callback (`exp` only).
    pub id_token_verifier: JwtVerifier,

    /// Access policy per base path.
    policies: HashMap<String, Arc<dyn AccessPolicy>>,
}

impl AppState {
    /// Build state with the default [`EmailSuffixPolicyFactory`].
    ///
    /// # Errors
    ///
    /// Returns `EdgeAuthError::Internal` if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, EdgeAuthError> {
        Self::with_policy_factory(config, &EmailSuffixPolicyFactory)
    }

    /// Build state with a custom policy factory.
    ///
    /// # Errors
    ///
    /// Returns `EdgeAuthError::Internal` if the HTTP client cannot be built.
    pub fn with_policy_factory(
        config: Config,
        factory: &dyn PolicyFactory,
    ) -> Result<Self, EdgeAuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_seconds))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| {
                tracing::error!(target: "ea.routes", error = %e, "Failed to build HTTP client");
                EdgeAuthError::Internal(format!("HTTP client: {e}"))
            })?;

        let policies = config
            .routes
            .iter()
            .map(|(base_path, settings)| (base_path.clone(), factory.policy_for(base_path, settings)))
            .collect();

        Ok(Self {
            idp_client: IdpClient::new(http_client.clone()),
            jwks_client: JwksClient::new(
                http_client,
                Duration::from_secs(config.jwks_cache_ttl_seconds),
                config.jwt_default_algorithm,
            ),
            guard_verifier: JwtVerifier::new(VerifyPolicy {
                check_expiration: true,
                check_not_before: config.guard_check_not_before,
            }),
            id_token_verifier: JwtVerifier::new(VerifyPolicy {
                check_expiration: true,
                check_not_before: false,
            }),
            policies,
            config,
        })
    }

    /// The access policy for a configured base path.
    pub fn policy(&self, base_path: &str) -> Option<Arc<dyn AccessPolicy>> {
        self.policies.get(base_path).cloned()
    }

    /// The JWKS URL for a request: `JWKS_URL` if set, else
    /// `{scheme}://{host}/oidc/certs`.
    pub fn jwks_url(&self, origin: &RequestOrigin) -> String {
        match &self.config.jwks_url {
            Some(url) => url.clone(),
            None => format!("{}{DEFAULT_JWKS_PATH}", origin.base_url()),
        }
    }
}

/// Build the application routes.
///
/// - `/health` - liveness probe
/// - `/metrics` - Prometheus scrape endpoint
/// - `{GUARD_PREFIX}/verify` - JWT guard, 204 on success
/// - `{GUARD_PREFIX}/debug` - JWT guard with claims echo (only when enabled)
/// - everything else - OIDC dispatcher (`{base}login`, `{base}callback`,
///   `{base}logout`), 404 for unknown routes
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let prefix = state.config.guard_prefix.clone();

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .fallback(handlers::oidc_dispatch)
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let mut guarded_routes = Router::new().route(&format!("{prefix}/verify"), get(handlers::verify));
    if state.config.guard_debug_enabled {
        guarded_routes = guarded_routes.route(&format!("{prefix}/debug"), get(handlers::debug_echo));
    }
    let guarded_routes = guarded_routes
        .route_layer(middleware::from_fn_with_state(state.clone(), require_jwt))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. http_metrics_middleware - Record ALL responses (outermost)
    public_routes
        .merge(metrics_routes)
        .merge(guarded_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn config(jwks_url: Option<&str>) -> Config {
        let mut vars = HashMap::from([
            ("OIDC_ROUTES".to_string(), "/oidc/".to_string()),
            ("ROUTE_OIDC_CLIENT_ID".to_string(), "c".to_string()),
            ("ROUTE_OIDC_CLIENT_SECRET".to_string(), "s".to_string()),
            ("ROUTE_OIDC_SIGNING_SECRET".to_string(), "00ff".to_string()),
            (
                "ROUTE_OIDC_AUTH_URL".to_string(),
                "https://idp.example.com/authorize".to_string(),
            ),
            (
                "ROUTE_OIDC_ALLOWED_EMAIL_SUFFIX".to_string(),
                "@example.com".to_string(),
            ),
            ("ALLOWED_HOSTS".to_string(), "www.example.com".to_string()),
        ]);
        if let Some(url) = jwks_url {
            vars.insert("JWKS_URL".to_string(), url.to_string());
        }
        Config::from_vars(&vars).unwrap()
    }

    fn origin() -> RequestOrigin {
        RequestOrigin {
            scheme: "https".to_string(),
            host: "www.example.com".to_string(),
        }
    }

    #[test]
    fn test_jwks_url_derived_from_origin() {
        let state = AppState::new(config(None)).unwrap();
        assert_eq!(
            state.jwks_url(&origin()),
            "https://www.example.com/oidc/certs"
        );
    }

    #[test]
    fn test_jwks_url_override() {
        let state = AppState::new(config(Some("https://idp.example.com/jwks"))).unwrap();
        assert_eq!(state.jwks_url(&origin()), "https://idp.example.com/jwks");
    }

    #[test]
    fn test_policy_per_route() {
        let state = AppState::new(config(None)).unwrap();
        assert!(state.policy("/oidc/").is_some());
        assert!(state.policy("/other/").is_none());
    }

    #[test]
    fn test_app_state_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppState>();
    }
}
