//! Test server harness for E2E testing
//!
//! Provides `TestEdgeServer` for spawning real edge auth server instances in
//! tests.

use crate::crypto_fixtures::TEST_SIGNING_SECRET_HEX;
use crate::mock_idp::MockIdp;
use edge_auth::config::Config;
use edge_auth::observability::metrics::init_metrics_recorder;
use edge_auth::routes::{self, AppState};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Base path of the route configured by [`test_vars`].
pub const TEST_BASE_PATH: &str = "/oidc/";
pub const TEST_CLIENT_ID: &str = "edge-client";
pub const TEST_EMAIL_SUFFIX: &str = "@example.com";
pub const TEST_AUTH_URL: &str = "https://idp.example.com/authorize";

/// Configuration with one `/oidc/` route whose token endpoint and JWKS point
/// at `idp`. The debug echo is enabled.
pub fn test_vars(idp: &MockIdp) -> HashMap<String, String> {
    HashMap::from([
        ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ("OIDC_ROUTES".to_string(), TEST_BASE_PATH.to_string()),
        ("ROUTE_OIDC_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
        ("ROUTE_OIDC_CLIENT_SECRET".to_string(), "client-secret".to_string()),
        (
            "ROUTE_OIDC_SIGNING_SECRET".to_string(),
            TEST_SIGNING_SECRET_HEX.to_string(),
        ),
        ("ROUTE_OIDC_AUTH_URL".to_string(), TEST_AUTH_URL.to_string()),
        ("ROUTE_OIDC_TOKEN_URL".to_string(), idp.token_url()),
        (
            "ROUTE_OIDC_ALLOWED_EMAIL_SUFFIX".to_string(),
            TEST_EMAIL_SUFFIX.to_string(),
        ),
        (
            "ROUTE_OIDC_COOKIE_DOMAIN".to_string(),
            "example.com".to_string(),
        ),
        ("JWKS_URL".to_string(), idp.jwks_url()),
        ("GUARD_DEBUG_ENABLED".to_string(), "true".to_string()),
    ])
}

/// Test harness for spawning the edge auth server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> anyhow::Result<()> {
///     let idp = MockIdp::start().await;
///     let server = TestEdgeServer::spawn(test_vars(&idp)).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestEdgeServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestEdgeServer {
    /// Spawn a server built from `vars` on a random local port.
    pub async fn spawn(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(
            AppState::new(config.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create state: {}", e))?,
        );

        // The global recorder can only be installed once per process; later
        // servers get a standalone handle.
        let metrics_handle = match init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => PrometheusBuilder::new().build_recorder().handle(),
        };

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A client that does not follow redirects, so 302s can be inspected.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("test client")
    }
}

impl Drop for TestEdgeServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
