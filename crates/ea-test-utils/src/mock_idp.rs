//! Mock identity provider
//!
//! A wiremock server exposing a token endpoint at `/token` and a JWKS at
//! `/oidc/certs`.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN_PATH: &str = "/token";
pub const JWKS_PATH: &str = "/oidc/certs";

pub struct MockIdp {
    server: MockServer,
}

impl MockIdp {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// `host:port` of the mock, as a client would send it in `Host`.
    pub fn host(&self) -> String {
        self.server.address().to_string()
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server.uri())
    }

    pub fn jwks_url(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    /// Answer code exchanges with `id_token` and `expires_in`.
    pub async fn mount_token_success(&self, id_token: &str, expires_in: i64) {
        self.mount_token_response(
            ResponseTemplate::new(200).set_body_json(json!({
                "id_token": id_token,
                "access_token": "opaque-access-token",
                "token_type": "Bearer",
                "expires_in": expires_in,
            })),
        )
        .await;
    }

    /// Reject code exchanges with a JSON error body.
    pub async fn mount_token_error_json(&self, status: u16, body: Value) {
        self.mount_token_response(ResponseTemplate::new(status).set_body_json(body))
            .await;
    }

    /// Reject code exchanges with a plain-text body.
    pub async fn mount_token_error_text(&self, status: u16, body: &str) {
        self.mount_token_response(ResponseTemplate::new(status).set_body_string(body))
            .await;
    }

    async fn mount_token_response(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(response)
            .mount(&self.server)
            .await;
    }

    /// Fail the test (on drop) if the token endpoint is called at all.
    pub async fn expect_no_token_calls(&self) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Publish `keys` at the JWKS endpoint.
    pub async fn mount_jwks(&self, keys: &[&TestSigningKey]) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Publish `keys`, asserting the JWKS is fetched exactly `times` times.
    pub async fn mount_jwks_expecting(&self, keys: &[&TestSigningKey], times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Check the expectations of the mounted mocks now (panics on mismatch).
    pub async fn verify(&self) {
        self.server.verify().await;
    }

    /// Number of requests the mock has received, matched or not.
    pub async fn received_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Remove every mounted mock (e.g. to rotate keys).
    pub async fn reset(&self) {
        self.server.reset().await;
    }
}
