//! Identity provider token endpoint client.
//!
//! Exchanges an authorization code for tokens with a form-encoded POST. The
//! response is classified into the shapes the callback handler needs:
//! a usable [`TokenResponse`], a rejection with a JSON or raw body, or an
//! upstream failure.
//!
//! # Security
//!
//! - The client secret is exposed only while building the form body
//! - Token values are never logged

use crate::auth::RouteContext;
use common::secret::ExposeSecret;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;
use tracing::{instrument, warn};

/// Successful token endpoint response.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    pub id_token: String,

    #[serde(default)]
    pub access_token: Option<String>,

    /// Lifetime in seconds; also the lifetime of the edge session.
    pub expires_in: i64,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("id_token", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Body of a rejected token exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamErrorBody {
    /// The body was a JSON object (typically `{"error": ..., "error_description": ...}`).
    Structured(Map<String, Value>),
    /// Anything else, verbatim.
    Raw(String),
}

impl UpstreamErrorBody {
    #[must_use]
    pub fn parse(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => UpstreamErrorBody::Structured(map),
            _ => UpstreamErrorBody::Raw(text),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenExchangeError {
    /// The endpoint could not be reached or timed out.
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("token endpoint returned {status}")]
    Rejected { status: u16, body: UpstreamErrorBody },

    /// The endpoint answered 2xx with a body that is not a token response.
    #[error("token endpoint returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Client for IdP token endpoints.
#[derive(Clone)]
pub struct IdpClient {
    client: Client,
}

impl IdpClient {
    /// Wrap a shared HTTP client (timeouts are configured on it).
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Exchange an authorization code at the route's token endpoint.
    ///
    /// # Errors
    ///
    /// See [`TokenExchangeError`].
    #[instrument(skip_all, name = "ea.services.idp.exchange_code")]
    pub async fn exchange_code(
        &self,
        ctx: &RouteContext,
        code: &str,
    ) -> Result<TokenResponse, TokenExchangeError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("redirect_uri", ctx.redirect_uri.as_str()),
            ("code", code),
            ("client_id", ctx.client_id.as_str()),
            ("client_secret", ctx.client_secret.expose_secret()),
        ];

        let response = self
            .client
            .post(&ctx.token_endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                warn!(target: "ea.services.idp", error = %e, "Token endpoint request failed");
                TokenExchangeError::Transport(e.to_string())
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            warn!(target: "ea.services.idp", error = %e, "Failed to read token endpoint response");
            TokenExchangeError::Transport(e.to_string())
        })?;

        if !status.is_success() {
            warn!(
                target: "ea.services.idp",
                status = %status,
                "Token endpoint rejected code exchange"
            );
            return Err(TokenExchangeError::Rejected {
                status: status.as_u16(),
                body: UpstreamErrorBody::parse(text),
            });
        }

        serde_json::from_str::<TokenResponse>(&text).map_err(|e| {
            warn!(target: "ea.services.idp", error = %e, "Token endpoint response is not a token response");
            TokenExchangeError::InvalidResponse(e.to_string())
        })
    }
}
