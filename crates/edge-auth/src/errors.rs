//! Edge auth error types.
//!
//! Every failure in the OIDC flow and the JWT guard is an [`EdgeAuthError`].
//! The `IntoResponse` impl owns the mapping to status code and body, logs the
//! error and counts it in `ea_errors_total`.

use crate::auth::policy::AccessDecision;
use crate::observability::metrics;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::edge_token::EdgeTokenError;
use common::jwt::JwtDecodeError;
use common::verifier::JwtVerifyError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgeAuthError {
    #[error("token required")]
    TokenRequired,

    #[error("token could not be decoded: {0}")]
    DecodeFailure(String),

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,

    #[error("Nonce failed")]
    NonceMismatch,

    #[error("access denied")]
    AccessDenied(AccessDecision),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("upstream failure: {0}")]
    UpstreamFailure(String),

    /// The token endpoint rejected the exchange with a JSON error body.
    #[error("token endpoint rejected the request")]
    UpstreamRejected { body: Map<String, Value>, url: String },

    /// The token endpoint rejected the exchange with a non-JSON body.
    #[error("callback failure from {path}: status {status}")]
    CallbackFailure {
        status: u16,
        details: String,
        path: String,
    },

    #[error("No route for {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EdgeAuthError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EdgeAuthError::TokenRequired
            | EdgeAuthError::DecodeFailure(_)
            | EdgeAuthError::InvalidSignature
            | EdgeAuthError::Expired
            | EdgeAuthError::NotYetValid
            | EdgeAuthError::PreconditionFailed(_)
            | EdgeAuthError::UpstreamRejected { .. } => StatusCode::BAD_REQUEST,
            EdgeAuthError::NonceMismatch | EdgeAuthError::AccessDenied(_) => StatusCode::FORBIDDEN,
            EdgeAuthError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
            EdgeAuthError::CallbackFailure { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            EdgeAuthError::NotFound(_) => StatusCode::NOT_FOUND,
            EdgeAuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Bounded label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EdgeAuthError::TokenRequired => "token_required",
            EdgeAuthError::DecodeFailure(_) => "decode_failure",
            EdgeAuthError::InvalidSignature => "invalid_signature",
            EdgeAuthError::Expired => "expired",
            EdgeAuthError::NotYetValid => "not_yet_valid",
            EdgeAuthError::NonceMismatch => "nonce_mismatch",
            EdgeAuthError::AccessDenied(_) => "access_denied",
            EdgeAuthError::PreconditionFailed(_) => "precondition",
            EdgeAuthError::UpstreamFailure(_) => "upstream_failure",
            EdgeAuthError::UpstreamRejected { .. } => "upstream_rejected",
            EdgeAuthError::CallbackFailure { .. } => "callback_failure",
            EdgeAuthError::NotFound(_) => "not_found",
            EdgeAuthError::Internal(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

fn coded(status: StatusCode, code: &'static str, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail { code, message },
        }),
    )
        .into_response()
}

impl IntoResponse for EdgeAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        metrics::record_error(self.kind());

        if status.is_server_error() {
            tracing::warn!(target: "ea.errors", kind = self.kind(), error = %self, "Request failed");
        } else {
            tracing::debug!(target: "ea.errors", kind = self.kind(), error = %self, "Request rejected");
        }

        match self {
            EdgeAuthError::TokenRequired => {
                coded(status, "TOKEN_REQUIRED", "token required".to_string())
            }
            EdgeAuthError::DecodeFailure(message) => coded(status, "DECODE_FAILURE", message),
            EdgeAuthError::InvalidSignature => coded(
                status,
                "INVALID_SIGNATURE",
                "token signature is invalid".to_string(),
            ),
            EdgeAuthError::Expired => coded(status, "EXPIRED", "token has expired".to_string()),
            EdgeAuthError::NotYetValid => {
                coded(status, "NOT_YET_VALID", "token is not yet valid".to_string())
            }
            EdgeAuthError::NonceMismatch => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Nonce failed",
            )
                .into_response(),
            EdgeAuthError::AccessDenied(decision) => (status, Json(decision)).into_response(),
            EdgeAuthError::PreconditionFailed(description) => (
                status,
                Json(json!({"error": "precondition", "description": description})),
            )
                .into_response(),
            EdgeAuthError::UpstreamFailure(_) => coded(
                status,
                "UPSTREAM_FAILURE",
                "identity provider unavailable".to_string(),
            ),
            EdgeAuthError::UpstreamRejected { mut body, url } => {
                body.insert("url".to_string(), Value::String(url));
                (status, Json(Value::Object(body))).into_response()
            }
            EdgeAuthError::CallbackFailure { details, path, .. } => (
                status,
                Json(json!({
                    "error": "callback_failure",
                    "description": "callback received indicates error",
                    "details": details,
                    "path": path,
                })),
            )
                .into_response(),
            EdgeAuthError::NotFound(uri) => (
                status,
                [(header::CONTENT_TYPE, "text/plain; charset=us-ascii")],
                format!("No route for {uri}"),
            )
                .into_response(),
            EdgeAuthError::Internal(_) => coded(
                status,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl From<JwtVerifyError> for EdgeAuthError {
    fn from(err: JwtVerifyError) -> Self {
        match err {
            JwtVerifyError::DecodeFailure(e) => EdgeAuthError::DecodeFailure(e.to_string()),
            JwtVerifyError::InvalidSignature => EdgeAuthError::InvalidSignature,
            JwtVerifyError::Expired => EdgeAuthError::Expired,
            JwtVerifyError::NotYetValid => EdgeAuthError::NotYetValid,
        }
    }
}

impl From<JwtDecodeError> for EdgeAuthError {
    fn from(err: JwtDecodeError) -> Self {
        EdgeAuthError::DecodeFailure(err.to_string())
    }
}

/// Token generation only fails on bad configuration.
impl From<EdgeTokenError> for EdgeAuthError {
    fn from(err: EdgeTokenError) -> Self {
        EdgeAuthError::Internal(format!("edge token generation failed: {err}"))
    }
}
