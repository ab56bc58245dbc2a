//! Handlers behind the JWT guard.
//!
//! Both run after [`require_jwt`](crate::middleware::require_jwt) has
//! verified the token, so they only shape the success response.

use crate::middleware::VerifiedClaims;
use axum::{http::StatusCode, Extension, Json};
use serde::Serialize;

use common::claims::IdentityClaims;

/// Body of the debug echo.
#[derive(Debug, Serialize)]
pub struct DebugEchoResponse {
    pub jwt: IdentityClaims,
    pub verified: bool,
}

/// `{GUARD_PREFIX}/verify`: 204 when the token verified.
pub async fn verify() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// `{GUARD_PREFIX}/debug`: echo the verified claims.
///
/// Only routed when `GUARD_DEBUG_ENABLED` is set.
#[tracing::instrument(skip_all, name = "ea.guard.debug")]
pub async fn debug_echo(
    Extension(VerifiedClaims(claims)): Extension<VerifiedClaims>,
) -> Json<DebugEchoResponse> {
    Json(DebugEchoResponse {
        jwt: claims,
        verified: true,
    })
}
