//! Request-time JWT guard.
//!
//! The token is taken from the first source present:
//!
//! 1. `Authorization: Bearer <jwt>`
//! 2. `jwt: <jwt>` header
//! 3. `__jwt__` cookie
//!
//! It is verified against the JWKS at `JWKS_URL`, or at
//! `{scheme}://{host}/oidc/certs` when unset. On success the claims are
//! stored in request extensions as [`VerifiedClaims`].

use crate::auth::cookies::JWT_COOKIE;
use crate::auth::RequestOrigin;
use crate::errors::EdgeAuthError;
use crate::observability::metrics::record_jwt_validation;
use crate::routes::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use common::claims::IdentityClaims;
use std::sync::Arc;
use tracing::instrument;

/// Header carrying a bare JWT.
pub const JWT_HEADER: &str = "jwt";

/// Claims of a token that passed the guard.
#[derive(Debug, Clone)]
pub struct VerifiedClaims(pub IdentityClaims);

/// Token from the first source present, ignoring empty values.
fn extract_token(headers: &HeaderMap, jar: &CookieJar) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);
    let jwt_header = headers.get(JWT_HEADER).and_then(|h| h.to_str().ok());
    let cookie = jar.get(JWT_COOKIE).map(|c| c.value());

    [bearer, jwt_header, cookie]
        .into_iter()
        .flatten()
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

/// Verify the request's JWT before running the guarded handler.
///
/// # Response
///
/// - 400 with `TOKEN_REQUIRED` when no token is present
/// - 400 with the verification failure kind otherwise
/// - 502 when the JWKS cannot be fetched
#[instrument(skip_all, name = "ea.guard")]
pub async fn require_jwt(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, EdgeAuthError> {
    let Some(token) = extract_token(req.headers(), &jar) else {
        tracing::debug!(target: "ea.guard", "No token on request");
        record_jwt_validation("failure", "token_required");
        return Err(EdgeAuthError::TokenRequired);
    };

    let jwks_url = match &state.config.jwks_url {
        Some(url) => url.clone(),
        None => {
            let origin = RequestOrigin::from_headers(
                req.headers(),
                &state.config.public_scheme,
                &state.config.allowed_hosts,
            )?;
            state.jwks_url(&origin)
        }
    };

    let claims = match state
        .jwks_client
        .verify_token(&jwks_url, &state.guard_verifier, &token)
        .await
    {
        Ok(claims) => claims,
        Err(e) => {
            tracing::debug!(
                target: "ea.guard",
                error_kind = e.kind(),
                "Token rejected"
            );
            record_jwt_validation("failure", e.kind());
            return Err(e);
        }
    };

    record_jwt_validation("success", "none");
    req.extensions_mut().insert(VerifiedClaims(claims));

    Ok(next.run(req).await)
}
