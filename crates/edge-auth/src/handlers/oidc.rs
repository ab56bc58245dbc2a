//! OIDC authorization-code flow.
//!
//! Requests that match no other route land here. The path is split into a
//! base path and a final segment; the base path selects a configured route
//! and the segment selects the step:
//!
//! - `{base}login` - set `oidcurl` and `nonce`, redirect to the IdP
//! - `{base}callback` - exchange the code, check the nonce, evaluate the
//!   access policy, mint the edge token and set the session cookies
//! - `{base}logout` - delete the session cookies and redirect to `/`
//!
//! Anything else is `404 No route for <uri>`.

use crate::auth::cookies::{
    login_cookies, sanitize_return_url, session_cookies, session_deletion_cookies,
    set_cookie_header, DEFAULT_RETURN_URL, NONCE_COOKIE, RETURN_URL_COOKIE,
};
use crate::auth::route_context::split_path;
use crate::auth::{AccessDecision, Nonce, RequestOrigin, RouteContext};
use crate::errors::EdgeAuthError;
use crate::observability::metrics::record_oidc_step;
use crate::routes::AppState;
use crate::services::{TokenExchangeError, UpstreamErrorBody};
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use common::claims::IdentityClaims;
use common::edge_token::generate_acl_token;
use common::jwt::decode_jwt;
use common::secret::{expose_signing_key, ExposeSecret};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use url::Url;

/// Scopes requested at the authorization endpoint.
pub const REQUESTED_SCOPE: &str = "openid email";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OidcStep {
    Login,
    Callback,
    Logout,
}

impl OidcStep {
    fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "login" => Some(OidcStep::Login),
            "callback" => Some(OidcStep::Callback),
            "logout" => Some(OidcStep::Logout),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            OidcStep::Login => "login",
            OidcStep::Callback => "callback",
            OidcStep::Logout => "logout",
        }
    }
}

/// Fallback handler dispatching to the OIDC steps.
///
/// # Errors
///
/// - `NotFound` for unconfigured base paths and unknown steps
/// - `PreconditionFailed` without an allowed `Host` header
/// - the step's own errors otherwise
#[instrument(skip_all, name = "ea.oidc.dispatch", fields(path = %uri.path()))]
pub async fn oidc_dispatch(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    jar: CookieJar,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, EdgeAuthError> {
    let not_found = || EdgeAuthError::NotFound(uri.to_string());

    let (base_path, segment) = split_path(uri.path());
    let settings = state.config.route(base_path).ok_or_else(not_found)?;
    let step = OidcStep::from_segment(segment).ok_or_else(not_found)?;

    let origin = RequestOrigin::from_headers(
        &headers,
        &state.config.public_scheme,
        &state.config.allowed_hosts,
    )?;
    let ctx = RouteContext::new(base_path, settings, &origin);

    let result = match step {
        OidcStep::Login => login(&ctx, &params),
        OidcStep::Callback => callback(&state, &ctx, &origin, &jar, &params).await,
        OidcStep::Logout => logout(&ctx),
    };

    let outcome = match &result {
        Ok(_) if step == OidcStep::Callback => "granted",
        Ok(_) => "redirect",
        Err(EdgeAuthError::AccessDenied(_)) => "denied",
        Err(_) => "error",
    };
    record_oidc_step(step.as_str(), outcome);

    if let Err(e) = &result {
        tracing::debug!(
            target: "ea.oidc",
            step = step.as_str(),
            base_path = %ctx.base_path,
            error = %e,
            "OIDC step failed"
        );
    }

    result
}

/// Start a login: remember where to return, bind a nonce to the browser and
/// send it to the authorization endpoint.
fn login(ctx: &RouteContext, params: &HashMap<String, String>) -> Result<Response, EdgeAuthError> {
    let nonce = Nonce::generate()?;
    let return_url = sanitize_return_url(params.get("url").map(String::as_str));

    let mut location = Url::parse(&ctx.authorization_endpoint).map_err(|e| {
        tracing::error!(target: "ea.oidc", error = %e, "Authorization endpoint is not a URL");
        EdgeAuthError::Internal(format!("authorization endpoint: {e}"))
    })?;
    location
        .query_pairs_mut()
        .append_pair("client_id", &ctx.client_id)
        .append_pair("nonce", nonce.as_str())
        .append_pair("redirect_uri", &ctx.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", REQUESTED_SCOPE)
        .append_pair("prompt", "consent");

    tracing::debug!(target: "ea.oidc", base_path = %ctx.base_path, "Redirecting to IdP");

    redirect(
        location.as_str(),
        &login_cookies(&ctx.base_path, &return_url, nonce.as_str()),
    )
}

async fn callback(
    state: &AppState,
    ctx: &RouteContext,
    origin: &RequestOrigin,
    jar: &CookieJar,
    params: &HashMap<String, String>,
) -> Result<Response, EdgeAuthError> {
    let code = params
        .get("code")
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            EdgeAuthError::PreconditionFailed("code parameter missing from callback".to_string())
        })?;

    let return_url = sanitize_return_url(jar.get(RETURN_URL_COOKIE).map(Cookie::value));

    let tokens = state
        .idp_client
        .exchange_code(ctx, code)
        .await
        .map_err(|e| match e {
            TokenExchangeError::Transport(message) | TokenExchangeError::InvalidResponse(message) => {
                EdgeAuthError::UpstreamFailure(message)
            }
            TokenExchangeError::Rejected {
                body: UpstreamErrorBody::Structured(body),
                ..
            } => EdgeAuthError::UpstreamRejected {
                body,
                url: return_url.clone(),
            },
            TokenExchangeError::Rejected {
                status,
                body: UpstreamErrorBody::Raw(details),
            } => EdgeAuthError::CallbackFailure {
                status,
                details,
                path: ctx.token_endpoint.clone(),
            },
        })?;

    let claims: IdentityClaims = decode_jwt(&tokens.id_token)?.claims()?;

    let expected_nonce = jar.get(NONCE_COOKIE).map(Cookie::value).unwrap_or_default();
    match claims.nonce.as_deref() {
        Some(nonce) if !nonce.is_empty() && nonce == expected_nonce => {}
        _ => {
            tracing::warn!(target: "ea.oidc", base_path = %ctx.base_path, "Nonce mismatch");
            return Err(EdgeAuthError::NonceMismatch);
        }
    }

    let claims = if ctx.verify_id_token {
        state
            .jwks_client
            .verify_token(
                &state.jwks_url(origin),
                &state.id_token_verifier,
                &tokens.id_token,
            )
            .await?
    } else {
        claims
    };

    let policy = state
        .policy(&ctx.base_path)
        .ok_or_else(|| EdgeAuthError::Internal(format!("no policy for {}", ctx.base_path)))?;

    let (acl, payload) = match policy.evaluate(&claims) {
        AccessDecision::Grant { acl, payload } => (acl, payload),
        denied @ AccessDecision::Deny { .. } => {
            tracing::info!(target: "ea.oidc", base_path = %ctx.base_path, "Access denied by policy");
            return Err(EdgeAuthError::AccessDenied(denied));
        }
    };

    if tokens.expires_in <= 0 {
        return Err(EdgeAuthError::UpstreamFailure(format!(
            "token endpoint returned expires_in {}",
            tokens.expires_in
        )));
    }

    let key = expose_signing_key(&ctx.signing_secret)?;
    let edge_token = generate_acl_token(
        key.expose_secret(),
        chrono::Utc::now().timestamp(),
        tokens.expires_in,
        acl.as_slice(),
        &payload,
    )?;

    tracing::info!(
        target: "ea.oidc",
        base_path = %ctx.base_path,
        expires_in = tokens.expires_in,
        "Session granted"
    );

    redirect(
        &return_url,
        &session_cookies(
            &ctx.cookie_domain,
            &edge_token,
            &tokens.id_token,
            tokens.expires_in,
        ),
    )
}

fn logout(ctx: &RouteContext) -> Result<Response, EdgeAuthError> {
    tracing::debug!(target: "ea.oidc", base_path = %ctx.base_path, "Logging out");
    redirect(DEFAULT_RETURN_URL, &session_deletion_cookies(&ctx.cookie_domain))
}

/// 302 to `location` with one `Set-Cookie` header per cookie.
fn redirect(location: &str, cookies: &[Cookie<'static>]) -> Result<Response, EdgeAuthError> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| EdgeAuthError::Internal(format!("invalid Location value: {e}")))?;

    let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    for cookie in cookies {
        response
            .headers_mut()
            .append(header::SET_COOKIE, set_cookie_header(cookie)?);
    }
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_step_from_segment() {
        assert_eq!(OidcStep::from_segment("login"), Some(OidcStep::Login));
        assert_eq!(OidcStep::from_segment("callback"), Some(OidcStep::Callback));
        assert_eq!(OidcStep::from_segment("logout"), Some(OidcStep::Logout));
        assert_eq!(OidcStep::from_segment("token"), None);
        assert_eq!(OidcStep::from_segment(""), None);
    }

    #[test]
    fn test_redirect_sets_location_and_cookies() {
        let response = redirect("/app", &session_deletion_cookies("example.com")).unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/app");
        assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn test_redirect_rejects_invalid_location() {
        assert!(matches!(
            redirect("/bad\nheader", &[]),
            Err(EdgeAuthError::Internal(_))
        ));
    }
}
