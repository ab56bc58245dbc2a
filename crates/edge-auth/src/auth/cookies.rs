//! Cookies written and read by the OIDC flow.
//!
//! | Cookie | Set by | Path | Domain |
//! |--------|--------|------|--------|
//! | `oidcurl` | login | base path | host |
//! | `nonce` | login | base path | host |
//! | `__token__` | callback (grant) | `/` | cookie domain |
//! | `__jwt__` | callback (grant) | `/` | cookie domain |
//!
//! Every cookie is `Secure`. `__jwt__` is readable by scripts; the rest are
//! `HttpOnly`.
//!
//! `oidcurl` is percent-encoded on the wire. Session cookies are written raw
//! so edge servers see the token text byte for byte. Incoming cookies are
//! read with `CookieJar`, which decodes percent escapes.

use crate::errors::EdgeAuthError;
use axum::http::HeaderValue;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

pub const RETURN_URL_COOKIE: &str = "oidcurl";
pub const NONCE_COOKIE: &str = "nonce";
pub const EDGE_TOKEN_COOKIE: &str = "__token__";
pub const JWT_COOKIE: &str = "__jwt__";

/// Where to send the browser after a successful callback when no usable
/// return URL was stored.
pub const DEFAULT_RETURN_URL: &str = "/";

/// Keep only same-site relative return URLs.
///
/// Absolute and protocol-relative URLs (`https://…`, `//…`) fall back to
/// [`DEFAULT_RETURN_URL`], as does anything outside printable ASCII.
/// Browsers drop tabs and newlines from a `Location`, so `/\t/host` would
/// otherwise leave the site.
#[must_use]
pub fn sanitize_return_url(url: Option<&str>) -> String {
    match url {
        Some(url)
            if url.starts_with('/')
                && !url.starts_with("//")
                && !url.contains('\\')
                && url.bytes().all(|b| b.is_ascii_graphic()) =>
        {
            url.to_string()
        }
        _ => DEFAULT_RETURN_URL.to_string(),
    }
}

/// Render a cookie as a `Set-Cookie` header value.
///
/// # Errors
///
/// Returns `EdgeAuthError::Internal` if the rendered cookie is not a valid
/// header value.
pub fn set_cookie_header(cookie: &Cookie<'_>) -> Result<HeaderValue, EdgeAuthError> {
    let rendered = if cookie.name() == RETURN_URL_COOKIE {
        cookie.encoded().to_string()
    } else {
        cookie.to_string()
    };
    HeaderValue::from_str(&rendered)
        .map_err(|e| EdgeAuthError::Internal(format!("invalid Set-Cookie value: {e}")))
}

fn login_cookie(name: &'static str, value: String, base_path: &str) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(base_path.to_string())
        .secure(true)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// `oidcurl` and `nonce`, scoped to the route's base path.
#[must_use]
pub fn login_cookies(base_path: &str, return_url: &str, nonce: &str) -> [Cookie<'static>; 2] {
    [
        login_cookie(RETURN_URL_COOKIE, return_url.to_string(), base_path),
        login_cookie(NONCE_COOKIE, nonce.to_string(), base_path),
    ]
}

fn session_cookie(
    name: &'static str,
    value: String,
    domain: &str,
    max_age: Duration,
    http_only: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .domain(domain.to_string())
        .max_age(max_age)
        .secure(true)
        .http_only(http_only)
        .build()
}

/// `__token__` and `__jwt__` for a granted session.
#[must_use]
pub fn session_cookies(
    domain: &str,
    edge_token: &str,
    id_token: &str,
    max_age_seconds: i64,
) -> [Cookie<'static>; 2] {
    let max_age = Duration::seconds(max_age_seconds);
    [
        session_cookie(EDGE_TOKEN_COOKIE, edge_token.to_string(), domain, max_age, true),
        session_cookie(JWT_COOKIE, id_token.to_string(), domain, max_age, false),
    ]
}

/// Deletion cookies for `__token__` and `__jwt__` (empty value,
/// `Max-Age=-1`).
#[must_use]
pub fn session_deletion_cookies(domain: &str) -> [Cookie<'static>; 2] {
    let expired = Duration::seconds(-1);
    [
        session_cookie(EDGE_TOKEN_COOKIE, String::new(), domain, expired, true),
        session_cookie(JWT_COOKIE, String::new(), domain, expired, false),
    ]
}
