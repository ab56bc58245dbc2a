//! Per-request route context.
//!
//! A [`RouteContext`] combines the configured [`RouteSettings`] of the
//! matched base path with what the request says about where it was
//! addressed (scheme and host). It is built once per request and dropped
//! with it.

use crate::config::RouteSettings;
use crate::errors::EdgeAuthError;
use axum::http::{header, HeaderMap};
use common::secret::SecretString;
use std::net::IpAddr;

/// Header set by the TLS-terminating proxy in front of the edge.
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Split a request path into its base path (up to and including the last
/// `/`) and the final segment.
///
/// `/oidc/login` becomes `("/oidc/", "login")`.
#[must_use]
pub fn split_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => path.split_at(idx + 1),
        None => ("/", path),
    }
}

/// Scheme and host the request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    pub scheme: String,
    /// Host header value, including any port.
    pub host: String,
}

impl RequestOrigin {
    /// Read the origin from request headers.
    ///
    /// The scheme comes from `X-Forwarded-Proto` (first value, `http` or
    /// `https`), else `default_scheme`. A non-empty `allowed_hosts` must
    /// contain the host: an entry with a port matches that exact
    /// `host:port`, an entry without one matches the hostname on any port.
    ///
    /// # Errors
    ///
    /// Returns `PreconditionFailed` if the request has no usable `Host` or
    /// the host is not allowed.
    pub fn from_headers(
        headers: &HeaderMap,
        default_scheme: &str,
        allowed_hosts: &[String],
    ) -> Result<Self, EdgeAuthError> {
        let host = headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(|host| host.trim().to_ascii_lowercase())
            .filter(|host| !host.is_empty())
            .ok_or_else(|| EdgeAuthError::PreconditionFailed("Host header required".to_string()))?;

        let scheme = headers
            .get(FORWARDED_PROTO_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_ascii_lowercase())
            .filter(|value| value == "http" || value == "https")
            .unwrap_or_else(|| default_scheme.to_string());

        let origin = Self { scheme, host };
        if !allowed_hosts.is_empty() && !origin.is_allowed(allowed_hosts) {
            tracing::warn!(
                target: "ea.oidc",
                host = %origin.host,
                "Request for a host not in ALLOWED_HOSTS"
            );
            return Err(EdgeAuthError::PreconditionFailed("Host not allowed".to_string()));
        }
        Ok(origin)
    }

    fn is_allowed(&self, allowed_hosts: &[String]) -> bool {
        let hostname = self.hostname();
        allowed_hosts
            .iter()
            .any(|allowed| *allowed == self.host || allowed == hostname)
    }

    /// `{scheme}://{host}`
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Host without port.
    #[must_use]
    pub fn hostname(&self) -> &str {
        if let Some(rest) = self.host.strip_prefix('[') {
            // IPv6 literal
            return rest.split(']').next().unwrap_or(rest);
        }
        self.host.split(':').next().unwrap_or(&self.host)
    }

    /// Host with its first DNS label removed.
    ///
    /// `www.example.com` becomes `example.com`. Single-label hosts and IP
    /// addresses are returned unchanged.
    #[must_use]
    pub fn parent_domain(&self) -> String {
        let hostname = self.hostname();
        if hostname.parse::<IpAddr>().is_ok() {
            return hostname.to_string();
        }
        match hostname.split_once('.') {
            Some((_, parent)) if !parent.is_empty() => parent.to_string(),
            _ => hostname.to_string(),
        }
    }
}

/// Everything the OIDC handlers need for one request.
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub base_path: String,
    pub redirect_uri: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub signing_secret: SecretString,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub allowed_email_suffix: String,
    pub cookie_domain: String,
    pub verify_id_token: bool,
}

impl RouteContext {
    #[must_use]
    pub fn new(base_path: &str, settings: &RouteSettings, origin: &RequestOrigin) -> Self {
        let base_url = origin.base_url();

        Self {
            base_path: base_path.to_string(),
            redirect_uri: format!("{base_url}{base_path}callback"),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            signing_secret: settings.signing_secret.clone(),
            authorization_endpoint: settings.authorization_endpoint.clone(),
            token_endpoint: settings
                .token_endpoint
                .clone()
                .unwrap_or_else(|| format!("{base_url}{base_path}token")),
            allowed_email_suffix: settings.allowed_email_suffix.clone(),
            cookie_domain: settings
                .cookie_domain
                .clone()
                .unwrap_or_else(|| origin.parent_domain()),
            verify_id_token: settings.verify_id_token,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn settings() -> RouteSettings {
        RouteSettings {
            client_id: "edge-client".to_string(),
            client_secret: SecretString::from("client-secret"),
            signing_secret: SecretString::from("00ff"),
            authorization_endpoint: "https://idp.example.com/authorize".to_string(),
            token_endpoint: None,
            allowed_email_suffix: "@example.com".to_string(),
            cookie_domain: None,
            verify_id_token: false,
        }
    }

    fn origin(scheme: &str, host: &str) -> RequestOrigin {
        RequestOrigin {
            scheme: scheme.to_string(),
            host: host.to_string(),
        }
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/oidc/login"), ("/oidc/", "login"));
        assert_eq!(split_path("/a/b/callback"), ("/a/b/", "callback"));
        assert_eq!(split_path("/login"), ("/", "login"));
        assert_eq!(split_path("/oidc/"), ("/oidc/", ""));
    }

    #[test]
    fn test_derived_endpoints() {
        let ctx = RouteContext::new("/oidc/", &settings(), &origin("https", "www.example.com"));

        assert_eq!(ctx.redirect_uri, "https://www.example.com/oidc/callback");
        assert_eq!(ctx.token_endpoint, "https://www.example.com/oidc/token");
        assert_eq!(ctx.cookie_domain, "example.com");
    }

    #[test]
    fn test_configured_values_win() {
        let mut settings = settings();
        settings.token_endpoint = Some("https://idp.example.com/token".to_string());
        settings.cookie_domain = Some("edge.example.com".to_string());

        let ctx = RouteContext::new("/oidc/", &settings, &origin("https", "www.example.com"));
        assert_eq!(ctx.token_endpoint, "https://idp.example.com/token");
        assert_eq!(ctx.cookie_domain, "edge.example.com");
    }

    #[test]
    fn test_parent_domain() {
        assert_eq!(origin("https", "www.example.com").parent_domain(), "example.com");
        assert_eq!(origin("https", "a.b.example.com:8443").parent_domain(), "b.example.com");
        assert_eq!(origin("http", "localhost:3000").parent_domain(), "localhost");
        assert_eq!(origin("http", "127.0.0.1:8080").parent_domain(), "127.0.0.1");
        assert_eq!(origin("http", "[::1]:8080").parent_domain(), "::1");
    }

    #[test]
    fn test_origin_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("www.example.com"));

        let origin = RequestOrigin::from_headers(&headers, "https", &[]).unwrap();
        assert_eq!(origin.base_url(), "https://www.example.com");

        headers.insert(FORWARDED_PROTO_HEADER, HeaderValue::from_static("HTTP, https"));
        let origin = RequestOrigin::from_headers(&headers, "https", &[]).unwrap();
        assert_eq!(origin.scheme, "http");

        headers.insert(FORWARDED_PROTO_HEADER, HeaderValue::from_static("gopher"));
        let origin = RequestOrigin::from_headers(&headers, "https", &[]).unwrap();
        assert_eq!(origin.scheme, "https");
    }

    #[test]
    fn test_missing_host_is_precondition() {
        let result = RequestOrigin::from_headers(&HeaderMap::new(), "https", &[]);
        assert!(matches!(result, Err(EdgeAuthError::PreconditionFailed(_))));
    }

    #[test]
    fn test_allowed_hosts_are_enforced() {
        let allowed = vec![
            "www.example.com".to_string(),
            "edge.example.com:8443".to_string(),
        ];
        let check = |host: &'static str| {
            let mut headers = HeaderMap::new();
            headers.insert(header::HOST, HeaderValue::from_static(host));
            RequestOrigin::from_headers(&headers, "https", &allowed)
        };

        assert_eq!(check("WWW.Example.com").unwrap().host, "www.example.com");
        assert!(check("www.example.com:444").is_ok());
        assert!(check("edge.example.com:8443").is_ok());

        for spoofed in [
            "attacker.example",
            "edge.example.com:9000",
            "edge.example.com",
            "example.com",
        ] {
            assert!(
                matches!(check(spoofed), Err(EdgeAuthError::PreconditionFailed(_))),
                "{spoofed} should be rejected"
            );
        }
    }
}
