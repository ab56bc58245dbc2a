//! Edge auth configuration.
//!
//! Configuration is loaded from environment variables. Every OIDC route is
//! declared in `OIDC_ROUTES` and configured through `ROUTE_<BASE>_*`
//! variables, where `<BASE>` is derived from the route's base path (see
//! [`route_env_prefix`]). Secrets are held in [`SecretString`].
//!
//! A route without `TOKEN_URL`, or a service without `JWKS_URL`, builds
//! that URL from the request's `Host`. Loading fails in that case unless
//! `ALLOWED_HOSTS` names the hosts the service answers for.

use common::edge_token::decode_signing_key;
use common::jwk::parse_algorithm;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::Algorithm;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use thiserror::Error;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Scheme used when the request carries no `X-Forwarded-Proto`.
pub const DEFAULT_PUBLIC_SCHEME: &str = "https";

/// Prefix of the guarded router.
pub const DEFAULT_GUARD_PREFIX: &str = "/jwt";

/// Upper bound for the JWKS cache TTL.
pub const MAX_JWKS_CACHE_TTL_SECONDS: u64 = 3600;

/// Default timeout for calls to the IdP and JWKS endpoints.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// Largest accepted upstream timeout.
pub const MAX_UPSTREAM_TIMEOUT_SECONDS: u64 = 60;

/// Settings for one OIDC route, keyed by its base path.
#[derive(Clone)]
pub struct RouteSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    /// Hex-encoded HMAC key for edge tokens.
    pub signing_secret: SecretString,
    pub authorization_endpoint: String,
    /// Token endpoint; derived from the request when `None`.
    pub token_endpoint: Option<String>,
    pub allowed_email_suffix: String,
    /// Cookie domain; derived from the request host when `None`.
    pub cookie_domain: Option<String>,
    pub verify_id_token: bool,
}

impl fmt::Debug for RouteSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteSettings")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("signing_secret", &"[REDACTED]")
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("allowed_email_suffix", &self.allowed_email_suffix)
            .field("cookie_domain", &self.cookie_domain)
            .field("verify_id_token", &self.verify_id_token)
            .finish()
    }
}

/// Service configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,

    /// `http` or `https`.
    pub public_scheme: String,

    /// OIDC routes by base path (e.g. `/oidc/`).
    pub routes: BTreeMap<String, RouteSettings>,

    /// JWKS endpoint; `{scheme}://{host}/oidc/certs` when `None`.
    pub jwks_url: Option<String>,

    /// Lowercased `Host` values accepted on OIDC and guard requests. Empty
    /// accepts any host, which is only allowed when no upstream URL is
    /// derived from the request.
    pub allowed_hosts: Vec<String>,

    /// 0 disables caching.
    pub jwks_cache_ttl_seconds: u64,

    /// Algorithm assumed for JWKs without `alg`.
    pub jwt_default_algorithm: Algorithm,

    pub guard_prefix: String,
    pub guard_debug_enabled: bool,
    pub guard_check_not_before: bool,

    pub upstream_timeout_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },

    #[error("Invalid route base path '{0}': must start and end with '/'")]
    InvalidRoute(String),
}

fn invalid(name: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.into(),
    }
}

/// Environment variable prefix for a route base path.
///
/// `/auth/corp/` becomes `ROUTE_AUTH_CORP`; the root path `/` becomes
/// `ROUTE_ROOT`.
#[must_use]
pub fn route_env_prefix(base_path: &str) -> String {
    let trimmed = base_path.trim_matches('/');
    if trimmed.is_empty() {
        return "ROUTE_ROOT".to_string();
    }
    let name: String = trimmed
        .chars()
        .map(|c| match c {
            '/' | '-' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    format!("ROUTE_{name}")
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(
    vars: &HashMap<String, String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match optional(vars, name).as_deref() {
        None => Ok(default),
        Some("true" | "1") => Ok(true),
        Some("false" | "0") => Ok(false),
        Some(other) => Err(invalid(name, format!("expected true or false, got '{other}'"))),
    }
}

fn parse_url(name: &str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| invalid(name, format!("not an absolute URL: {e}")))
}

impl RouteSettings {
    fn from_vars(vars: &HashMap<String, String>, base_path: &str) -> Result<Self, ConfigError> {
        let prefix = route_env_prefix(base_path);
        let key = |suffix: &str| format!("{prefix}_{suffix}");

        let client_id = required(vars, &key("CLIENT_ID"))?;
        let client_secret = SecretString::from(required(vars, &key("CLIENT_SECRET"))?);

        let signing_name = key("SIGNING_SECRET");
        let signing_secret = SecretString::from(required(vars, &signing_name)?);
        decode_signing_key(signing_secret.expose_secret())
            .map_err(|_| invalid(&signing_name, "must be non-empty hex"))?;

        let auth_name = key("AUTH_URL");
        let authorization_endpoint = required(vars, &auth_name)?;
        parse_url(&auth_name, &authorization_endpoint)?;

        let token_name = key("TOKEN_URL");
        let token_endpoint = optional(vars, &token_name);
        if let Some(token_endpoint) = &token_endpoint {
            parse_url(&token_name, token_endpoint)?;
        }

        Ok(Self {
            client_id,
            client_secret,
            signing_secret,
            authorization_endpoint,
            token_endpoint,
            allowed_email_suffix: required(vars, &key("ALLOWED_EMAIL_SUFFIX"))?,
            cookie_domain: optional(vars, &key("COOKIE_DOMAIN")),
            verify_id_token: parse_bool(vars, &key("VERIFY_ID_TOKEN"), false)?,
        })
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let public_scheme = optional(vars, "PUBLIC_SCHEME")
            .unwrap_or_else(|| DEFAULT_PUBLIC_SCHEME.to_string())
            .to_ascii_lowercase();
        if public_scheme != "http" && public_scheme != "https" {
            return Err(invalid(
                "PUBLIC_SCHEME",
                format!("expected http or https, got '{public_scheme}'"),
            ));
        }

        let route_list = required(vars, "OIDC_ROUTES")?;
        let mut routes = BTreeMap::new();
        for base_path in route_list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if !base_path.starts_with('/') || !base_path.ends_with('/') {
                return Err(ConfigError::InvalidRoute(base_path.to_string()));
            }
            routes.insert(
                base_path.to_string(),
                RouteSettings::from_vars(vars, base_path)?,
            );
        }
        if routes.is_empty() {
            return Err(invalid("OIDC_ROUTES", "at least one route is required"));
        }

        let jwks_url = optional(vars, "JWKS_URL");
        if let Some(jwks_url) = &jwks_url {
            parse_url("JWKS_URL", jwks_url)?;
        }

        let allowed_hosts: Vec<String> = optional(vars, "ALLOWED_HOSTS")
            .map(|list| {
                list.split(',')
                    .map(|host| host.trim().to_ascii_lowercase())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if let Some(host) = allowed_hosts
            .iter()
            .find(|host| host.contains(|c: char| c == '/' || c.is_whitespace()))
        {
            return Err(invalid(
                "ALLOWED_HOSTS",
                format!("'{host}' is not a host[:port] value"),
            ));
        }

        let derives_from_host =
            jwks_url.is_none() || routes.values().any(|route| route.token_endpoint.is_none());
        if derives_from_host && allowed_hosts.is_empty() {
            return Err(invalid(
                "ALLOWED_HOSTS",
                "required unless JWKS_URL and every route's TOKEN_URL are set",
            ));
        }

        let jwks_cache_ttl_seconds = if let Some(value_str) = optional(vars, "JWKS_CACHE_TTL_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                invalid(
                    "JWKS_CACHE_TTL_SECONDS",
                    format!("must be a non-negative integer, got '{value_str}': {e}"),
                )
            })?;
            if value > MAX_JWKS_CACHE_TTL_SECONDS {
                return Err(invalid(
                    "JWKS_CACHE_TTL_SECONDS",
                    format!("must not exceed {MAX_JWKS_CACHE_TTL_SECONDS}, got {value}"),
                ));
            }
            value
        } else {
            0
        };

        let jwt_default_algorithm = match optional(vars, "JWT_DEFAULT_ALGORITHM") {
            Some(name) => parse_algorithm(&name)
                .map_err(|e| invalid("JWT_DEFAULT_ALGORITHM", e.to_string()))?,
            None => Algorithm::RS256,
        };

        let guard_prefix =
            optional(vars, "GUARD_PREFIX").unwrap_or_else(|| DEFAULT_GUARD_PREFIX.to_string());
        if !guard_prefix.starts_with('/') || guard_prefix.len() < 2 || guard_prefix.ends_with('/') {
            return Err(invalid(
                "GUARD_PREFIX",
                "must start with '/', not end with '/', and not be the root",
            ));
        }

        let upstream_timeout_seconds =
            if let Some(value_str) = optional(vars, "UPSTREAM_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    invalid(
                        "UPSTREAM_TIMEOUT_SECONDS",
                        format!("must be a positive integer, got '{value_str}': {e}"),
                    )
                })?;
                if value == 0 || value > MAX_UPSTREAM_TIMEOUT_SECONDS {
                    return Err(invalid(
                        "UPSTREAM_TIMEOUT_SECONDS",
                        format!("must be between 1 and {MAX_UPSTREAM_TIMEOUT_SECONDS}, got {value}"),
                    ));
                }
                value
            } else {
                DEFAULT_UPSTREAM_TIMEOUT_SECONDS
            };

        Ok(Config {
            bind_address,
            public_scheme,
            routes,
            jwks_url,
            allowed_hosts,
            jwks_cache_ttl_seconds,
            jwt_default_algorithm,
            guard_prefix,
            guard_debug_enabled: parse_bool(vars, "GUARD_DEBUG_ENABLED", false)?,
            guard_check_not_before: parse_bool(vars, "GUARD_CHECK_NOT_BEFORE", false)?,
            upstream_timeout_seconds,
        })
    }

    /// Settings for a base path, if configured.
    #[must_use]
    pub fn route(&self, base_path: &str) -> Option<&RouteSettings> {
        self.routes.get(base_path)
    }
}
