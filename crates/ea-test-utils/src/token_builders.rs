//! Builder patterns for test data construction
//!
//! Provides a fluent API for ID token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for ID token claims.
///
/// # Example
/// ```rust,ignore
/// let claims = IdTokenBuilder::new()
///     .with_email("alice@example.com")
///     .with_nonce(&nonce)
///     .expires_in(3600)
///     .build();
/// let id_token = key.sign(&claims);
/// ```
pub struct IdTokenBuilder {
    claims: Map<String, Value>,
}

impl IdTokenBuilder {
    /// Defaults: `sub`, `iss`, `aud`, `iat` now, `exp` in one hour, no email.
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("sub".to_string(), json!("test-subject"));
        claims.insert("iss".to_string(), json!("https://idp.example.com"));
        claims.insert("aud".to_string(), json!("edge-client"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set a verified email.
    pub fn with_email(self, email: &str) -> Self {
        self.claim("email", json!(email))
            .claim("email_verified", json!(true))
    }

    /// Mark the email as unverified.
    pub fn unverified(self) -> Self {
        self.claim("email_verified", json!(false))
    }

    pub fn with_nonce(self, nonce: &str) -> Self {
        self.claim("nonce", json!(nonce))
    }

    /// Set expiration in seconds from now (negative for already expired).
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.claim("exp", json!(exp))
    }

    pub fn without_exp(mut self) -> Self {
        self.claims.remove("exp");
        self
    }

    /// Set `nbf` in seconds from now.
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.claim("nbf", json!(nbf))
    }

    /// Set any other claim.
    pub fn claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for IdTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
