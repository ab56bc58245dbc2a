//! Identity claims carried by an OIDC ID token.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Claims the edge reads from an ID token.
///
/// Only `email`, `email_verified`, `nonce`, `exp`, `nbf` and `sub` are
/// interpreted. Everything else is kept in `extra` so the debug echo can
/// return the full payload.
///
/// # Security
///
/// `email` and `sub` are redacted in Debug output.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// Expiration (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before (Unix epoch seconds).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for IdentityClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityClaims")
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("email_verified", &self.email_verified)
            .field("nonce", &self.nonce)
            .field("exp", &self.exp)
            .field("nbf", &self.nbf)
            .field("sub", &self.sub.as_ref().map(|_| "[REDACTED]"))
            .field("extra_claims", &self.extra.len())
            .finish()
    }
}

impl IdentityClaims {
    /// The verified email address, if the IdP asserted one.
    #[must_use]
    pub fn verified_email(&self) -> Option<&str> {
        if self.email_verified {
            self.email.as_deref()
        } else {
            None
        }
    }
}
