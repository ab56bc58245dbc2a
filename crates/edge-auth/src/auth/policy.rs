//! Access policy evaluation.
//!
//! A policy maps identity claims to an [`AccessDecision`]. The callback
//! handler obtains the policy for a route from a [`PolicyFactory`], so the
//! predicate can be replaced without touching the flow controller.

use crate::config::RouteSettings;
use common::claims::IdentityClaims;
use serde::Serialize;
use std::sync::Arc;

/// ACL granted by [`EmailSuffixPolicy`].
pub const WILDCARD_ACL: &str = "/*";

/// Outcome of a policy evaluation.
///
/// Serializes to `{"acl": [...], "payload": "..."}` or `{"info": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AccessDecision {
    /// `acl` is never empty.
    Grant { acl: Vec<String>, payload: String },
    Deny { info: String },
}

/// Decides whether an authenticated identity may access a route.
pub trait AccessPolicy: Send + Sync {
    fn evaluate(&self, claims: &IdentityClaims) -> AccessDecision;
}

/// Grants `/*` to verified emails ending with a configured suffix.
#[derive(Debug, Clone)]
pub struct EmailSuffixPolicy {
    allowed_suffix: String,
}

impl EmailSuffixPolicy {
    pub fn new(allowed_suffix: impl Into<String>) -> Self {
        Self {
            allowed_suffix: allowed_suffix.into(),
        }
    }
}

impl AccessPolicy for EmailSuffixPolicy {
    fn evaluate(&self, claims: &IdentityClaims) -> AccessDecision {
        match claims.verified_email() {
            Some(email) if email.ends_with(&self.allowed_suffix) => AccessDecision::Grant {
                acl: vec![WILDCARD_ACL.to_string()],
                payload: email.to_string(),
            },
            _ => AccessDecision::Deny {
                info: format!(
                    "restricted area, access limited to {} accounts",
                    self.allowed_suffix
                ),
            },
        }
    }
}

/// Builds the policy for a route.
pub trait PolicyFactory: Send + Sync {
    fn policy_for(&self, base_path: &str, settings: &RouteSettings) -> Arc<dyn AccessPolicy>;
}

/// Default factory: an [`EmailSuffixPolicy`] from the route's
/// `ALLOWED_EMAIL_SUFFIX`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailSuffixPolicyFactory;

impl PolicyFactory for EmailSuffixPolicyFactory {
    fn policy_for(&self, _base_path: &str, settings: &RouteSettings) -> Arc<dyn AccessPolicy> {
        Arc::new(EmailSuffixPolicy::new(settings.allowed_email_suffix.clone()))
    }
}
