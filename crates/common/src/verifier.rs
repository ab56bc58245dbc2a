//! JWT signature and time-window verification.
//!
//! [`JwtVerifier`] is a stateless value: it holds only its [`VerifyPolicy`]
//! and is given the candidate keys and the current time on every call, so
//! it can be shared freely across requests.
//!
//! # Key selection
//!
//! Keys are tried in the order supplied. A key whose algorithm differs from
//! the token header's `alg` is skipped; the first key that verifies the
//! signature wins. `kid` correlation is not required.
//!
//! # Time checks
//!
//! `jsonwebtoken`'s own `exp`/`nbf` checks are disabled. They are applied
//! here, after the signature matches, according to the policy:
//!
//! - `check_expiration`: `now >= exp` is `Expired`; a token without `exp`
//!   is also `Expired`
//! - `check_not_before`: `now < nbf` is `NotYetValid`

use crate::claims::IdentityClaims;
use crate::jwk::{parse_algorithm, VerificationKey};
use crate::jwt::{decode_jwt, JwtDecodeError};
use jsonwebtoken::{errors::ErrorKind, Validation};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Which time claims the verifier enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub check_expiration: bool,
    pub check_not_before: bool,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            check_expiration: true,
            check_not_before: false,
        }
    }
}

/// Reasons a JWT fails verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtVerifyError {
    #[error("token could not be decoded: {0}")]
    DecodeFailure(#[from] JwtDecodeError),

    #[error("no key verified the token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("token is not yet valid")]
    NotYetValid,
}

/// Verifies compact JWTs against caller-supplied keys.
#[derive(Debug, Clone, Default)]
pub struct JwtVerifier {
    policy: VerifyPolicy,
}

impl JwtVerifier {
    #[must_use]
    pub fn new(policy: VerifyPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> VerifyPolicy {
        self.policy
    }

    /// Verify `token` against `keys` at time `now` (Unix epoch seconds).
    ///
    /// # Errors
    ///
    /// - `DecodeFailure` if the token is structurally invalid
    /// - `InvalidSignature` if no key verifies it (including an empty key set)
    /// - `Expired` / `NotYetValid` per the policy
    pub fn verify(
        &self,
        token: &str,
        keys: &[VerificationKey],
        now: i64,
    ) -> Result<IdentityClaims, JwtVerifyError> {
        let decoded = decode_jwt(token)?;
        let claims: IdentityClaims = decoded.claims()?;

        let Ok(header_alg) = parse_algorithm(&decoded.header.alg) else {
            tracing::debug!(
                target: "common.verifier",
                alg = %decoded.header.alg,
                "Token uses an unsupported algorithm"
            );
            return Err(JwtVerifyError::InvalidSignature);
        };

        let mut validation = Validation::new(header_alg);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let matched = keys
            .iter()
            .filter(|key| key.algorithm == header_alg)
            .find(|key| {
                match jsonwebtoken::decode::<Value>(token, &key.key, &validation) {
                    Ok(_) => true,
                    Err(e) => {
                        if !matches!(e.kind(), ErrorKind::InvalidSignature) {
                            tracing::debug!(
                                target: "common.verifier",
                                kid = ?key.kid,
                                error = %e,
                                "Key rejected token"
                            );
                        }
                        false
                    }
                }
            });

        let Some(key) = matched else {
            tracing::debug!(
                target: "common.verifier",
                candidates = keys.len(),
                "No key verified the token signature"
            );
            return Err(JwtVerifyError::InvalidSignature);
        };

        tracing::trace!(target: "common.verifier", kid = ?key.kid, "Signature verified");

        if self.policy.check_expiration {
            match claims.exp {
                Some(exp) if now < exp => {}
                _ => return Err(JwtVerifyError::Expired),
            }
        }

        if self.policy.check_not_before {
            if let Some(nbf) = claims.nbf {
                if now < nbf {
                    return Err(JwtVerifyError::NotYetValid);
                }
            }
        }

        Ok(claims)
    }

    /// Verify using the wall clock.
    ///
    /// # Errors
    ///
    /// Same as [`JwtVerifier::verify`].
    pub fn verify_now(
        &self,
        token: &str,
        keys: &[VerificationKey],
    ) -> Result<IdentityClaims, JwtVerifyError> {
        self.verify(token, keys, chrono::Utc::now().timestamp())
    }
}
