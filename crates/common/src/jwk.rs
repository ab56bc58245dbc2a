//! JSON Web Key parsing and import.
//!
//! A [`JwkSet`] is the body served by a JWKS endpoint. [`import_key_set`]
//! turns it into [`VerificationKey`]s the verifier can use, skipping
//! encryption keys and anything it cannot import.

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single JSON Web Key (RFC 7517). Only public parameters are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC / OKP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// A JWKS document: `{"keys": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Errors raised while importing a JWK.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyImportError {
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("algorithm {alg} cannot be used with key type {kty}")]
    AlgorithmMismatch { kty: String, alg: String },

    #[error("missing key parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Parse an algorithm name such as `RS256` or `EdDSA`.
///
/// # Errors
///
/// Returns `KeyImportError::UnsupportedAlgorithm` for unknown names.
pub fn parse_algorithm(name: &str) -> Result<Algorithm, KeyImportError> {
    Algorithm::from_str(name).map_err(|_| KeyImportError::UnsupportedAlgorithm(name.to_string()))
}

/// A public key ready for signature verification.
#[derive(Clone)]
pub struct VerificationKey {
    pub kid: Option<String>,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl VerificationKey {
    /// Import a JWK.
    ///
    /// The algorithm is the JWK's `alg` when present, else `default_alg`. It
    /// must belong to the key type's family.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyImportError`] if the key type or algorithm is not
    /// supported, they do not match, or the key material is missing or
    /// invalid.
    pub fn from_jwk(jwk: &Jwk, default_alg: Algorithm) -> Result<Self, KeyImportError> {
        let algorithm = match &jwk.alg {
            Some(alg) => parse_algorithm(alg)?,
            None => default_alg,
        };

        let mismatch = || KeyImportError::AlgorithmMismatch {
            kty: jwk.kty.clone(),
            alg: format!("{algorithm:?}"),
        };

        let key = match jwk.kty.as_str() {
            "RSA" => {
                if !matches!(
                    algorithm,
                    Algorithm::RS256
                        | Algorithm::RS384
                        | Algorithm::RS512
                        | Algorithm::PS256
                        | Algorithm::PS384
                        | Algorithm::PS512
                ) {
                    return Err(mismatch());
                }
                let n = jwk.n.as_deref().ok_or(KeyImportError::MissingParameter("n"))?;
                let e = jwk.e.as_deref().ok_or(KeyImportError::MissingParameter("e"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|err| KeyImportError::InvalidKey(err.to_string()))?
            }
            "EC" => {
                if !matches!(algorithm, Algorithm::ES256 | Algorithm::ES384) {
                    return Err(mismatch());
                }
                let x = jwk.x.as_deref().ok_or(KeyImportError::MissingParameter("x"))?;
                let y = jwk.y.as_deref().ok_or(KeyImportError::MissingParameter("y"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|err| KeyImportError::InvalidKey(err.to_string()))?
            }
            "OKP" => {
                if algorithm != Algorithm::EdDSA {
                    return Err(mismatch());
                }
                if let Some(crv) = &jwk.crv {
                    if crv != "Ed25519" {
                        return Err(KeyImportError::InvalidKey(format!(
                            "unsupported curve {crv}"
                        )));
                    }
                }
                let x = jwk.x.as_deref().ok_or(KeyImportError::MissingParameter("x"))?;
                DecodingKey::from_ed_components(x)
                    .map_err(|err| KeyImportError::InvalidKey(err.to_string()))?
            }
            other => return Err(KeyImportError::UnsupportedKeyType(other.to_string())),
        };

        Ok(Self {
            kid: jwk.kid.clone(),
            algorithm,
            key,
        })
    }
}

/// Import every usable signing key from a JWKS document, in order.
///
/// Keys marked `use=enc` are skipped silently. Keys that fail to import are
/// skipped with a warning.
#[must_use]
pub fn import_key_set(set: &JwkSet, default_alg: Algorithm) -> Vec<VerificationKey> {
    set.keys
        .iter()
        .filter(|jwk| jwk.key_use.as_deref() != Some("enc"))
        .filter_map(|jwk| match VerificationKey::from_jwk(jwk, default_alg) {
            Ok(key) => Some(key),
            Err(e) => {
                tracing::warn!(
                    target: "common.jwk",
                    kid = ?jwk.kid,
                    kty = %jwk.kty,
                    error = %e,
                    "Skipping JWK that cannot be imported"
                );
                None
            }
        })
        .collect()
}
