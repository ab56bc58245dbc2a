//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible signing keys for ID tokens and the JWKs that
//! publish them. Ed25519 keys are derived from a seed; the two RSA keys are
//! fixed PEM fixtures so RS256 tokens can be tested without key generation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};
use thiserror::Error;

/// Hex signing secret used for edge tokens in tests.
pub const TEST_SIGNING_SECRET_HEX: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

const RSA_SIGNING_A_PEM: &str = include_str!("../fixtures/rsa_signing_a.pem");
const RSA_SIGNING_B_PEM: &str = include_str!("../fixtures/rsa_signing_b.pem");

/// Modulus of `rsa_signing_a.pem` (base64url).
pub const RSA_A_MODULUS: &str = "1OukXbfYnOZFKwLvKJHT3wnuRHFbT87BBS8hQ5alCLAmDxDbAz4cqV9l2qcAsNncqtWVlyokZvoHfum7dI3FnYZkqpkJ2707d1UOX_xquI1zct3ngeXWPk1wOVyhApVas_HCnba341-RyMjsOuZvrhUqVLbYyDjRxaSRdHLvps5zAClIv1eheoWgQSf3yuqBMsSyMvW-jrrDXYMGHcdoiguzxXtwKnI2dMVu32q28JPIJvMOFaXy2sjrAA07eVw9nDoBSj0HhXUqNxKqjhbeMP9VjrLbdlutvn1oqlkBl6U0QdrHfbA06nZgA4uPlaoyCyAqvtJkuLAl9gx6ZcIP9Q";

/// Modulus of `rsa_signing_b.pem` (base64url).
pub const RSA_B_MODULUS: &str = "ucgeabw93aSQhpO00iipbixmJjMR2ONoMygaeaPwKP4SlQhye9uCoiuwDHLzL28D1w4Vk435zfyeIuxyvTZcKglgD2zyzjMrnQfUQIkSso-AMLR8lLLEWaJ-p92LBKXGZJ-DJJnPijiwN3LRNJhJkAh_O6ZMbD6BlvhQ7x69s6F31ci17_ThDmSCHRRdLbeDY3xFtweuKF3jOAEG94-KDH-fthpg3m3ajBY3LXnKaPluJYzjQU-ek1Ncab9WP-e7wWh72gJ6IzKFnUG_Pie9TfN63ufm-hJZHLtv6SZtLTFTDzBiUcFele8red7CiLlZJSGmyPVJqDER-AaJXUbzdQ";

const RSA_EXPONENT: &str = "AQAB";

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),
}

/// A signing key together with the JWK that publishes it.
#[derive(Clone)]
pub struct TestSigningKey {
    kid: String,
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    jwk: Value,
}

impl TestSigningKey {
    /// Deterministic Ed25519 key; the same seed always produces the same key.
    pub fn ed25519(kid: &str, seed: u8) -> Result<Self, FixtureError> {
        let seed_bytes = seed_bytes(seed);
        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {e:?}")))?;
        let x = URL_SAFE_NO_PAD.encode(key_pair.public_key().as_ref());

        Ok(Self {
            kid: kid.to_string(),
            algorithm: Algorithm::EdDSA,
            encoding_key: EncodingKey::from_ed_der(&build_pkcs8_from_seed(&seed_bytes)),
            jwk: json!({
                "kty": "OKP",
                "crv": "Ed25519",
                "alg": "EdDSA",
                "use": "sig",
                "kid": kid,
                "x": x,
            }),
        })
    }

    /// RS256 key from `fixtures/rsa_signing_a.pem`.
    pub fn rsa_a(kid: &str) -> Result<Self, FixtureError> {
        Self::rsa(kid, RSA_SIGNING_A_PEM, RSA_A_MODULUS)
    }

    /// RS256 key from `fixtures/rsa_signing_b.pem`.
    pub fn rsa_b(kid: &str) -> Result<Self, FixtureError> {
        Self::rsa(kid, RSA_SIGNING_B_PEM, RSA_B_MODULUS)
    }

    fn rsa(kid: &str, pem: &str, modulus: &str) -> Result<Self, FixtureError> {
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| FixtureError::Crypto(format!("Failed to load RSA fixture: {e}")))?;

        Ok(Self {
            kid: kid.to_string(),
            algorithm: Algorithm::RS256,
            encoding_key,
            jwk: json!({
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "kid": kid,
                "n": modulus,
                "e": RSA_EXPONENT,
            }),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The public JWK for this key.
    pub fn jwk(&self) -> Value {
        self.jwk.clone()
    }

    /// Sign `claims` as a compact JWT with `kid` in the header.
    pub fn sign(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.kid = Some(self.kid.clone());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).expect("test token signing")
    }
}

/// `{"keys": [...]}` for the given keys.
pub fn jwks_document(keys: &[&TestSigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|key| key.jwk()).collect::<Vec<_>>() })
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed
///
/// This is a test-only utility. Production code must use ring::rand::SystemRandom.
pub fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    // SEQUENCE { INTEGER 0, SEQUENCE { OID 1.3.101.112 }, OCTET STRING { OCTET STRING seed } }
    let mut pkcs8 = Vec::with_capacity(48);
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);
    pkcs8
}
