//! Structural JWT decoding.
//!
//! [`decode_jwt`] splits a compact JWS into header, payload and signature and
//! parses the first two as JSON. It makes no trust decision: the signature
//! is kept as an opaque string for [`crate::verifier`] to check.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing
//! - Decode errors are a distinct kind from signature errors so callers can
//!   tell a garbled credential from a forged one

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Oversized tokens are rejected before any base64 or JSON work.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while decoding a JWT's structure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtDecodeError {
    /// Token exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds {MAX_JWT_SIZE_BYTES} bytes")]
    TooLarge,

    /// Token does not have exactly three `.`-separated segments.
    #[error("token must have 3 segments, found {0}")]
    SegmentCount(usize),

    /// A segment is not valid base64url, UTF-8 or JSON.
    #[error("invalid {segment}: {message}")]
    InvalidSegment {
        segment: &'static str,
        message: String,
    },

    /// The payload does not match the requested claims shape.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
}

// =============================================================================
// Decoded Types
// =============================================================================

/// The JOSE header fields the edge cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
}

/// A structurally decoded (not verified) JWT.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedJwt {
    pub header: JwtHeader,
    pub payload: Map<String, Value>,
    pub signature: String,
}

impl DecodedJwt {
    /// Deserialize the payload into a claims type.
    ///
    /// # Errors
    ///
    /// Returns `JwtDecodeError::InvalidClaims` if the payload does not fit `T`.
    pub fn claims<T: DeserializeOwned>(&self) -> Result<T, JwtDecodeError> {
        serde_json::from_value(Value::Object(self.payload.clone()))
            .map_err(|e| JwtDecodeError::InvalidClaims(e.to_string()))
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a compact JWT into header, payload and raw signature.
///
/// # Errors
///
/// Returns a [`JwtDecodeError`] if the token is too large, does not have
/// three segments, or a header/payload segment is not a base64url-encoded
/// JSON object.
pub fn decode_jwt(token: &str) -> Result<DecodedJwt, JwtDecodeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum"
        );
        return Err(JwtDecodeError::TooLarge);
    }

    let segments: Vec<&str> = token.split('.').collect();
    let [header_b64, payload_b64, signature] = segments.as_slice() else {
        return Err(JwtDecodeError::SegmentCount(segments.len()));
    };

    let header_json = decode_segment(header_b64, "header")?;
    let header: JwtHeader =
        serde_json::from_value(Value::Object(header_json)).map_err(|e| {
            JwtDecodeError::InvalidSegment {
                segment: "header",
                message: e.to_string(),
            }
        })?;

    let payload = decode_segment(payload_b64, "payload")?;

    Ok(DecodedJwt {
        header,
        payload,
        signature: (*signature).to_string(),
    })
}

fn decode_segment(
    segment_b64: &str,
    segment: &'static str,
) -> Result<Map<String, Value>, JwtDecodeError> {
    let invalid = |message: String| JwtDecodeError::InvalidSegment { segment, message };

    let bytes = URL_SAFE_NO_PAD
        .decode(segment_b64)
        .map_err(|e| invalid(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| invalid(e.to_string()))?;

    match serde_json::from_str::<Value>(&text).map_err(|e| invalid(e.to_string()))? {
        Value::Object(map) => Ok(map),
        _ => Err(invalid("not a JSON object".to_string())),
    }
}
