//! HMAC-signed capability token ("edge token").
//!
//! The token binds an access-control list, a validity window and an opaque
//! payload under an HMAC-SHA256 computed with a shared secret. The field
//! layout is the Akamai EdgeAuth one:
//!
//! ```text
//! st=<start>~exp=<end>~acl=<pattern>!<pattern>~data=<payload>~hmac=<hex>
//! ```
//!
//! The escaping differs. EdgeAuth uses `encodeURIComponent`, which encodes
//! `/` and leaves `!`, `~`, `*`, `'`, `(` and `)` alone. [`escape_early`]
//! keeps `/` and `*` literal so ACL paths stay readable, and escapes the
//! rest so the delimiters never appear unescaped. An edge server validating
//! these tokens must recompute the MAC over the token text as received, not
//! over re-escaped fields.
//!
//! # Security
//!
//! - Every ACL pattern and the payload are escaped BEFORE the fields are
//!   joined. Escaping after joining would let a pattern containing `!` or
//!   `~` forge extra ACL entries or fields.
//! - The MAC covers the canonical string verbatim; any change to a field
//!   invalidates it.
//! - MAC comparison is constant-time (`ring::hmac::verify`).

use ring::hmac;
use std::fmt::Write as _;
use thiserror::Error;

/// Separator between token fields.
pub const FIELD_DELIMITER: &str = "~";

/// Separator between ACL patterns inside the `acl` field.
pub const ACL_DELIMITER: &str = "!";

/// Marker that starts the MAC field; everything before it is signed.
const HMAC_FIELD: &str = "~hmac=";

/// Errors produced while generating, parsing or verifying an edge token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EdgeTokenError {
    /// No ACL pattern was supplied, or a pattern was empty.
    #[error("ACL must contain at least one non-empty pattern")]
    EmptyAcl,

    /// The validity window is zero, negative or overflows the end time.
    #[error("Token window must be positive, got {0}")]
    InvalidWindow(i64),

    /// The signing secret is empty or not hex encoded.
    #[error("Signing key must be non-empty hex")]
    InvalidKey,

    /// The token does not have the fixed field layout.
    #[error("Malformed edge token: {0}")]
    Malformed(String),

    /// The recomputed MAC does not match the embedded one.
    #[error("Edge token signature mismatch")]
    SignatureMismatch,

    /// The current time is past the end of the validity window.
    #[error("Edge token expired")]
    Expired,

    /// The current time is before the start of the validity window.
    #[error("Edge token not yet valid")]
    NotYetValid,
}

/// Decode a hex-encoded signing secret into raw key bytes.
///
/// # Errors
///
/// Returns `EdgeTokenError::InvalidKey` if the secret is empty or not hex.
pub fn decode_signing_key(secret_hex: &str) -> Result<Vec<u8>, EdgeTokenError> {
    let key = hex::decode(secret_hex.trim()).map_err(|_| EdgeTokenError::InvalidKey)?;
    if key.is_empty() {
        return Err(EdgeTokenError::InvalidKey);
    }
    Ok(key)
}

/// Generate an ACL token.
///
/// # Arguments
///
/// * `key` - Raw HMAC key bytes (see [`decode_signing_key`])
/// * `start_time` - Start of validity (Unix epoch seconds)
/// * `window_seconds` - Validity duration in seconds
/// * `acl` - Path patterns the bearer may access, in order
/// * `payload` - Opaque value bound to the signature (omitted when empty)
///
/// # Errors
///
/// Returns `EmptyAcl`, `InvalidWindow` or `InvalidKey` for invalid input.
pub fn generate_acl_token<S: AsRef<str>>(
    key: &[u8],
    start_time: i64,
    window_seconds: i64,
    acl: &[S],
    payload: &str,
) -> Result<String, EdgeTokenError> {
    if key.is_empty() {
        return Err(EdgeTokenError::InvalidKey);
    }
    if acl.is_empty() || acl.iter().any(|pattern| pattern.as_ref().is_empty()) {
        return Err(EdgeTokenError::EmptyAcl);
    }
    if window_seconds <= 0 {
        return Err(EdgeTokenError::InvalidWindow(window_seconds));
    }
    let end_time = start_time
        .checked_add(window_seconds)
        .ok_or(EdgeTokenError::InvalidWindow(window_seconds))?;

    let escaped_acl: Vec<String> = acl
        .iter()
        .map(|pattern| escape_early(pattern.as_ref()))
        .collect();
    let acl_field = escaped_acl.join(ACL_DELIMITER);

    let data_field = if payload.is_empty() {
        None
    } else {
        Some(escape_early(payload))
    };

    let canonical = canonical_string(start_time, end_time, &acl_field, data_field.as_deref());
    let mac = sign(key, &canonical);

    Ok(format!("{canonical}{HMAC_FIELD}{mac}"))
}

/// Percent-encode a value before it is placed into a token field.
///
/// Bytes outside `A-Z a-z 0-9 - _ . / *` become `%xx` with lowercase hex.
/// In particular `~`, `!`, `=` and `%` are always escaped.
#[must_use]
pub fn escape_early(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        if is_unescaped(byte) {
            escaped.push(char::from(byte));
        } else {
            // Writing to a String cannot fail
            let _ = write!(escaped, "%{byte:02x}");
        }
    }
    escaped
}

fn is_unescaped(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'/' | b'*')
}

fn unescape(value: &str) -> Result<String, EdgeTokenError> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while let Some(&byte) = bytes.get(pos) {
        if byte == b'%' {
            let hex_pair = value
                .get(pos + 1..pos + 3)
                .ok_or_else(|| EdgeTokenError::Malformed("truncated escape".to_string()))?;
            let decoded_byte = u8::from_str_radix(hex_pair, 16)
                .map_err(|_| EdgeTokenError::Malformed("invalid escape".to_string()))?;
            decoded.push(decoded_byte);
            pos += 3;
        } else if is_unescaped(byte) {
            decoded.push(byte);
            pos += 1;
        } else {
            return Err(EdgeTokenError::Malformed(format!(
                "unescaped character 0x{byte:02x}"
            )));
        }
    }

    String::from_utf8(decoded)
        .map_err(|_| EdgeTokenError::Malformed("field is not UTF-8".to_string()))
}

fn canonical_string(start_time: i64, end_time: i64, acl_field: &str, data: Option<&str>) -> String {
    let mut canonical = format!("st={start_time}~exp={end_time}~acl={acl_field}");
    if let Some(data) = data {
        canonical.push_str(FIELD_DELIMITER);
        canonical.push_str("data=");
        canonical.push_str(data);
    }
    canonical
}

fn sign(key: &[u8], canonical: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, key);
    let tag = hmac::sign(&key, canonical.as_bytes());
    hex::encode(tag.as_ref())
}

/// A parsed edge token.
///
/// Parsing only checks the layout. Call [`EdgeToken::verify`] before
/// trusting any field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeToken {
    start_time: i64,
    end_time: i64,
    acl: Vec<String>,
    payload: Option<String>,
    canonical: String,
    mac: Vec<u8>,
}

impl EdgeToken {
    /// Parse a token string into its fields.
    ///
    /// # Errors
    ///
    /// Returns `EdgeTokenError::Malformed` if the token deviates from the
    /// fixed layout (field order, names, escaping, numeric times, hex MAC)
    /// or `exp` is not after `st`.
    pub fn parse(token: &str) -> Result<Self, EdgeTokenError> {
        let (canonical, mac_hex) = token
            .rsplit_once(HMAC_FIELD)
            .ok_or_else(|| EdgeTokenError::Malformed("missing hmac field".to_string()))?;
        let mac = hex::decode(mac_hex)
            .map_err(|_| EdgeTokenError::Malformed("hmac is not hex".to_string()))?;

        let mut fields = canonical.split(FIELD_DELIMITER);

        let start_time = parse_time(field_value(fields.next(), "st")?)?;
        let end_time = parse_time(field_value(fields.next(), "exp")?)?;
        if end_time <= start_time {
            return Err(EdgeTokenError::Malformed("exp must be after st".to_string()));
        }
        let acl = field_value(fields.next(), "acl")?
            .split(ACL_DELIMITER)
            .map(|pattern| {
                let pattern = unescape(pattern)?;
                if pattern.is_empty() {
                    return Err(EdgeTokenError::Malformed("empty ACL pattern".to_string()));
                }
                Ok(pattern)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let payload = match fields.next() {
            Some(field) => Some(unescape(field_value(Some(field), "data")?)?),
            None => None,
        };

        if fields.next().is_some() {
            return Err(EdgeTokenError::Malformed("unexpected field".to_string()));
        }

        Ok(Self {
            start_time,
            end_time,
            acl,
            payload,
            canonical: canonical.to_string(),
            mac,
        })
    }

    /// Verify the MAC and the validity window at `now`.
    ///
    /// # Errors
    ///
    /// - `SignatureMismatch` if the MAC does not cover this exact token
    /// - `Expired` if `now` is past the end of the window
    /// - `NotYetValid` if `now` is before the start of the window
    pub fn verify(&self, key: &[u8], now: i64) -> Result<(), EdgeTokenError> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, key);
        hmac::verify(&key, self.canonical.as_bytes(), &self.mac)
            .map_err(|_| EdgeTokenError::SignatureMismatch)?;

        if now > self.end_time {
            return Err(EdgeTokenError::Expired);
        }
        if now < self.start_time {
            return Err(EdgeTokenError::NotYetValid);
        }
        Ok(())
    }

    /// Start of validity (Unix epoch seconds).
    #[must_use]
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// End of validity (Unix epoch seconds).
    #[must_use]
    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    /// Validity duration in seconds.
    #[must_use]
    pub fn window_seconds(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Unescaped ACL patterns, in token order.
    #[must_use]
    pub fn acl(&self) -> &[String] {
        &self.acl
    }

    /// Unescaped payload, if the token carries one.
    #[must_use]
    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }
}

fn field_value<'a>(field: Option<&'a str>, name: &str) -> Result<&'a str, EdgeTokenError> {
    field
        .and_then(|f| f.split_once('='))
        .filter(|(key, _)| *key == name)
        .map(|(_, value)| value)
        .ok_or_else(|| EdgeTokenError::Malformed(format!("expected field '{name}'")))
}

fn parse_time(value: &str) -> Result<i64, EdgeTokenError> {
    value
        .parse()
        .map_err(|_| EdgeTokenError::Malformed(format!("invalid timestamp '{value}'")))
}
