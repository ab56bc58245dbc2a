//! Secret types for values that must never reach a log line.
//!
//! Re-exports [`secrecy`]'s wrappers. The edge keeps OAuth client secrets
//! and capability-token signing secrets in [`SecretString`]; anything that
//! derives `Debug` over them prints a redaction marker instead of the value,
//! and the inner string is zeroized on drop.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ClientCredentials {
//!     client_id: String,
//!     client_secret: SecretString,
//! }
//!
//! let creds = ClientCredentials {
//!     client_id: "edge-client".to_string(),
//!     client_secret: SecretString::from("s3cr3t"),
//! };
//! assert!(!format!("{creds:?}").contains("s3cr3t"));
//! assert_eq!(creds.client_secret.expose_secret(), "s3cr3t");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Decode a hex signing secret held in a [`SecretString`] into key bytes
/// wrapped in a [`SecretBox`].
///
/// # Errors
///
/// Returns `EdgeTokenError::InvalidKey` if the secret is empty or not hex.
pub fn expose_signing_key(
    secret_hex: &SecretString,
) -> Result<SecretBox<Vec<u8>>, crate::edge_token::EdgeTokenError> {
    crate::edge_token::decode_signing_key(secret_hex.expose_secret())
        .map(|key| SecretBox::new(Box::new(key)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::edge_token::EdgeTokenError;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("client-secret-value");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("client-secret-value"));
    }

    #[test]
    fn test_deserialize_route_credentials() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct RouteCredentials {
            client_id: String,
            client_secret: SecretString,
        }

        let json = r#"{"client_id": "edge", "client_secret": "my-secret-value"}"#;
        let creds: RouteCredentials = serde_json::from_str(json).unwrap();

        assert_eq!(creds.client_secret.expose_secret(), "my-secret-value");
        let debug = format!("{creds:?}");
        assert!(debug.contains("edge"));
        assert!(!debug.contains("my-secret-value"));
    }

    #[test]
    fn test_expose_signing_key_decodes_hex() {
        let secret = SecretString::from("00ff10");
        let key = expose_signing_key(&secret).unwrap();
        assert_eq!(key.expose_secret().as_slice(), &[0x00, 0xff, 0x10]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn test_expose_signing_key_rejects_bad_hex() {
        assert_eq!(
            expose_signing_key(&SecretString::from("not-hex")).unwrap_err(),
            EdgeTokenError::InvalidKey
        );
        assert_eq!(
            expose_signing_key(&SecretString::from("")).unwrap_err(),
            EdgeTokenError::InvalidKey
        );
    }
}
