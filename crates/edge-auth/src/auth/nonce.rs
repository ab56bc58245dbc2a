//! Login nonces.
//!
//! A nonce is bound to the browser through the `nonce` cookie at login and
//! must come back inside the ID token at callback.

use crate::errors::EdgeAuthError;
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;

/// Characters in a nonce.
pub const NONCE_LENGTH: usize = 32;

const ALPHABET: &[u8; 62] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Largest multiple of 62 that fits in a byte; bytes at or above it are
/// rejected so every character is equally likely.
const REJECTION_BOUND: u8 = 248;

/// A 32-character alphanumeric nonce (about 190 bits of entropy).
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    /// Draw a fresh nonce from the system CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns `EdgeAuthError::Internal` if the CSPRNG fails.
    pub fn generate() -> Result<Self, EdgeAuthError> {
        let rng = SystemRandom::new();
        let mut nonce = String::with_capacity(NONCE_LENGTH);
        let mut buf = [0u8; 64];

        while nonce.len() < NONCE_LENGTH {
            rng.fill(&mut buf)
                .map_err(|e| EdgeAuthError::Internal(format!("nonce generation failed: {e}")))?;
            for byte in buf.iter().copied().filter(|b| *b < REJECTION_BOUND) {
                if nonce.len() == NONCE_LENGTH {
                    break;
                }
                if let Some(&c) = ALPHABET.get(usize::from(byte % 62)) {
                    nonce.push(char::from(c));
                }
            }
        }

        Ok(Self(nonce))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Nonce([REDACTED])")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_nonce_shape() {
        let nonce = Nonce::generate().unwrap();
        assert_eq!(nonce.as_str().len(), NONCE_LENGTH);
        assert!(nonce.as_str().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_nonces_do_not_repeat() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let nonce = Nonce::generate().unwrap();
            assert!(seen.insert(nonce.as_str().to_string()), "duplicate nonce");
        }
    }

    #[test]
    fn test_all_characters_reachable() {
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.extend(Nonce::generate().unwrap().as_str().bytes());
        }
        assert_eq!(seen.len(), ALPHABET.len());
    }

    #[test]
    fn test_debug_is_redacted() {
        let nonce = Nonce::generate().unwrap();
        assert!(!format!("{nonce:?}").contains(nonce.as_str()));
    }
}
