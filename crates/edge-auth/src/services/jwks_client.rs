//! JWKS client for fetching signing keys.
//!
//! Keys are fetched from a JWKS URL, imported with [`import_key_set`] and,
//! when a TTL is configured, cached per URL. [`JwksClient::verify_token`]
//! combines fetching with verification and handles key rotation: if a token
//! fails with `InvalidSignature` against cached keys, the cache entry is
//! refreshed once and verification retried.
//!
//! # Security
//!
//! - A zero TTL (the default) fetches on every verification
//! - The number of cached URLs is bounded; the JWKS URL may be derived from
//!   the request host, so production deployments should set `JWKS_URL`

use crate::errors::EdgeAuthError;
use common::claims::IdentityClaims;
use common::jwk::{import_key_set, JwkSet, VerificationKey};
use common::verifier::{JwtVerifier, JwtVerifyError};
use jsonwebtoken::Algorithm;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Cap on distinct cached JWKS URLs; the cache is cleared when exceeded.
pub const MAX_CACHED_URLS: usize = 16;

struct CachedKeys {
    keys: Arc<Vec<VerificationKey>>,
    expires_at: Instant,
}

/// Keys for one verification attempt.
pub struct FetchedKeys {
    pub keys: Arc<Vec<VerificationKey>>,
    /// Whether the keys came from the cache rather than a fresh fetch.
    pub from_cache: bool,
}

/// Fetches and optionally caches JWKS documents.
pub struct JwksClient {
    http_client: Client,
    cache: RwLock<HashMap<String, CachedKeys>>,
    cache_ttl: Duration,
    default_algorithm: Algorithm,
}

impl JwksClient {
    /// # Arguments
    ///
    /// * `http_client` - Shared client (timeouts configured on it)
    /// * `cache_ttl` - Cache lifetime; zero disables caching
    /// * `default_algorithm` - Algorithm for JWKs without `alg`
    #[must_use]
    pub fn new(http_client: Client, cache_ttl: Duration, default_algorithm: Algorithm) -> Self {
        Self {
            http_client,
            cache: RwLock::new(HashMap::new()),
            cache_ttl,
            default_algorithm,
        }
    }

    fn caching_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// Keys for `url`, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns `EdgeAuthError::UpstreamFailure` if the JWKS cannot be fetched
    /// or parsed.
    pub async fn get_keys(&self, url: &str) -> Result<FetchedKeys, EdgeAuthError> {
        if self.caching_enabled() {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(url) {
                if cached.expires_at > Instant::now() {
                    tracing::debug!(target: "ea.services.jwks", "JWKS cache hit");
                    return Ok(FetchedKeys {
                        keys: Arc::clone(&cached.keys),
                        from_cache: true,
                    });
                }
            }
        }

        Ok(FetchedKeys {
            keys: self.refresh(url).await?,
            from_cache: false,
        })
    }

    /// Fetch `url` unconditionally and update the cache.
    ///
    /// # Errors
    ///
    /// Returns `EdgeAuthError::UpstreamFailure` if the JWKS cannot be fetched
    /// or parsed.
    #[instrument(skip_all, name = "ea.services.jwks.refresh")]
    pub async fn refresh(&self, url: &str) -> Result<Arc<Vec<VerificationKey>>, EdgeAuthError> {
        tracing::debug!(target: "ea.services.jwks", url = %url, "Fetching JWKS");

        let response = self.http_client.get(url).send().await.map_err(|e| {
            tracing::error!(target: "ea.services.jwks", error = %e, "Failed to fetch JWKS");
            EdgeAuthError::UpstreamFailure(format!("JWKS fetch failed: {e}"))
        })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "ea.services.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(EdgeAuthError::UpstreamFailure(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let set: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(target: "ea.services.jwks", error = %e, "Failed to parse JWKS response");
            EdgeAuthError::UpstreamFailure(format!("JWKS response invalid: {e}"))
        })?;

        let keys = Arc::new(import_key_set(&set, self.default_algorithm));
        tracing::debug!(
            target: "ea.services.jwks",
            published = set.keys.len(),
            imported = keys.len(),
            "JWKS imported"
        );

        if self.caching_enabled() {
            let mut cache = self.cache.write().await;
            if cache.len() >= MAX_CACHED_URLS && !cache.contains_key(url) {
                cache.clear();
            }
            cache.insert(
                url.to_string(),
                CachedKeys {
                    keys: Arc::clone(&keys),
                    expires_at: Instant::now() + self.cache_ttl,
                },
            );
        }

        Ok(keys)
    }

    /// Verify `token` with keys from `url`.
    ///
    /// A signature failure against cached keys triggers one refresh and
    /// retry so tokens signed by a newly rotated key are accepted.
    ///
    /// # Errors
    ///
    /// - `UpstreamFailure` if keys cannot be fetched
    /// - the verifier's error kinds otherwise
    pub async fn verify_token(
        &self,
        url: &str,
        verifier: &JwtVerifier,
        token: &str,
    ) -> Result<IdentityClaims, EdgeAuthError> {
        let fetched = self.get_keys(url).await?;

        match verifier.verify_now(token, &fetched.keys) {
            Err(JwtVerifyError::InvalidSignature) if fetched.from_cache => {
                tracing::debug!(
                    target: "ea.services.jwks",
                    "Signature failed against cached keys, refreshing"
                );
                let keys = self.refresh(url).await?;
                Ok(verifier.verify_now(token, &keys)?)
            }
            result => Ok(result?),
        }
    }
}
