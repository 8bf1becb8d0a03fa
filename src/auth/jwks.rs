//! Cached JWKS fetcher for external credential verification.
//!
//! Keys are fetched from the provider's published JWKS document and cached
//! for a bounded interval. A lookup for an unknown `kid` on a fresh cache
//! forces one refetch so key rotation is picked up without waiting for the
//! cache to age out.

use anyhow::{Context, Result};
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Subset of an RFC 7517 JSON Web Key needed for RS256 verification.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kid: String,
    pub kty: String,
    /// RSA modulus, base64url-unpadded.
    pub n: String,
    /// RSA public exponent, base64url-unpadded.
    pub e: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Decoded verification keys indexed by key id.
pub struct KeyRing {
    keys: HashMap<String, DecodingKey>,
}

impl KeyRing {
    /// Build a ring from a parsed JWKS document, skipping non-RSA entries.
    ///
    /// # Errors
    /// Returns an error when an RSA entry carries unparseable components.
    pub fn from_jwk_set(set: &JwkSet) -> Result<Self> {
        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in &set.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
                .with_context(|| format!("invalid RSA components for kid {}", jwk.kid))?;
            keys.insert(jwk.kid.clone(), key);
        }
        Ok(Self { keys })
    }

    #[must_use]
    pub fn get(&self, kid: &str) -> Option<&DecodingKey> {
        self.keys.get(kid)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

struct CachedRing {
    ring: KeyRing,
    fetched_at: Instant,
}

/// Refreshing cache over a provider JWKS endpoint.
pub struct JwksCache {
    client: reqwest::Client,
    url: Url,
    ttl: Duration,
    cached: RwLock<Option<CachedRing>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(client: reqwest::Client, url: Url, ttl: Duration) -> Self {
        Self {
            client,
            url,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// Resolve the verification key for `kid`, refetching when the cache is
    /// stale or when a fresh document might contain a rotated key.
    ///
    /// `Ok(None)` means the provider does not currently publish a key under
    /// `kid`, even after a refetch.
    ///
    /// # Errors
    /// Returns an error when the JWKS endpoint is unreachable or the
    /// document is invalid.
    pub async fn key_for(&self, kid: &str) -> Result<Option<DecodingKey>> {
        {
            let cached = self.cached.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    if let Some(key) = entry.ring.get(kid) {
                        return Ok(Some(key.clone()));
                    }
                }
            }
        }

        // Stale cache or unknown kid: refetch once and retry the lookup.
        let ring = self.fetch().await?;
        let key = ring.get(kid).cloned();
        {
            let mut cached = self.cached.write().await;
            *cached = Some(CachedRing {
                ring,
                fetched_at: Instant::now(),
            });
        }
        Ok(key)
    }

    async fn fetch(&self) -> Result<KeyRing> {
        debug!("fetching JWKS from {}", self.url);
        let set: JwkSet = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .context("JWKS request failed")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("JWKS document is not valid JSON")?;
        KeyRing::from_jwk_set(&set)
    }
}

#[cfg(test)]
mod tests {
    use super::{JwkSet, KeyRing};

    // A structurally valid RSA key (2048-bit modulus) in JWKS form.
    const SAMPLE_JWKS: &str = r#"{
        "keys": [
            {
                "kid": "key-1",
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                "e": "AQAB"
            },
            {
                "kid": "key-2",
                "kty": "EC",
                "n": "",
                "e": ""
            }
        ]
    }"#;

    #[test]
    fn builds_ring_from_rsa_keys_only() {
        let set: JwkSet = serde_json::from_str(SAMPLE_JWKS).expect("valid JWKS");
        let ring = KeyRing::from_jwk_set(&set).expect("ring builds");
        assert_eq!(ring.len(), 1);
        assert!(ring.get("key-1").is_some());
        assert!(ring.get("key-2").is_none());
        assert!(ring.get("missing").is_none());
    }

    #[test]
    fn rejects_garbage_rsa_components() {
        let set: JwkSet = serde_json::from_str(
            r#"{"keys":[{"kid":"bad","kty":"RSA","n":"!!not-base64!!","e":"AQAB"}]}"#,
        )
        .expect("valid JSON");
        assert!(KeyRing::from_jwk_set(&set).is_err());
    }
}
