//! Signing keys published by an OpenID Connect authority
//!
//! The key set is located through the authority's discovery document and
//! cached in memory. It is fetched lazily on the first token, refreshed once
//! it is older than the configured refresh interval, and refetched early when
//! a token names a key id the cache does not know (key rotation), at most
//! once per minimum refresh interval.

use crate::auth::jwt::SigningKeys;
use crate::core::config::AuthConfig;
use crate::core::error::{ApiError, Result};
use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Header};
use serde::Deserialize;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Path of the discovery document relative to the authority
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
}

/// JWKS-backed key source
pub struct JwksKeys {
    client: reqwest::Client,
    authority: String,
    refresh_after: Duration,
    min_refresh: Duration,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksKeys {
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ApiError::InitializationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            authority: config.authority.trim_end_matches('/').to_string(),
            refresh_after: Duration::from_secs(config.jwks_refresh_secs),
            min_refresh: Duration::from_secs(config.jwks_min_refresh_secs),
            cache: RwLock::new(None),
        })
    }

    async fn fetch(&self) -> Result<JwkSet> {
        let discovery_url = format!("{}{}", self.authority, DISCOVERY_PATH);
        debug!(url = %discovery_url, "Fetching OpenID discovery document");

        let discovery: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ApiError::NetworkError(format!("Discovery request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::NetworkError(format!("Invalid discovery document: {}", e)))?;

        let keys: JwkSet = self
            .client
            .get(&discovery.jwks_uri)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ApiError::NetworkError(format!("Key set request failed: {}", e)))?
            .json()
            .await
            .map_err(|e| ApiError::NetworkError(format!("Invalid key set: {}", e)))?;

        info!(
            jwks_uri = %discovery.jwks_uri,
            key_count = keys.keys.len(),
            "Signing keys refreshed"
        );

        Ok(keys)
    }

    /// Look up a key in the cache. `None` means the cache must be refreshed first.
    async fn cached_key(&self, kid: Option<&str>) -> Option<Jwk> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if cached.fetched_at.elapsed() >= self.refresh_after {
            return None;
        }
        select_key(&cached.keys, kid).cloned()
    }

    async fn refresh_and_find(&self, kid: Option<&str>) -> Result<Jwk> {
        let mut cache = self.cache.write().await;

        // Another request may have refreshed while we waited for the lock
        let recently_fetched = cache
            .as_ref()
            .map(|cached| cached.fetched_at.elapsed() < self.min_refresh)
            .unwrap_or(false);

        if !recently_fetched {
            match self.fetch().await {
                Ok(keys) => {
                    *cache = Some(CachedKeys {
                        keys,
                        fetched_at: Instant::now(),
                    });
                }
                Err(e) => {
                    warn!(authority = %self.authority, error = %e, "Failed to refresh signing keys");
                    if cache.is_none() {
                        return Err(e);
                    }
                }
            }
        }

        cache
            .as_ref()
            .and_then(|cached| select_key(&cached.keys, kid))
            .cloned()
            .ok_or_else(|| ApiError::AuthenticationError("Unknown signing key".to_string()))
    }
}

#[async_trait]
impl SigningKeys for JwksKeys {
    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey> {
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ApiError::AuthenticationError(
                "Symmetric algorithms are not accepted for issuer keys".to_string(),
            ));
        }

        let kid = header.kid.as_deref();
        let jwk = match self.cached_key(kid).await {
            Some(jwk) => jwk,
            None => self.refresh_and_find(kid).await?,
        };

        if let Some(key_alg) = &jwk.common.key_algorithm {
            // KeyAlgorithm and Algorithm share variant names for signing algorithms
            let declared = Algorithm::from_str(&format!("{:?}", key_alg)).ok();
            if declared != Some(header.alg) {
                return Err(ApiError::AuthenticationError(
                    "Token algorithm does not match signing key".to_string(),
                ));
            }
        }

        DecodingKey::from_jwk(&jwk)
            .map_err(|e| ApiError::AuthenticationError(format!("Unusable signing key: {}", e)))
    }
}

/// Pick the key named by `kid`, or the only key when the token names none
fn select_key<'a>(keys: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => keys.find(kid),
        None if keys.keys.len() == 1 => keys.keys.first(),
        None => None,
    }
}
