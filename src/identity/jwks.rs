//! Session token validation against the issuer's published keys

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// How long fetched keys are trusted before refetching
const KEY_TTL: Duration = Duration::from_secs(3600);

/// Claims carried by a session token
#[derive(Debug, Clone, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub exp: u64,
    pub iss: Option<String>,
    /// Session id
    pub sid: Option<String>,
}

struct CachedKeys {
    keys: Vec<Jwk>,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct OidcDiscovery {
    jwks_uri: Option<String>,
}

/// Issuer keys, fetched lazily and cached
pub struct JwksCache {
    issuer_url: String,
    client: reqwest::Client,
    keys: Arc<RwLock<Option<CachedKeys>>>,
    jwks_uri: Arc<RwLock<Option<String>>>,
}

impl JwksCache {
    #[must_use]
    pub fn new(issuer_url: impl Into<String>) -> Self {
        Self {
            issuer_url: issuer_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            keys: Arc::new(RwLock::new(None)),
            jwks_uri: Arc::new(RwLock::new(None)),
        }
    }

    /// Validate a token's signature and expiry
    ///
    /// # Errors
    ///
    /// Returns `Identity` if no published key accepts the token or the keys
    /// cannot be fetched
    pub async fn validate(&self, token: &str) -> Result<SessionClaims> {
        let header = decode_header(token)
            .map_err(|e| Error::Identity(format!("invalid session token header: {e}")))?;
        let keys = self.keys().await?;

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.required_spec_claims.remove("aud");
        validation.set_issuer(&[self.issuer_url.as_str()]);

        // Prefer the key named in the header, but accept any during rotation
        let mut candidates: Vec<&Jwk> = keys.iter().collect();
        if let Some(kid) = &header.kid {
            candidates.sort_by_key(|jwk| jwk.common.key_id.as_ref() != Some(kid));
        }

        let mut last_error = None;
        for jwk in candidates {
            let Ok(key) = DecodingKey::from_jwk(jwk) else {
                tracing::debug!(kid = ?jwk.common.key_id, "skipping unusable key");
                continue;
            };

            match decode::<SessionClaims>(token, &key, &validation) {
                Ok(data) => return Ok(data.claims),
                Err(e) => last_error = Some(e),
            }
        }

        Err(Error::Identity(format!(
            "session token rejected (alg={:?}, kid={:?}, keys={}): {}",
            header.alg,
            header.kid,
            keys.len(),
            last_error.map_or_else(|| "no usable key".to_string(), |e| e.to_string()),
        )))
    }

    /// Keys endpoint from OIDC discovery, falling back to the well-known path
    async fn resolve_jwks_uri(&self) -> String {
        if let Some(uri) = self.jwks_uri.read().await.as_ref() {
            return uri.clone();
        }

        let discovery_url = format!("{}/.well-known/openid-configuration", self.issuer_url);
        let discovered = match self.client.get(&discovery_url).send().await {
            Ok(resp) if resp.status().is_success() => resp
                .json::<OidcDiscovery>()
                .await
                .ok()
                .and_then(|doc| doc.jwks_uri),
            _ => None,
        };

        let uri = discovered.unwrap_or_else(|| {
            tracing::debug!(issuer = %self.issuer_url, "OIDC discovery unavailable, using default JWKS path");
            format!("{}/.well-known/jwks.json", self.issuer_url)
        });

        *self.jwks_uri.write().await = Some(uri.clone());
        uri
    }

    async fn keys(&self) -> Result<Vec<Jwk>> {
        if let Some(cached) = self.keys.read().await.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.keys.clone());
            }
        }

        let url = self.resolve_jwks_uri().await;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Identity(format!("failed to fetch JWKS from {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Identity(format!(
                "JWKS endpoint returned {}: {url}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| Error::Identity(format!("invalid JWKS from {url}: {e}")))?;

        tracing::debug!(url = %url, keys = set.keys.len(), "fetched JWKS");

        *self.keys.write().await = Some(CachedKeys {
            keys: set.keys.clone(),
            expires_at: Instant::now() + KEY_TTL,
        });

        Ok(set.keys)
    }
}
