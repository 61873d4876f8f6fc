//! Hosted identity provider (Clerk-compatible backend API)

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{IdentityProvider, JwksCache, UserProfile};
use crate::{Error, Result};

#[derive(Deserialize)]
struct UserRecord {
    id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(default)]
    email_addresses: Vec<EmailAddress>,
    image_url: Option<String>,
    #[serde(default)]
    public_metadata: Map<String, Value>,
}

#[derive(Deserialize)]
struct EmailAddress {
    email_address: String,
}

impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record
                .email_addresses
                .into_iter()
                .next()
                .map(|e| e.email_address),
            image_url: record.image_url,
            public_metadata: record.public_metadata,
        }
    }
}

#[derive(Serialize)]
struct NameUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
}

#[derive(Serialize)]
struct MetadataUpdate {
    public_metadata: Map<String, Value>,
}

/// Identity backed by the provider's REST API and signed session tokens
pub struct HostedIdentity {
    client: reqwest::Client,
    api_url: String,
    secret_key: SecretString,
    jwks: JwksCache,
}

impl HostedIdentity {
    #[must_use]
    pub fn new(api_url: impl Into<String>, secret_key: SecretString, issuer_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            secret_key,
            jwks: JwksCache::new(issuer_url),
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/users/{user_id}", self.api_url)
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, action, "identity API error");
        Err(Error::Identity(format!("{action} failed with {status}")))
    }
}

#[async_trait]
impl IdentityProvider for HostedIdentity {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn verify_session(&self, token: &str) -> Result<Option<String>> {
        match self.jwks.validate(token).await {
            Ok(claims) => Ok(Some(claims.sub)),
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                Ok(None)
            }
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        let response = self
            .client
            .get(self.user_url(user_id))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        let record: UserRecord = Self::check(response, "get user").await?.json().await?;
        Ok(record.into())
    }

    async fn update_name(
        &self,
        user_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let response = self
            .client
            .patch(self.user_url(user_id))
            .bearer_auth(self.secret_key.expose_secret())
            .json(&NameUpdate {
                first_name,
                last_name,
            })
            .send()
            .await?;

        Self::check(response, "update user").await?;
        Ok(())
    }

    async fn merge_public_metadata(&self, user_id: &str, patch: Map<String, Value>) -> Result<()> {
        let response = self
            .client
            .patch(format!("{}/metadata", self.user_url(user_id)))
            .bearer_auth(self.secret_key.expose_secret())
            .json(&MetadataUpdate {
                public_metadata: patch,
            })
            .send()
            .await?;

        Self::check(response, "update metadata").await?;
        Ok(())
    }
}
