//! In-process identity store for local development

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{IdentityProvider, UserProfile};
use crate::{Error, Result};

/// User behind the development session
pub const DEV_USER_ID: &str = "dev-user";

/// Users and session tokens held in memory
#[derive(Default)]
pub struct MemoryIdentity {
    sessions: HashMap<String, String>,
    users: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one user reachable through `token`
    #[must_use]
    pub fn dev(token: impl Into<String>) -> Self {
        Self::new()
            .with_user(UserProfile {
                id: DEV_USER_ID.to_string(),
                first_name: Some("Dev".to_string()),
                ..UserProfile::default()
            })
            .with_session(token, DEV_USER_ID)
    }

    #[must_use]
    pub fn with_user(self, user: UserProfile) -> Self {
        let mut users = self.users.into_inner();
        users.insert(user.id.clone(), user);
        Self {
            sessions: self.sessions,
            users: RwLock::new(users),
        }
    }

    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.sessions.insert(token.into(), user_id.into());
        self
    }

    /// Current public metadata of a user
    pub async fn metadata(&self, user_id: &str) -> Option<Map<String, Value>> {
        self.users
            .read()
            .await
            .get(user_id)
            .map(|u| u.public_metadata.clone())
    }
}

fn unknown(user_id: &str) -> Error {
    Error::Identity(format!("user not found: {user_id}"))
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn verify_session(&self, token: &str) -> Result<Option<String>> {
        Ok(self.sessions.get(token).cloned())
    }

    async fn get_user(&self, user_id: &str) -> Result<UserProfile> {
        self.users
            .read()
            .await
            .get(user_id)
            .cloned()
            .ok_or_else(|| unknown(user_id))
    }

    async fn update_name(
        &self,
        user_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| unknown(user_id))?;
        if let Some(first) = first_name {
            user.first_name = Some(first.to_string());
        }
        if let Some(last) = last_name {
            user.last_name = Some(last.to_string());
        }
        Ok(())
    }

    async fn merge_public_metadata(&self, user_id: &str, patch: Map<String, Value>) -> Result<()> {
        let mut users = self.users.write().await;
        let user = users.get_mut(user_id).ok_or_else(|| unknown(user_id))?;
        user.public_metadata.extend(patch);
        Ok(())
    }
}
