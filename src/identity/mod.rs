//! External identity provider
//!
//! Authentication and all per-user persistence (goal, preferences,
//! onboarding state) live in the identity provider's public metadata. This
//! module reaches it through the narrow [`IdentityProvider`] interface.

mod hosted;
mod jwks;
mod memory;
mod settings;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use hosted::HostedIdentity;
pub use jwks::{JwksCache, SessionClaims};
pub use memory::{DEV_USER_ID, MemoryIdentity};
pub use settings::{ProfileUpdate, UserSettings, complete_onboarding, get_user_settings, set_user_settings};

use crate::Result;

/// Public fields of a user record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub public_metadata: Map<String, Value>,
}

/// Narrow read/write interface to the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logs and readiness checks
    fn name(&self) -> &'static str;

    /// Resolve a session token to a user id; `None` if the token is not valid
    async fn verify_session(&self, token: &str) -> Result<Option<String>>;

    /// Fetch a user record
    async fn get_user(&self, user_id: &str) -> Result<UserProfile>;

    /// Update the user's name; `None` leaves a part unchanged
    async fn update_name(
        &self,
        user_id: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<()>;

    /// Merge keys into the user's public metadata
    async fn merge_public_metadata(&self, user_id: &str, patch: Map<String, Value>) -> Result<()>;
}
