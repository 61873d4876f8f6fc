//! Per-user settings stored as identity metadata
//!
//! Metadata is untyped. Reading tolerates anything: a missing or wrongly
//! typed key reads as its default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::IdentityProvider;
use crate::Result;
use crate::conversation::DEFAULT_GOAL;

/// Preferences persisted for each user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub goal: String,
    pub bio: String,
    pub notifications_email: bool,
    pub notifications_push: bool,
    pub theme: String,
    pub language: String,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            goal: DEFAULT_GOAL.to_string(),
            bio: String::new(),
            notifications_email: true,
            notifications_push: false,
            theme: "system".to_string(),
            language: "en".to_string(),
        }
    }
}

fn string_or(value: Option<&Value>, default: &str) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn bool_or(value: Option<&Value>, default: bool) -> bool {
    value.and_then(Value::as_bool).unwrap_or(default)
}

impl UserSettings {
    /// Read settings out of public metadata
    #[must_use]
    pub fn from_metadata(meta: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            goal: string_or(meta.get("goal"), &defaults.goal),
            bio: string_or(meta.get("bio"), &defaults.bio),
            notifications_email: bool_or(meta.get("notificationsEmail"), defaults.notifications_email),
            notifications_push: bool_or(meta.get("notificationsPush"), defaults.notifications_push),
            theme: string_or(meta.get("theme"), &defaults.theme),
            language: string_or(meta.get("language"), &defaults.language),
        }
    }

    /// Metadata keys written for these settings
    #[must_use]
    pub fn to_metadata(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// A profile form submission
///
/// Settings are a full record: any field the client omitted or sent with
/// the wrong type is reset to its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub settings: UserSettings,
}

/// Trimmed non-empty string
fn name_part(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

impl ProfileUpdate {
    /// Interpret an arbitrary JSON body
    #[must_use]
    pub fn from_json(body: &Value) -> Self {
        let empty = Map::new();
        let fields = body.as_object().unwrap_or(&empty);
        let notifications = fields
            .get("notifications")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let defaults = UserSettings::default();
        Self {
            first_name: name_part(fields.get("firstName")),
            last_name: name_part(fields.get("lastName")),
            settings: UserSettings {
                goal: string_or(fields.get("goal"), &defaults.goal),
                bio: string_or(fields.get("bio"), &defaults.bio),
                notifications_email: bool_or(notifications.get("email"), defaults.notifications_email),
                notifications_push: bool_or(notifications.get("push"), defaults.notifications_push),
                theme: string_or(fields.get("theme"), &defaults.theme),
                language: string_or(fields.get("language"), &defaults.language),
            },
        }
    }

    /// Whether the submission carries a name change
    #[must_use]
    pub const fn changes_name(&self) -> bool {
        self.first_name.is_some() || self.last_name.is_some()
    }
}

/// Read a user's settings
///
/// # Errors
///
/// Returns error if the provider cannot be reached or the user is unknown
pub async fn get_user_settings(
    provider: &dyn IdentityProvider,
    user_id: &str,
) -> Result<UserSettings> {
    let user = provider.get_user(user_id).await?;
    Ok(UserSettings::from_metadata(&user.public_metadata))
}

/// Persist a user's full settings record
///
/// # Errors
///
/// Returns error if the provider rejects the write
pub async fn set_user_settings(
    provider: &dyn IdentityProvider,
    user_id: &str,
    settings: &UserSettings,
) -> Result<()> {
    provider
        .merge_public_metadata(user_id, settings.to_metadata())
        .await
}

/// Record that onboarding finished with the chosen goal
///
/// # Errors
///
/// Returns error if the provider rejects the write
pub async fn complete_onboarding(
    provider: &dyn IdentityProvider,
    user_id: &str,
    goal: &str,
) -> Result<()> {
    let mut patch = Map::new();
    patch.insert("onboardingComplete".to_string(), Value::Bool(true));
    patch.insert("goal".to_string(), Value::String(goal.to_string()));
    provider.merge_public_metadata(user_id, patch).await
}
