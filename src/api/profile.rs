//! Profile and onboarding endpoints backed by identity metadata

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;
use serde_json::{Value, json};

use super::{ApiError, ApiState, AuthUser, lenient_json};
use crate::conversation::DEFAULT_GOAL;
use crate::identity::{
    IdentityProvider, ProfileUpdate, UserSettings, complete_onboarding as record_onboarding,
    set_user_settings,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: ProfileUser,
    pub settings: UserSettings,
}

fn identity<'a>(
    state: &'a ApiState,
    failure: &'static str,
) -> Result<&'a dyn IdentityProvider, ApiError> {
    state
        .identity
        .as_deref()
        .ok_or_else(|| ApiError::internal(failure))
}

/// Current user and settings
pub async fn get_profile(
    State(state): State<Arc<ApiState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Json<ProfileResponse>, ApiError> {
    const FAILURE: &str = "Failed to load profile";
    let identity = identity(&state, FAILURE)?;

    let user = identity.get_user(&user_id).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %user_id, "profile load failed");
        ApiError::internal(FAILURE)
    })?;

    let settings = UserSettings::from_metadata(&user.public_metadata);
    Ok(Json(ProfileResponse {
        user: ProfileUser {
            first_name: user.first_name.unwrap_or_default(),
            last_name: user.last_name.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            image_url: user.image_url,
        },
        settings,
    }))
}

/// Save name and the full settings record
pub async fn update_profile(
    State(state): State<Arc<ApiState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    const FAILURE: &str = "Failed to update profile";
    let identity = identity(&state, FAILURE)?;
    let update = ProfileUpdate::from_json(&lenient_json(&body));

    let result = async {
        if update.changes_name() {
            identity
                .update_name(
                    &user_id,
                    update.first_name.as_deref(),
                    update.last_name.as_deref(),
                )
                .await?;
        }
        set_user_settings(identity, &user_id, &update.settings).await
    }
    .await;

    result.map_err(|e| {
        tracing::error!(error = %e, user_id = %user_id, "profile update failed");
        ApiError::internal(FAILURE)
    })?;

    Ok(Json(json!({ "ok": true })))
}

/// Mark onboarding done with the chosen goal
pub async fn complete_onboarding(
    State(state): State<Arc<ApiState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    const FAILURE: &str = "Failed to complete onboarding";
    let identity = identity(&state, FAILURE)?;

    let body = lenient_json(&body);
    let goal = body
        .get("goal")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_GOAL);

    record_onboarding(identity, &user_id, goal)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id = %user_id, "onboarding failed");
            ApiError::internal(FAILURE)
        })?;

    Ok(Json(json!({ "ok": true })))
}
