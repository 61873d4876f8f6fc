//! AI coach endpoint

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{ApiError, ApiState, lenient_json};
use crate::Error;
use crate::conversation::{CoachingReply, ConversationMessage, DEFAULT_GOAL, Role};

const MISSING_KEY_HINT: &str =
    "Set GOOGLE_GEMINI_API_KEY (or GOOGLE_AI_API_KEY) in the environment and restart the server.";

const UNAVAILABLE_HINT: &str = "Your GOOGLE_GEMINI_API_KEY may be invalid, restricted, or the Generative Language API is not enabled for it.";

/// Read one history entry, skipping anything malformed
fn history_entry(value: &Value) -> Option<ConversationMessage> {
    let role: Role = serde_json::from_value(value.get("role")?.clone()).ok()?;
    let content = value.get("content")?.as_str()?;
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or_else(Utc::now);
    Some(ConversationMessage::at(role, content, timestamp))
}

/// Coach the user's latest utterance
pub async fn ai_coach(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<CoachingReply>, ApiError> {
    if !state.coaching.is_configured() {
        return Err(ApiError::internal("Gemini API key not configured").with_hint(MISSING_KEY_HINT));
    }

    let body = lenient_json(&body);

    let message = body
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or(ApiError::Validation("No message provided"))?;

    let history: Vec<ConversationMessage> = body
        .get("history")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(history_entry).collect())
        .unwrap_or_default();

    let goal = body
        .get("goal")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_GOAL);

    match state.coaching.get_coaching_reply(goal, message, &history).await {
        Ok(reply) => Ok(Json(reply.into_inner())),
        Err(Error::CoachingUnavailable(reason)) => {
            tracing::error!(reason = %reason, "no coaching model answered");
            Err(ApiError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                error: "Gemini failed to generate a response".to_string(),
                hint: Some(UNAVAILABLE_HINT),
            })
        }
        Err(e) => {
            tracing::error!(error = %e, "AI coach error");
            Err(ApiError::internal("AI coach server error"))
        }
    }
}
