//! HTTP error responses

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

/// Upload that the transcription provider rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadInfo {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: usize,
}

/// Errors returned by API handlers
#[derive(Debug)]
pub enum ApiError {
    /// No valid session; never carries details
    Unauthorized,
    /// Missing or empty required field
    Validation(&'static str),
    /// Provider missing, failing, or an internal step broke
    Upstream {
        status: StatusCode,
        error: String,
        hint: Option<&'static str>,
    },
    /// Transcription provider answered with a non-success status
    Transcription {
        details: String,
        status: u16,
        input: UploadInfo,
    },
}

impl ApiError {
    /// 500 with a message
    pub fn internal(error: impl Into<String>) -> Self {
        Self::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            hint: None,
        }
    }

    /// Attach an operator hint to an upstream error
    #[must_use]
    pub fn with_hint(self, hint: &'static str) -> Self {
        match self {
            Self::Upstream { status, error, .. } => Self::Upstream {
                status,
                error,
                hint: Some(hint),
            },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Unauthorized" }))).into_response()
            }
            Self::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Self::Upstream {
                status,
                error,
                hint: Some(hint),
            } => (status, Json(json!({ "error": error, "hint": hint }))).into_response(),
            Self::Upstream { status, error, .. } => {
                (status, Json(json!({ "error": error }))).into_response()
            }
            Self::Transcription {
                details,
                status,
                input,
            } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "Speech recognition failed",
                    "details": details,
                    "status": status,
                    "input": input,
                })),
            )
                .into_response(),
        }
    }
}
