//! Speech endpoints: transcription and synthesis

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use serde::Serialize;

use super::{ApiError, ApiState, UploadInfo, lenient_json};
use crate::Error;
use crate::providers::SpeechPayload;
use crate::session::AUDIO_FIELD;
use crate::voice::AudioBlob;

/// File name assumed when the upload carries none
const DEFAULT_UPLOAD_NAME: &str = "audio.webm";

/// Mime type assumed when the upload carries none
const DEFAULT_UPLOAD_MIME: &str = "audio/webm";

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub text: String,
}

/// Pull the audio part out of a multipart upload
async fn read_audio_part(multipart: &mut Multipart) -> Option<AudioBlob> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "malformed multipart upload");
                return None;
            }
        };

        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_NAME)
            .to_string();
        let mime_type = field
            .content_type()
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_UPLOAD_MIME)
            .to_string();

        return match field.bytes().await {
            Ok(bytes) => Some(AudioBlob::new(bytes.to_vec(), mime_type, file_name)),
            Err(e) => {
                tracing::debug!(error = %e, "failed to read audio part");
                None
            }
        };
    }
}

/// Transcribe an uploaded recording
pub async fn speech_to_text(
    State(state): State<Arc<ApiState>>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptResponse>, ApiError> {
    if !state.stt.is_configured() {
        return Err(ApiError::internal("ElevenLabs API key not configured"));
    }

    let audio = read_audio_part(&mut multipart)
        .await
        .filter(|audio| !audio.is_empty())
        .ok_or(ApiError::Validation("No audio file provided"))?;

    match state.stt.transcribe(&audio).await {
        Ok(text) => Ok(Json(TranscriptResponse { text })),
        Err(Error::TranscriptionFailed { status, details }) => Err(ApiError::Transcription {
            details,
            status,
            input: UploadInfo {
                file_name: audio.file_name,
                mime_type: audio.mime_type,
                bytes: audio.bytes.len(),
            },
        }),
        Err(e) => {
            tracing::error!(error = %e, "speech-to-text error");
            Err(ApiError::internal("Speech-to-text server error"))
        }
    }
}

/// Synthesize speech; degrades to empty audio instead of failing
pub async fn text_to_speech(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<SpeechPayload>, ApiError> {
    let body = lenient_json(&body);

    let text = body
        .get("text")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::Validation("No text provided"))?;
    let voice = body.get("voiceId").and_then(|v| v.as_str());

    let outcome = state.tts.synthesize(text, voice).await;
    if let Some(note) = outcome.reason() {
        tracing::warn!(note = %note, "returning silent audio");
    }

    Ok(Json(SpeechPayload::from_outcome(outcome)))
}
