//! Speech-to-text (STT) gateway

use secrecy::{ExposeSecret, SecretString};

use crate::voice::AudioBlob;
use crate::{Error, Result};

/// Hosted speech provider API root
pub const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";

/// Upstream error bodies are cut to this many characters
const MAX_DETAILS_CHARS: usize = 4000;

/// Multipart field carrying the audio upload
const AUDIO_FIELD: &str = "file";

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Transcribes recorded speech to text
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    base_url: String,
}

impl SpeechToText {
    /// Create a transcription gateway
    ///
    /// A missing key is allowed here and reported per request, so the server
    /// can start without speech credentials.
    #[must_use]
    pub fn new(api_key: Option<SecretString>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: ELEVENLABS_API_URL.to_string(),
        }
    }

    /// Point the gateway at a different API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Whether credentials are present
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Transcribe an audio blob
    ///
    /// An empty string is a valid result (no speech).
    ///
    /// # Errors
    ///
    /// Returns `Config` without credentials, `TranscriptionFailed` on a
    /// non-success status, or `Http` on transport failure
    pub async fn transcribe(&self, audio: &AudioBlob) -> Result<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("ElevenLabs API key not configured".to_string()))?;

        if audio.is_empty() {
            return Err(Error::TranscriptionFailed {
                status: 400,
                details: "empty audio".to_string(),
            });
        }

        tracing::debug!(
            audio_bytes = audio.len(),
            mime_type = %audio.mime_type,
            model = %self.model,
            "starting transcription"
        );

        let part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)
            .map_err(|e| Error::TranscriptionFailed {
                status: 400,
                details: e.to_string(),
            })?;

        let form = reqwest::multipart::Form::new()
            .part(AUDIO_FIELD, part)
            .text("model_id", self.model.clone());

        let response = self
            .client
            .post(format!("{}/speech-to-text", self.base_url))
            .header("xi-api-key", api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let details: String = body.chars().take(MAX_DETAILS_CHARS).collect();
            tracing::error!(
                status = %status,
                details = %details,
                file_name = %audio.file_name,
                mime_type = %audio.mime_type,
                bytes = audio.len(),
                "transcription API error"
            );
            return Err(Error::TranscriptionFailed {
                status: status.as_u16(),
                details,
            });
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        let text = result.text.unwrap_or_default();
        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }
}
