//! Text-to-speech (TTS) gateway
//!
//! Synthesis never fails from the caller's point of view: missing
//! credentials, upstream errors and transport failures all resolve to empty
//! audio with a note, so the text half of a coaching turn is never blocked.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::stt::ELEVENLABS_API_URL;
use crate::degrade::Outcome;
use crate::voice::AudioClip;

/// Container type of synthesized audio
pub const AUDIO_MIME_TYPE: &str = "audio/mpeg";

/// Note when no provider key is configured
pub const NOTE_UNAVAILABLE: &str = "TTS temporarily unavailable - text response shown";

/// Note when the provider answered with a non-success status
pub const NOTE_FAILED: &str = "TTS failed - text response shown";

/// Note for transport or decoding failures
pub const NOTE_ERROR: &str = "TTS error - text response shown";

/// Synthesis result as carried over HTTP
///
/// `audio` is base64 and empty when synthesis degraded, in which case `note`
/// says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechPayload {
    #[serde(default)]
    pub audio: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_mime_type() -> String {
    AUDIO_MIME_TYPE.to_string()
}

impl SpeechPayload {
    /// Encode a synthesis outcome for the wire
    #[must_use]
    pub fn from_outcome(outcome: Outcome<Vec<u8>>) -> Self {
        let note = outcome.reason().map(ToString::to_string);
        let audio = outcome.into_inner();
        Self {
            audio: if audio.is_empty() {
                String::new()
            } else {
                BASE64.encode(audio)
            },
            mime_type: default_mime_type(),
            note,
        }
    }

    /// Decode into a playable clip; `None` when there is no audio
    ///
    /// # Errors
    ///
    /// Returns `Audio` if the payload is not valid base64
    pub fn into_clip(self) -> crate::Result<Option<AudioClip>> {
        if self.audio.is_empty() {
            return Ok(None);
        }
        let bytes = BASE64
            .decode(self.audio.as_bytes())
            .map_err(|e| crate::Error::Audio(format!("invalid audio payload: {e}")))?;
        Ok(Some(AudioClip::new(bytes, self.mime_type)))
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    default_voice: String,
    base_url: String,
}

impl TextToSpeech {
    /// Create a synthesis gateway
    #[must_use]
    pub fn new(api_key: Option<SecretString>, model: String, default_voice: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            default_voice,
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

    /// Synthesize `text` (MP3 bytes)
    ///
    /// A degraded outcome carries empty audio and a human-readable note as
    /// its reason.
    pub async fn synthesize(&self, text: &str, voice_id: Option<&str>) -> Outcome<Vec<u8>> {
        let Some(api_key) = &self.api_key else {
            tracing::error!("missing ElevenLabs API key, returning silent audio");
            return Outcome::degraded(Vec::new(), NOTE_UNAVAILABLE);
        };

        let voice = voice_id.unwrap_or(&self.default_voice);
        let request = SynthesisRequest {
            text,
            model_id: &self.model,
            voice_settings: VoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let response = match self
            .client
            .post(format!("{}/text-to-speech/{voice}", self.base_url))
            .header("Accept", AUDIO_MIME_TYPE)
            .header("xi-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "TTS request failed");
                return Outcome::degraded(Vec::new(), NOTE_ERROR);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "TTS API error");
            return Outcome::degraded(Vec::new(), NOTE_FAILED);
        }

        match response.bytes().await {
            Ok(audio) => {
                tracing::debug!(bytes = audio.len(), voice = %voice, "synthesis complete");
                Outcome::Fresh(audio.to_vec())
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to read TTS audio");
                Outcome::degraded(Vec::new(), NOTE_ERROR)
            }
        }
    }
}
