//! Server calls made by the session coordinator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::api::SESSION_COOKIE;
use crate::conversation::{CoachingReply, ConversationMessage};
use crate::providers::SpeechPayload;
use crate::voice::AudioBlob;
use crate::{Error, Result};

/// Multipart field carrying recorded audio
pub const AUDIO_FIELD: &str = "audio";

/// Remote half of a conversational turn
#[async_trait]
pub trait CoachBackend: Send + Sync {
    /// Transcribe a recording; an empty string means nothing was heard
    async fn transcribe(&self, audio: &AudioBlob) -> Result<String>;

    /// Get coaching feedback on `message`
    async fn coach(
        &self,
        goal: &str,
        message: &str,
        history: &[ConversationMessage],
    ) -> Result<CoachingReply>;

    /// Render `text` to speech
    async fn synthesize(&self, text: &str) -> Result<SpeechPayload>;
}

#[derive(Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Serialize)]
struct CoachRequest<'a> {
    message: &'a str,
    history: &'a [ConversationMessage],
    goal: &'a str,
}

#[derive(Serialize)]
struct SpeakRequest<'a> {
    text: &'a str,
}

/// Talks to a running coach server over HTTP
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    session: Option<String>,
}

impl HttpBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>, session: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let request = self.client.post(format!("{}{path}", self.base_url));
        match &self.session {
            Some(token) => request.header(reqwest::header::COOKIE, format!("{SESSION_COOKIE}={token}")),
            None => request,
        }
    }
}

/// Server-provided error message, if the body carries one
async fn error_message(response: reqwest::Response) -> Option<String> {
    response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error)
        .filter(|e| !e.is_empty())
}

#[async_trait]
impl CoachBackend for HttpBackend {
    async fn transcribe(&self, audio: &AudioBlob) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio.bytes.clone())
            .file_name(audio.file_name.clone())
            .mime_str(&audio.mime_type)?;
        let form = reqwest::multipart::Form::new().part(AUDIO_FIELD, part);

        let response = self.post("/api/speech-to-text").multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let details = error_message(response)
                .await
                .unwrap_or_else(|| "Speech recognition failed".to_string());
            return Err(Error::TranscriptionFailed {
                status: status.as_u16(),
                details,
            });
        }

        let body: TranscriptBody = response.json().await?;
        Ok(body.text.unwrap_or_default())
    }

    async fn coach(
        &self,
        goal: &str,
        message: &str,
        history: &[ConversationMessage],
    ) -> Result<CoachingReply> {
        let response = self
            .post("/api/ai-coach")
            .json(&CoachRequest {
                message,
                history,
                goal,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let message = error_message(response)
                .await
                .unwrap_or_else(|| "AI coach failed to respond".to_string());
            return Err(Error::Coaching(message));
        }

        Ok(response.json().await?)
    }

    async fn synthesize(&self, text: &str) -> Result<SpeechPayload> {
        let response = self
            .post("/api/text-to-speech")
            .json(&SpeakRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Audio(format!(
                "speech synthesis failed ({})",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}
