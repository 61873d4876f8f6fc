//! Coaching gateway backed by a hosted generative language model

use std::sync::LazyLock;

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::fallback::{self, FallbackExhausted};
use crate::conversation::{
    self, CoachingReply, ConversationMessage, HISTORY_WINDOW, goal_context,
};
use crate::degrade::Outcome;
use crate::{Error, Result};

/// Generative language API root
pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Message used when the model omits one
pub const DEFAULT_MESSAGE: &str = "Great job! Keep going.";

/// Encouragement used when the model omits one
pub const DEFAULT_ENCOURAGEMENT: &str = "You're doing well!";

/// Encouragement attached to a reply whose JSON could not be parsed
pub const FALLBACK_ENCOURAGEMENT: &str = "Keep practicing!";

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?:json)?[ \t]*\r?\n?([\s\S]*?)\r?\n?[ \t]*```").expect("valid regex")
});

static BARE_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));

/// generateContent request body
#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

/// generateContent response body (partial)
#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// JSON shape the model is asked to produce
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelReply {
    #[serde(alias = "message")]
    response: Option<String>,
    corrections: Option<Vec<String>>,
    encouragement: Option<String>,
    next_steps: Option<String>,
}

/// Produces coaching feedback for a student utterance
pub struct CoachingGateway {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    models: Vec<String>,
    base_url: String,
}

impl CoachingGateway {
    /// Create a coaching gateway trying `models` in order
    #[must_use]
    pub fn new(api_key: Option<SecretString>, models: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            models,
            base_url: GEMINI_API_URL.to_string(),
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

    /// Ask the model for coaching on `transcript`
    ///
    /// Only the last [`HISTORY_WINDOW`] entries of `history` reach the model.
    /// A reply that is not valid JSON is returned as a degraded plain message.
    ///
    /// # Errors
    ///
    /// Returns `Config` without credentials, or `CoachingUnavailable` when
    /// every candidate model fails
    pub async fn get_coaching_reply(
        &self,
        goal: &str,
        transcript: &str,
        history: &[ConversationMessage],
    ) -> Result<Outcome<CoachingReply>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("Gemini API key not configured".to_string()))?;

        let prompt = build_prompt(goal, transcript, history);
        let prompt = prompt.as_str();

        let (model, raw) = fallback::try_in_order(&self.models, |model| async move {
            self.generate(api_key, &model, prompt).await
        })
        .await
        .map_err(|e: FallbackExhausted| {
            tracing::error!(error = %e, "coaching model call failed for all candidates");
            Error::CoachingUnavailable(e.to_string())
        })?;

        tracing::debug!(model = %model, chars = raw.len(), "coaching reply received");

        let reply = parse_reply(&raw);
        if let Some(reason) = reply.reason() {
            tracing::warn!(reason = %reason, "coaching reply was not structured, using raw text");
        }
        Ok(reply)
    }

    /// Single generateContent call against one model
    async fn generate(&self, api_key: &SecretString, model: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(format!("{}/models/{model}:generateContent", self.base_url))
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Coaching(format!("model {model} returned {status}: {body}")));
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Coaching(format!("model {model} returned no text")));
        }

        Ok(text)
    }
}

/// Render the full prompt for one coaching request
#[must_use]
pub fn build_prompt(goal: &str, transcript: &str, history: &[ConversationMessage]) -> String {
    let context = goal_context(goal);
    let recent = conversation::recent(history, HISTORY_WINDOW)
        .iter()
        .map(|m| format!("{}: {}", m.role.speaker(), m.content))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an enthusiastic, supportive voice coach helping someone with {context}. 

Your role:
- Listen carefully to what they say
- Provide specific, actionable pronunciation or speaking feedback
- Encourage them warmly and build confidence
- Adapt difficulty to their level
- Keep responses conversational and natural (2-3 sentences max)
- Point out what they did well before corrections

Response format (JSON):
{{
  "response": "Your main conversational reply",
  "corrections": ["specific pronunciation tips if needed"],
  "encouragement": "positive reinforcement",
  "nextSteps": "optional suggestion for what to practice next"
}}

Recent conversation:
{recent}

Student just said: "{transcript}"

Provide your coaching response as JSON:"#
    )
}

/// Extract the JSON candidate from free-form model output
///
/// Prefers a fenced code block, then the outermost brace-delimited span,
/// else the whole text.
fn extract_json(raw: &str) -> &str {
    if let Some(inner) = FENCED_JSON.captures(raw).and_then(|c| c.get(1)) {
        return inner.as_str();
    }
    BARE_OBJECT.find(raw).map_or(raw, |m| m.as_str())
}

/// Parse model output into a reply, degrading to the raw text on failure
#[must_use]
pub fn parse_reply(raw: &str) -> Outcome<CoachingReply> {
    let parsed = serde_json::from_str::<ModelReply>(extract_json(raw));

    Outcome::attempt(parsed.map(normalize), || CoachingReply {
        message: raw.trim().to_string(),
        corrections: Vec::new(),
        encouragement: Some(FALLBACK_ENCOURAGEMENT.to_string()),
        next_steps: None,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Fill in defaults for fields the model left out
fn normalize(reply: ModelReply) -> CoachingReply {
    CoachingReply {
        message: non_empty(reply.response).unwrap_or_else(|| DEFAULT_MESSAGE.to_string()),
        corrections: reply.corrections.unwrap_or_default(),
        encouragement: Some(
            non_empty(reply.encouragement).unwrap_or_else(|| DEFAULT_ENCOURAGEMENT.to_string()),
        ),
        next_steps: non_empty(reply.next_steps),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::conversation::Role;

    const PAYLOAD: &str = r#"{
  "response": "Nice sentence!",
  "corrections": ["Say 'went', not 'goed'"],
  "encouragement": "Great energy",
  "nextSteps": "Practice past tense"
}"#;

    #[test]
    fn fenced_and_bare_payloads_parse_identically() {
        let fenced = parse_reply(&format!("Here you go:\n```json\n{PAYLOAD}\n```\nBye"));
        let bare = parse_reply(&format!("Sure! {PAYLOAD} Hope that helps."));
        let plain_fence = parse_reply(&format!("```\n{PAYLOAD}\n```"));

        assert_eq!(fenced.reason(), None);
        assert_eq!(fenced, bare);
        assert_eq!(fenced, plain_fence);

        let reply = fenced.into_inner();
        assert_eq!(reply.message, "Nice sentence!");
        assert_eq!(reply.corrections, vec!["Say 'went', not 'goed'"]);
        assert_eq!(reply.encouragement.as_deref(), Some("Great energy"));
        assert_eq!(reply.next_steps.as_deref(), Some("Practice past tense"));
    }

    #[test]
    fn malformed_payload_degrades_to_raw_text() {
        let outcome = parse_reply("  Good try { not json at all  ");
        assert!(outcome.reason().is_some());

        let reply = outcome.into_inner();
        assert_eq!(reply.message, "Good try { not json at all");
        assert_eq!(reply.encouragement.as_deref(), Some(FALLBACK_ENCOURAGEMENT));
        assert!(reply.corrections.is_empty());
        assert!(reply.next_steps.is_none());
    }

    #[test]
    fn missing_fields_get_defaults() {
        let reply = parse_reply(r#"{"corrections": []}"#).into_inner();
        assert_eq!(reply.message, DEFAULT_MESSAGE);
        assert_eq!(reply.encouragement.as_deref(), Some(DEFAULT_ENCOURAGEMENT));
        assert!(reply.next_steps.is_none());
    }

    #[test]
    fn prompt_includes_only_recent_history() {
        let history: Vec<ConversationMessage> = (0..10)
            .map(|i| {
                let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
                ConversationMessage::at(role, format!("turn-{i}"), Utc::now())
            })
            .collect();

        let prompt = build_prompt("pronunciation", "hello there", &history);

        assert!(prompt.contains("improving pronunciation and accent"));
        assert!(prompt.contains("Student just said: \"hello there\""));
        for i in 0..4 {
            assert!(!prompt.contains(&format!("turn-{i}\n")), "turn-{i} leaked");
        }
        assert!(prompt.contains("Student: turn-4"));
        assert!(prompt.contains("Coach: turn-9"));
        assert_eq!(prompt.matches("turn-").count(), 6);
    }

    #[test]
    fn prompt_uses_generic_persona_for_unknown_goal() {
        let prompt = build_prompt("karaoke", "hi", &[]);
        assert!(prompt.contains("helping someone with improving speaking skills"));
    }
}
