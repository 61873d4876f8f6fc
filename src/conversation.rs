//! Conversation data model
//!
//! Messages, the append-only history they live in, and the structured reply
//! produced by the coaching model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of most recent history entries forwarded to the coaching model
pub const HISTORY_WINDOW: usize = 6;

/// Goal tag used when none (or an invalid one) is supplied
pub const DEFAULT_GOAL: &str = "language";

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering history into a prompt
    #[must_use]
    pub const fn speaker(self) -> &'static str {
        match self {
            Self::User => "Student",
            Self::Assistant => "Coach",
        }
    }
}

/// A single conversation entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch on the wire
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    /// Create a message stamped with the current time
    #[must_use]
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self::at(role, content, Utc::now())
    }

    /// Create a message with an explicit timestamp
    #[must_use]
    pub fn at(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }
}

/// Ordered, append-only sequence of messages
///
/// Individual entries are never removed; only the whole history can be
/// cleared or replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationHistory {
    messages: Vec<ConversationMessage>,
}

impl ConversationHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Append a message stamped now
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ConversationMessage::now(role, content));
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Replace the whole sequence
    pub fn replace(&mut self, messages: Vec<ConversationMessage>) {
        self.messages = messages;
    }

    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// The last `n` entries of `messages`, oldest first
#[must_use]
pub fn recent(messages: &[ConversationMessage], n: usize) -> &[ConversationMessage] {
    &messages[messages.len().saturating_sub(n)..]
}

/// Structured coaching feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingReply {
    pub message: String,
    #[serde(default)]
    pub corrections: Vec<String>,
    #[serde(default)]
    pub encouragement: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
}

impl CoachingReply {
    /// Reply carrying only a message
    #[must_use]
    pub fn plain(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            corrections: Vec::new(),
            encouragement: None,
            next_steps: None,
        }
    }
}

/// Persona description for a goal tag
///
/// Unknown tags fall back to a generic speaking-skills persona.
#[must_use]
pub fn goal_context(goal: &str) -> &'static str {
    match goal {
        "language" => "learning a new language from basics",
        "pronunciation" => "improving pronunciation and accent",
        "presentation" => "practicing public speaking and presentations",
        "conversation" => "having natural casual conversations",
        _ => "improving speaking skills",
    }
}
