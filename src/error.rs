//! Error types for the voice coach

use thiserror::Error;

/// Result type alias for voice coach operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice coach
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone access was refused by the platform
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Speech-to-text provider returned a non-success status
    #[error("transcription failed ({status}): {details}")]
    TranscriptionFailed { status: u16, details: String },

    /// Transcript came back empty
    #[error("No speech detected")]
    NoSpeechDetected,

    /// Every coaching model candidate failed
    #[error("coaching unavailable: {0}")]
    CoachingUnavailable(String),

    /// Coaching endpoint rejected the request
    #[error("{0}")]
    Coaching(String),

    /// Identity provider error
    #[error("identity error: {0}")]
    Identity(String),

    /// No valid session
    #[error("unauthorized")]
    Unauthorized,

    /// Session coordinator refused a transition
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: crate::session::SessionState,
        action: &'static str,
    },

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
