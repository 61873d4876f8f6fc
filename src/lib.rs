//! Voice Coach - spoken practice sessions with an AI coach
//!
//! This library provides the pieces of a voice coaching service:
//! - Microphone capture, level metering and playback
//! - Gateways to hosted speech-to-text, coaching and text-to-speech providers
//! - The HTTP server those gateways sit behind
//! - A session coordinator that runs conversational turns against it
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Session Coordinator                  │
//! │   capture → transcribe → coach → synthesize → play  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ HTTP (session cookie)
//! ┌────────────────────▼────────────────────────────────┐
//! │                    API Server                        │
//! │  /api/speech-to-text │ /api/ai-coach │ /api/text-…  │
//! └──────┬──────────────────────┬───────────────┬───────┘
//!        │                      │               │
//! ┌──────▼──────┐  ┌────────────▼──┐  ┌─────────▼──────┐
//! │ STT provider│  │ LLM (fallback │  │ Identity       │
//! │ TTS provider│  │  model list)  │  │ provider       │
//! └─────────────┘  └───────────────┘  └────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod conversation;
pub mod degrade;
pub mod error;
pub mod identity;
pub mod providers;
pub mod session;
pub mod voice;

pub use config::Config;
pub use conversation::{
    CoachingReply, ConversationHistory, ConversationMessage, DEFAULT_GOAL, HISTORY_WINDOW, Role,
};
pub use degrade::Outcome;
pub use error::{Error, Result};
pub use session::{Mode, SessionCoordinator, SessionState, SessionStatus, TurnOutcome};
