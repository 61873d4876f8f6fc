//! Gateways to hosted speech and language providers
//!
//! Each gateway translates one internal operation into a call against a
//! single third-party API:
//! - [`SpeechToText`]: recorded audio to transcript
//! - [`CoachingGateway`]: transcript plus recent history to coaching reply
//! - [`TextToSpeech`]: reply text to audio, degrading to silence

pub mod coaching;
pub mod fallback;
pub mod stt;
pub mod tts;

pub use coaching::CoachingGateway;
pub use fallback::{FallbackExhausted, try_in_order};
pub use stt::SpeechToText;
pub use tts::{SpeechPayload, TextToSpeech};
