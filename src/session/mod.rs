//! Session coordinator
//!
//! Sequences one conversational turn at a time:
//! capture -> transcribe -> coach -> synthesize -> play.
//!
//! The coordinator is an explicit state machine. Transitions are methods on
//! `&mut self`, so two turns can never interleave, and every transition
//! publishes a [`SessionStatus`] snapshot to subscribers.

mod backend;
mod demo;

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

pub use backend::{AUDIO_FIELD, CoachBackend, HttpBackend};
pub use demo::{DemoScript, DemoTurn, preview_transcript};

use crate::conversation::{ConversationHistory, Role};
use crate::voice::{AudioClip, AudioInput, AudioOutput, PlaybackHandle, Recording};
use crate::{Error, Result};

/// Error shown when the microphone cannot be opened
pub const MICROPHONE_ERROR: &str = "Failed to access microphone";

/// Where the coordinator is in a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        };
        f.write_str(name)
    }
}

/// Observable snapshot of the coordinator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub is_listening: bool,
    pub is_processing: bool,
    pub is_speaking: bool,
    /// Last error, cleared when a new attempt starts
    pub error: Option<String>,
}

/// Whether turns use the microphone and server or the built-in script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Live,
    Demo,
}

/// Result of a stop-listening request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Both messages were appended; `spoke` tells whether playback started
    Completed { spoke: bool },
    /// The turn stopped early; the message is also in the error slot
    Aborted(String),
    /// Not listening, nothing to stop
    Ignored,
}

enum Phase<R> {
    Idle,
    /// `None` in demo mode, where no device is held
    Listening(Option<R>),
    Processing,
    Speaking(PlaybackHandle),
}

type ErrorCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Drives conversational turns against a backend and audio devices
pub struct SessionCoordinator<B, I: AudioInput, O> {
    backend: B,
    input: I,
    output: O,
    mode: Mode,
    goal: String,
    phase: Phase<I::Recording>,
    history: ConversationHistory,
    error: Option<String>,
    demo: DemoScript,
    demo_cursor: usize,
    on_error: Option<ErrorCallback>,
    status_tx: watch::Sender<SessionStatus>,
}

impl<B, I, O> SessionCoordinator<B, I, O>
where
    B: CoachBackend,
    I: AudioInput,
    O: AudioOutput,
{
    /// Create an idle coordinator with empty history
    pub fn new(backend: B, input: I, output: O, mode: Mode, goal: impl Into<String>) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        Self {
            backend,
            input,
            output,
            mode,
            goal: goal.into(),
            phase: Phase::Idle,
            history: ConversationHistory::new(),
            error: None,
            demo: DemoScript::default(),
            demo_cursor: 0,
            on_error: None,
            status_tx,
        }
    }

    /// Be told about every surfaced error
    #[must_use]
    pub fn with_error_callback(mut self, callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Use a different demo script
    #[must_use]
    pub const fn with_demo_script(mut self, script: DemoScript) -> Self {
        self.demo = script;
        self
    }

    #[must_use]
    pub fn goal(&self) -> &str {
        &self.goal
    }

    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Number of demo turns played so far
    #[must_use]
    pub const fn demo_cursor(&self) -> usize {
        self.demo_cursor
    }

    /// Current state; finished playback reads as idle
    #[must_use]
    pub fn state(&self) -> SessionState {
        match &self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Listening(_) => SessionState::Listening,
            Phase::Processing => SessionState::Processing,
            Phase::Speaking(handle) if handle.is_finished() => SessionState::Idle,
            Phase::Speaking(_) => SessionState::Speaking,
        }
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let state = self.state();
        SessionStatus {
            is_listening: state == SessionState::Listening,
            is_processing: state == SessionState::Processing,
            is_speaking: state == SessionState::Speaking,
            error: self.error.clone(),
        }
    }

    /// Receive a snapshot after every transition
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    /// Begin capturing an utterance
    ///
    /// Demo mode only flips state; live mode acquires the microphone.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless idle, or the device error when the
    /// microphone cannot be acquired (also surfaced in the error slot)
    pub fn start_listening(&mut self) -> Result<()> {
        self.settle();

        let from = self.state();
        if from != SessionState::Idle {
            return Err(Error::InvalidTransition {
                from,
                action: "start listening",
            });
        }

        self.error = None;

        let recording = match self.mode {
            Mode::Demo => None,
            Mode::Live => match self.input.acquire() {
                Ok(recording) => Some(recording),
                Err(e) => {
                    tracing::warn!(error = %e, "microphone unavailable");
                    self.surface(MICROPHONE_ERROR.to_string());
                    return Err(e);
                }
            },
        };

        tracing::debug!(mode = ?self.mode, "listening");
        self.phase = Phase::Listening(recording);
        self.publish();
        Ok(())
    }

    /// Finish capturing and run the rest of the turn
    pub async fn stop_listening(&mut self) -> TurnOutcome {
        let recording = match std::mem::replace(&mut self.phase, Phase::Processing) {
            Phase::Listening(recording) => recording,
            other => {
                self.phase = other;
                return TurnOutcome::Ignored;
            }
        };

        self.error = None;
        self.publish();

        let clip = match (self.mode, recording) {
            (Mode::Live, Some(recording)) => match self.live_turn(recording).await {
                Ok(clip) => clip,
                Err(e) => return self.abort(&e),
            },
            _ => self.demo_turn().await,
        };

        let spoke = clip.is_some_and(|clip| self.start_playback(&clip));
        if !spoke {
            self.phase = Phase::Idle;
        }
        self.publish();

        TurnOutcome::Completed { spoke }
    }

    /// Halt playback immediately and rewind; returns whether anything was playing
    pub fn stop_speaking(&mut self) -> bool {
        let Phase::Speaking(handle) = &self.phase else {
            return false;
        };

        let was_playing = !handle.is_finished();
        handle.stop();
        self.phase = Phase::Idle;
        self.publish();

        if was_playing {
            tracing::debug!("playback stopped by request");
        }
        was_playing
    }

    /// Wait for the current playback to end on its own
    pub async fn wait_for_playback(&mut self) {
        if let Phase::Speaking(handle) = &self.phase {
            handle.clone().finished().await;
        }
        self.settle();
    }

    /// Forget the conversation and the last error
    pub fn clear_conversation(&mut self) {
        self.history.clear();
        self.error = None;
        self.publish();
    }

    /// Replace the conversation with the preview transcript
    pub fn run_demo_conversation(&mut self) {
        self.error = None;
        self.history.replace(preview_transcript(Utc::now()));
        self.publish();
    }

    /// Transcribe, coach and synthesize one recorded utterance
    async fn live_turn(&mut self, recording: I::Recording) -> Result<Option<AudioClip>> {
        let blob = recording.finish()?;
        tracing::debug!(bytes = blob.len(), "recording captured");

        let transcript = self.backend.transcribe(&blob).await?;
        if transcript.trim().is_empty() {
            return Err(Error::NoSpeechDetected);
        }

        // The coach sees history as it was before this utterance
        let prior = self.history.messages().to_vec();
        self.history.push(Role::User, transcript.clone());

        let reply = self.backend.coach(&self.goal, &transcript, &prior).await?;
        self.history.push(Role::Assistant, reply.message.clone());

        Ok(self.synthesize_quietly(&reply.message).await)
    }

    /// Append the next scripted exchange; never fails
    async fn demo_turn(&mut self) -> Option<AudioClip> {
        let turn = self.demo.turn(self.demo_cursor)?;
        self.demo_cursor += 1;

        self.history.push(Role::User, turn.user);
        self.history.push(Role::Assistant, turn.assistant);

        self.synthesize_quietly(turn.assistant).await
    }

    /// Synthesis that degrades to silence on any failure
    async fn synthesize_quietly(&self, text: &str) -> Option<AudioClip> {
        let payload = match self.backend.synthesize(text).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, continuing without audio");
                return None;
            }
        };

        let note = payload.note.clone();
        match payload.into_clip() {
            Ok(Some(clip)) => Some(clip),
            Ok(None) => {
                tracing::info!(
                    note = note.as_deref().unwrap_or("No audio generated"),
                    "TTS unavailable"
                );
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable speech payload");
                None
            }
        }
    }

    fn start_playback(&mut self, clip: &AudioClip) -> bool {
        match self.output.play(clip) {
            Ok(handle) => {
                self.watch_playback(handle.clone());
                self.phase = Phase::Speaking(handle);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "playback failed to start");
                false
            }
        }
    }

    /// Publish the return to idle when playback ends on its own
    fn watch_playback(&self, handle: PlaybackHandle) {
        let status_tx = self.status_tx.clone();
        tokio::spawn(async move {
            handle.finished().await;
            // A stopped playback was already published by whoever stopped it
            if !handle.is_stopped() {
                status_tx.send_modify(|status| status.is_speaking = false);
            }
        });
    }

    fn abort(&mut self, error: &Error) -> TurnOutcome {
        let message = match error {
            Error::TranscriptionFailed { details, .. } => details.clone(),
            other => other.to_string(),
        };
        tracing::warn!(error = %message, "turn aborted");

        self.phase = Phase::Idle;
        self.surface(message.clone());
        TurnOutcome::Aborted(message)
    }

    fn surface(&mut self, message: String) {
        if let Some(callback) = &self.on_error {
            callback(&message);
        }
        self.error = Some(message);
        self.publish();
    }

    /// Drop a playback that has already ended
    fn settle(&mut self) {
        if matches!(&self.phase, Phase::Speaking(handle) if handle.is_finished()) {
            self.phase = Phase::Idle;
            self.publish();
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

impl<B, I: AudioInput, O> Drop for SessionCoordinator<B, I, O> {
    fn drop(&mut self) {
        match &mut self.phase {
            Phase::Listening(Some(recording)) => recording.release(),
            Phase::Speaking(handle) => handle.stop(),
            _ => {}
        }
    }
}
