//! Session coordinator integration tests
//!
//! Audio devices are faked; the backend is either scripted in-process or a
//! real API server in front of fake vendors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use voice_coach::providers::SpeechPayload;
use voice_coach::session::{
    CoachBackend, DemoScript, DemoTurn, HttpBackend, MICROPHONE_ERROR,
};
use voice_coach::voice::AudioBlob;
use voice_coach::{
    CoachingReply, ConversationMessage, Error, Mode, Result, Role, SessionCoordinator,
    SessionState, TurnOutcome,
};

mod common;
use common::{FakeMicrophone, FakeSpeaker, TEST_SESSION, VendorScript, spawn_server, test_server};

/// How the scripted backend answers synthesis requests
#[derive(Clone, Copy)]
enum Synthesis {
    Audio,
    Silent,
    Fails,
}

/// In-process backend with canned answers
struct ScriptedBackend {
    transcript: String,
    coach_error: Option<String>,
    synthesis: Synthesis,
    transcribe_calls: AtomicUsize,
    coach_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
    histories_seen: Mutex<Vec<Vec<ConversationMessage>>>,
}

impl ScriptedBackend {
    fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            coach_error: None,
            synthesis: Synthesis::Audio,
            transcribe_calls: AtomicUsize::new(0),
            coach_calls: AtomicUsize::new(0),
            synthesize_calls: AtomicUsize::new(0),
            histories_seen: Mutex::new(Vec::new()),
        }
    }

    fn failing_coach(mut self, message: &str) -> Self {
        self.coach_error = Some(message.to_string());
        self
    }

    const fn synthesis(mut self, synthesis: Synthesis) -> Self {
        self.synthesis = synthesis;
        self
    }
}

/// Lets tests keep inspecting the backend the coordinator owns
struct Shared(Arc<ScriptedBackend>);

#[async_trait]
impl CoachBackend for Shared {
    async fn transcribe(&self, _audio: &AudioBlob) -> Result<String> {
        self.0.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.transcript.clone())
    }

    async fn coach(
        &self,
        _goal: &str,
        message: &str,
        history: &[ConversationMessage],
    ) -> Result<CoachingReply> {
        self.0.coach_calls.fetch_add(1, Ordering::SeqCst);
        self.0.histories_seen.lock().unwrap().push(history.to_vec());
        match &self.0.coach_error {
            Some(error) => Err(Error::Coaching(error.clone())),
            None => Ok(CoachingReply::plain(format!("You said: {message}"))),
        }
    }

    async fn synthesize(&self, _text: &str) -> Result<SpeechPayload> {
        self.0.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        match self.0.synthesis {
            Synthesis::Audio => Ok(SpeechPayload {
                audio: BASE64.encode([1_u8, 2, 3]),
                mime_type: "audio/mpeg".to_string(),
                note: None,
            }),
            Synthesis::Silent => Ok(SpeechPayload {
                audio: String::new(),
                mime_type: "audio/mpeg".to_string(),
                note: Some("TTS temporarily unavailable - text response shown".to_string()),
            }),
            Synthesis::Fails => Err(Error::Audio("speech synthesis failed (500)".to_string())),
        }
    }
}

type Coordinator = SessionCoordinator<Shared, FakeMicrophone, FakeSpeaker>;

fn live(backend: ScriptedBackend) -> (Coordinator, Arc<ScriptedBackend>, FakeMicrophone, FakeSpeaker) {
    let backend = Arc::new(backend);
    let mic = FakeMicrophone::default();
    let speaker = FakeSpeaker::default();
    let coordinator = SessionCoordinator::new(
        Shared(Arc::clone(&backend)),
        mic.clone(),
        speaker.clone(),
        Mode::Live,
        "language",
    );
    (coordinator, backend, mic, speaker)
}

#[tokio::test]
async fn test_happy_path_speaks_the_reply() {
    let (mut coach, backend, mic, speaker) = live(ScriptedBackend::new("hello there"));

    coach.start_listening().unwrap();
    assert_eq!(coach.state(), SessionState::Listening);
    assert!(coach.status().is_listening);
    assert_eq!(mic.acquisitions.load(Ordering::SeqCst), 1);

    let outcome = coach.stop_listening().await;
    assert_eq!(outcome, TurnOutcome::Completed { spoke: true });
    assert_eq!(coach.state(), SessionState::Speaking);
    assert!(coach.error().is_none());
    assert_eq!(mic.releases.load(Ordering::SeqCst), 1);

    let messages = coach.history().messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello there");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "You said: hello there");

    assert_eq!(speaker.play_count(), 1);
    assert_eq!(speaker.played.lock().unwrap()[0].bytes, vec![1, 2, 3]);
    assert_eq!(backend.synthesize_calls.load(Ordering::SeqCst), 1);

    assert!(coach.stop_speaking());
    assert_eq!(coach.state(), SessionState::Idle);
    assert!(!coach.stop_speaking());
}

#[tokio::test]
async fn test_playback_finishing_returns_to_idle() {
    let (mut coach, _, _, speaker) = live(ScriptedBackend::new("hello"));

    coach.start_listening().unwrap();
    coach.stop_listening().await;
    assert_eq!(coach.state(), SessionState::Speaking);

    speaker.finish_all();
    coach.wait_for_playback().await;
    assert_eq!(coach.state(), SessionState::Idle);
    assert!(!coach.status().is_speaking);

    coach.start_listening().unwrap();
    assert_eq!(coach.state(), SessionState::Listening);
}

#[tokio::test]
async fn test_natural_playback_end_is_published() {
    let (mut coach, _, _, speaker) = live(ScriptedBackend::new("hello"));
    let mut status = coach.subscribe();

    coach.start_listening().unwrap();
    coach.stop_listening().await;
    assert!(status.borrow_and_update().is_speaking);

    speaker.finish_all();
    tokio::time::timeout(std::time::Duration::from_secs(1), status.changed())
        .await
        .expect("idle status should be published")
        .unwrap();

    assert!(!status.borrow_and_update().is_speaking);
    assert_eq!(coach.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_stopped_playback_is_not_published_twice() {
    let (mut coach, _, _, speaker) = live(ScriptedBackend::new("hello"));

    coach.start_listening().unwrap();
    coach.stop_listening().await;
    coach.stop_speaking();

    coach.start_listening().unwrap();
    let mut status = coach.subscribe();
    status.borrow_and_update();

    speaker.finish_all();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert!(!status.has_changed().unwrap());
    assert!(status.borrow().is_listening);
}

#[tokio::test]
async fn test_stop_speaking_rewinds_playback() {
    let (mut coach, _, _, speaker) = live(ScriptedBackend::new("hello"));

    coach.start_listening().unwrap();
    coach.stop_listening().await;

    let completion = speaker.pending.lock().unwrap().pop().unwrap();
    completion.set_position(480);
    assert!(!completion.should_stop());

    coach.stop_speaking();
    assert!(completion.should_stop());
    completion.set_position(960);
    completion.complete();
    assert_eq!(coach.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_empty_transcript_reports_no_speech() {
    let (mut coach, backend, _, speaker) = live(ScriptedBackend::new("   "));

    coach.start_listening().unwrap();
    let outcome = coach.stop_listening().await;

    assert_eq!(outcome, TurnOutcome::Aborted("No speech detected".to_string()));
    assert_eq!(coach.error(), Some("No speech detected"));
    assert_eq!(coach.state(), SessionState::Idle);
    assert!(coach.history().is_empty());
    assert_eq!(backend.coach_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speaker.play_count(), 0);
}

#[tokio::test]
async fn test_coach_failure_keeps_user_message_only() {
    let (mut coach, backend, _, speaker) =
        live(ScriptedBackend::new("hello").failing_coach("AI coach failed to respond"));

    coach.start_listening().unwrap();
    let outcome = coach.stop_listening().await;

    assert_eq!(outcome, TurnOutcome::Aborted("AI coach failed to respond".to_string()));
    assert_eq!(coach.error(), Some("AI coach failed to respond"));
    assert_eq!(coach.state(), SessionState::Idle);

    let messages = coach.history().messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(backend.synthesize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speaker.play_count(), 0);
}

#[tokio::test]
async fn test_silent_synthesis_still_completes_turn() {
    for synthesis in [Synthesis::Silent, Synthesis::Fails] {
        let (mut coach, _, _, speaker) =
            live(ScriptedBackend::new("hello").synthesis(synthesis));

        coach.start_listening().unwrap();
        let outcome = coach.stop_listening().await;

        assert_eq!(outcome, TurnOutcome::Completed { spoke: false });
        assert_eq!(coach.state(), SessionState::Idle);
        assert!(coach.error().is_none());
        assert_eq!(coach.history().len(), 2);
        assert_eq!(speaker.play_count(), 0);
    }
}

#[tokio::test]
async fn test_broken_speaker_completes_silently() {
    let speaker = FakeSpeaker {
        broken: true,
        ..FakeSpeaker::default()
    };
    let mut coach = SessionCoordinator::new(
        Shared(Arc::new(ScriptedBackend::new("hello"))),
        FakeMicrophone::default(),
        speaker,
        Mode::Live,
        "language",
    );

    coach.start_listening().unwrap();
    assert_eq!(coach.stop_listening().await, TurnOutcome::Completed { spoke: false });
    assert_eq!(coach.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_coach_sees_history_before_the_utterance() {
    let (mut coach, backend, _, speaker) = live(ScriptedBackend::new("again"));

    coach.start_listening().unwrap();
    coach.stop_listening().await;
    speaker.finish_all();
    coach.start_listening().unwrap();
    coach.stop_listening().await;

    let seen = backend.histories_seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].is_empty());
    assert_eq!(seen[1].len(), 2);
    assert_eq!(seen[1][1].content, "You said: again");
    assert_eq!(coach.history().len(), 4);
}

#[tokio::test]
async fn test_transitions_outside_idle_are_refused() {
    let (mut coach, _, mic, _) = live(ScriptedBackend::new("hello"));

    coach.start_listening().unwrap();
    let err = coach.start_listening().unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTransition {
            from: SessionState::Listening,
            ..
        }
    ));
    assert_eq!(mic.acquisitions.load(Ordering::SeqCst), 1);

    coach.stop_listening().await;
    assert_eq!(coach.state(), SessionState::Speaking);
    assert!(matches!(
        coach.start_listening(),
        Err(Error::InvalidTransition {
            from: SessionState::Speaking,
            ..
        })
    ));
}

#[tokio::test]
async fn test_stop_listening_when_idle_is_ignored() {
    let (mut coach, backend, _, _) = live(ScriptedBackend::new("hello"));

    assert_eq!(coach.stop_listening().await, TurnOutcome::Ignored);
    assert_eq!(coach.state(), SessionState::Idle);
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_microphone_failure_is_surfaced() {
    let reported = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&reported);

    let mic = FakeMicrophone {
        refuse: true,
        ..FakeMicrophone::default()
    };
    let mut coach = SessionCoordinator::new(
        Shared(Arc::new(ScriptedBackend::new("hello"))),
        mic,
        FakeSpeaker::default(),
        Mode::Live,
        "language",
    )
    .with_error_callback(move |e| sink.lock().unwrap().push(e.to_string()));

    assert!(matches!(coach.start_listening(), Err(Error::PermissionDenied(_))));
    assert_eq!(coach.state(), SessionState::Idle);
    assert_eq!(coach.error(), Some(MICROPHONE_ERROR));
    assert_eq!(*reported.lock().unwrap(), vec![MICROPHONE_ERROR.to_string()]);
}

#[tokio::test]
async fn test_dropping_while_listening_releases_microphone() {
    let (mut coach, _, mic, _) = live(ScriptedBackend::new("hello"));

    coach.start_listening().unwrap();
    drop(coach);

    assert_eq!(mic.releases.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_status_updates_are_published() {
    let (mut coach, _, _, _) = live(ScriptedBackend::new("   "));
    let mut status = coach.subscribe();

    coach.start_listening().unwrap();
    assert!(status.has_changed().unwrap());
    assert!(status.borrow_and_update().is_listening);

    coach.stop_listening().await;
    let latest = status.borrow_and_update().clone();
    assert!(!latest.is_listening);
    assert!(!latest.is_processing);
    assert_eq!(latest.error.as_deref(), Some("No speech detected"));

    coach.clear_conversation();
    assert!(status.borrow_and_update().error.is_none());
}

const SHORT_SCRIPT: &[DemoTurn] = &[
    DemoTurn {
        user: "first",
        assistant: "reply one",
    },
    DemoTurn {
        user: "second",
        assistant: "reply two",
    },
];

#[tokio::test]
async fn test_demo_mode_needs_no_microphone() {
    let backend = Arc::new(ScriptedBackend::new("unused"));
    let mic = FakeMicrophone {
        refuse: true,
        ..FakeMicrophone::default()
    };
    let speaker = FakeSpeaker::default();
    let mut coach = SessionCoordinator::new(
        Shared(Arc::clone(&backend)),
        mic,
        speaker.clone(),
        Mode::Demo,
        "language",
    )
    .with_demo_script(DemoScript::new(SHORT_SCRIPT));

    for round in 0..3 {
        coach.start_listening().unwrap();
        assert_eq!(coach.state(), SessionState::Listening);
        assert_eq!(coach.stop_listening().await, TurnOutcome::Completed { spoke: true });
        assert_eq!(coach.demo_cursor(), round + 1);
        coach.stop_speaking();
    }

    let contents: Vec<&str> = coach
        .history()
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["first", "reply one", "second", "reply two", "first", "reply one"]
    );
    assert_eq!(backend.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(backend.coach_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speaker.play_count(), 3);
}

#[tokio::test]
async fn test_demo_mode_swallows_synthesis_failure() {
    let backend = ScriptedBackend::new("unused").synthesis(Synthesis::Fails);
    let mut coach = SessionCoordinator::new(
        Shared(Arc::new(backend)),
        FakeMicrophone::default(),
        FakeSpeaker::default(),
        Mode::Demo,
        "language",
    );

    coach.start_listening().unwrap();
    assert_eq!(coach.stop_listening().await, TurnOutcome::Completed { spoke: false });
    assert!(coach.error().is_none());
    assert_eq!(coach.history().len(), 2);
    assert_eq!(coach.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_preview_and_clear() {
    let (mut coach, backend, _, _) = live(ScriptedBackend::new("   "));

    coach.start_listening().unwrap();
    coach.stop_listening().await;
    assert!(coach.error().is_some());

    coach.run_demo_conversation();
    assert!(coach.error().is_none());
    let messages = coach.history().messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[0].role, Role::User);
    assert!(messages.windows(2).all(|w| w[0].timestamp < w[1].timestamp));

    coach.clear_conversation();
    assert!(coach.history().is_empty());
    assert_eq!(backend.coach_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_full_turn_through_http_server() {
    let (server, log) = test_server(VendorScript::default()).await;
    let url = spawn_server(server.router()).await;

    let speaker = FakeSpeaker::default();
    let mut coach = SessionCoordinator::new(
        HttpBackend::new(url, Some(TEST_SESSION.to_string())),
        FakeMicrophone::default(),
        speaker.clone(),
        Mode::Live,
        "conversation",
    );

    coach.start_listening().unwrap();
    let outcome = coach.stop_listening().await;

    assert_eq!(outcome, TurnOutcome::Completed { spoke: true });
    let contents: Vec<&str> = coach
        .history()
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["hello coach", "Lovely!"]);
    assert_eq!(
        speaker.played.lock().unwrap()[0].bytes,
        vec![0xFF, 0xF3, 0x01, 0x02]
    );
    assert!(log.prompts.lock().unwrap()[0].contains("natural casual conversations"));
}

#[tokio::test]
async fn test_http_turn_without_session_is_refused() {
    let (server, _) = test_server(VendorScript::default()).await;
    let url = spawn_server(server.router()).await;

    let mut coach = SessionCoordinator::new(
        HttpBackend::new(url, None),
        FakeMicrophone::default(),
        FakeSpeaker::default(),
        Mode::Live,
        "language",
    );

    coach.start_listening().unwrap();
    let outcome = coach.stop_listening().await;

    assert_eq!(outcome, TurnOutcome::Aborted("Unauthorized".to_string()));
    assert!(coach.history().is_empty());
}
