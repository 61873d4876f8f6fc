//! Shared test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, response::IntoResponse};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use voice_coach::Result;
use voice_coach::api::{ApiServer, ApiServerBuilder};
use voice_coach::identity::MemoryIdentity;
use voice_coach::providers::{CoachingGateway, SpeechToText, TextToSpeech};
use voice_coach::voice::{
    AudioBlob, AudioClip, AudioInput, AudioOutput, PlaybackCompletion, PlaybackHandle, Recording,
};

/// Session token accepted by test servers
pub const TEST_SESSION: &str = "test-session";

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });
    format!("http://{addr}")
}

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

/// Canned upstream behavior for the hosted vendors
#[derive(Clone)]
pub struct VendorScript {
    pub transcript: (StatusCode, Value),
    /// Raw model text, or `None` to fail every model
    pub model_text: Option<String>,
    pub audio: (StatusCode, Vec<u8>),
}

impl Default for VendorScript {
    fn default() -> Self {
        Self {
            transcript: (StatusCode::OK, json!({ "text": "hello coach" })),
            model_text: Some(
                r#"```json
{"response": "Lovely!", "corrections": [], "encouragement": "Keep it up", "nextSteps": null}
```"#
                    .to_string(),
            ),
            audio: (StatusCode::OK, vec![0xFF, 0xF3, 0x01, 0x02]),
        }
    }
}

/// What the fake vendors were asked
#[derive(Default)]
pub struct VendorLog {
    pub models_tried: Mutex<Vec<String>>,
    pub prompts: Mutex<Vec<String>>,
    pub voices: Mutex<Vec<String>>,
    pub transcriptions: AtomicUsize,
}

struct VendorState {
    script: VendorScript,
    log: Arc<VendorLog>,
}

async fn vendor_transcribe(State(state): State<Arc<VendorState>>) -> impl IntoResponse {
    state.log.transcriptions.fetch_add(1, Ordering::SeqCst);
    let (status, body) = state.script.transcript.clone();
    (status, Json(body))
}

async fn vendor_generate(
    State(state): State<Arc<VendorState>>,
    Path(call): Path<String>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let model = call.trim_end_matches(":generateContent").to_string();
    state.log.models_tried.lock().unwrap().push(model);
    if let Some(prompt) = body["contents"][0]["parts"][0]["text"].as_str() {
        state.log.prompts.lock().unwrap().push(prompt.to_string());
    }

    match &state.script.model_text {
        Some(text) => (
            StatusCode::OK,
            Json(json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": { "message": "model not found" } })),
        ),
    }
}

async fn vendor_speak(
    State(state): State<Arc<VendorState>>,
    Path(voice): Path<String>,
) -> impl IntoResponse {
    state.log.voices.lock().unwrap().push(voice);
    let (status, bytes) = state.script.audio.clone();
    (status, bytes)
}

/// Start fake speech and language vendors, returning their base URL
pub async fn spawn_vendors(script: VendorScript) -> (String, Arc<VendorLog>) {
    let log = Arc::new(VendorLog::default());
    let state = Arc::new(VendorState {
        script,
        log: Arc::clone(&log),
    });

    let router = Router::new()
        .route("/speech-to-text", post(vendor_transcribe))
        .route("/models/{call}", post(vendor_generate))
        .route("/text-to-speech/{voice}", post(vendor_speak))
        .with_state(state);

    (spawn_server(router).await, log)
}

/// API server wired to the given vendors with a single dev session
pub fn server_against(vendor_url: &str, with_keys: bool) -> ApiServerBuilder {
    let key = |v: &str| with_keys.then(|| secret(v));
    let stt = SpeechToText::new(key("xi"), "scribe_v1".to_string()).with_base_url(vendor_url);
    let coaching = CoachingGateway::new(
        key("gm"),
        vec!["model-a".to_string(), "model-b".to_string()],
    )
    .with_base_url(vendor_url);
    let tts = TextToSpeech::new(key("xi"), "tts-model".to_string(), "default-voice".to_string())
        .with_base_url(vendor_url);

    ApiServerBuilder::new(stt, coaching, tts, 0)
        .identity(Some(Arc::new(MemoryIdentity::dev(TEST_SESSION))))
}

pub async fn test_server(script: VendorScript) -> (ApiServer, Arc<VendorLog>) {
    let (url, log) = spawn_vendors(script).await;
    (server_against(&url, true).build(), log)
}

/// Read a JSON response body
pub async fn json_body(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&body).expect("body is not JSON")
}

/// Microphone that records a fixed blob and counts device activity
#[derive(Clone, Default)]
pub struct FakeMicrophone {
    pub refuse: bool,
    pub acquisitions: Arc<AtomicUsize>,
    pub releases: Arc<AtomicUsize>,
}

pub struct FakeRecording {
    released: bool,
    releases: Arc<AtomicUsize>,
}

impl AudioInput for FakeMicrophone {
    type Recording = FakeRecording;

    fn acquire(&self) -> Result<FakeRecording> {
        if self.refuse {
            return Err(voice_coach::Error::PermissionDenied("denied by test".to_string()));
        }
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeRecording {
            released: false,
            releases: Arc::clone(&self.releases),
        })
    }
}

impl Recording for FakeRecording {
    fn finish(mut self) -> Result<AudioBlob> {
        self.release();
        Ok(AudioBlob::new(vec![1, 2, 3, 4], "audio/wav", "audio.wav"))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Drop for FakeRecording {
    fn drop(&mut self) {
        self.release();
    }
}

/// Speaker that never makes a sound; tests finish playback by hand
#[derive(Clone, Default)]
pub struct FakeSpeaker {
    pub broken: bool,
    pub played: Arc<Mutex<Vec<AudioClip>>>,
    pub pending: Arc<Mutex<Vec<PlaybackCompletion>>>,
}

impl FakeSpeaker {
    /// Let every in-progress playback end naturally
    pub fn finish_all(&self) {
        for completion in self.pending.lock().unwrap().drain(..) {
            completion.complete();
        }
    }

    pub fn play_count(&self) -> usize {
        self.played.lock().unwrap().len()
    }
}

impl AudioOutput for FakeSpeaker {
    fn play(&mut self, clip: &AudioClip) -> Result<PlaybackHandle> {
        if self.broken {
            return Err(voice_coach::Error::Audio("no device".to_string()));
        }
        self.played.lock().unwrap().push(clip.clone());
        let (handle, completion) = PlaybackHandle::new();
        self.pending.lock().unwrap().push(completion);
        Ok(handle)
    }
}
