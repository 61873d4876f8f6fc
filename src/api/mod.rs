//! HTTP API server for the voice coach

mod auth;
mod coach;
mod error;
pub mod health;
mod profile;
pub mod rate_limit;
mod speech;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub use auth::{AuthUser, SESSION_COOKIE};
pub use error::{ApiError, UploadInfo};

use crate::Result;
use crate::config::{Config, copy_secret};
use crate::identity::{HostedIdentity, IdentityProvider, MemoryIdentity};
use crate::providers::{CoachingGateway, SpeechToText, TextToSpeech};

/// Largest accepted audio upload
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Shared state for API handlers
pub struct ApiState {
    pub stt: SpeechToText,
    pub coaching: CoachingGateway,
    pub tts: TextToSpeech,
    /// Without an identity provider every protected request is refused
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub rate_limiter: Option<rate_limit::SharedLimiter>,
}

/// Parse a request body; anything that is not JSON reads as null
pub(crate) fn lenient_json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    stt: SpeechToText,
    coaching: CoachingGateway,
    tts: TextToSpeech,
    port: u16,
    identity: Option<Arc<dyn IdentityProvider>>,
    static_dir: Option<PathBuf>,
    rate_limit_rpm: Option<u32>,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub const fn new(
        stt: SpeechToText,
        coaching: CoachingGateway,
        tts: TextToSpeech,
        port: u16,
    ) -> Self {
        Self {
            stt,
            coaching,
            tts,
            port,
            identity: None,
            static_dir: None,
            rate_limit_rpm: None,
        }
    }

    /// Wire gateways, identity and server options from configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let stt = SpeechToText::new(
            config.api_keys.elevenlabs.as_ref().map(copy_secret),
            config.voice.stt_model.clone(),
        );
        let coaching = CoachingGateway::new(
            config.api_keys.gemini.as_ref().map(copy_secret),
            config.coaching.models.clone(),
        );
        let tts = TextToSpeech::new(
            config.api_keys.elevenlabs.as_ref().map(copy_secret),
            config.voice.tts_model.clone(),
            config.voice.voice_id.clone(),
        );

        let identity: Option<Arc<dyn IdentityProvider>> = match (
            &config.identity.secret_key,
            &config.identity.issuer_url,
            &config.identity.dev_session,
        ) {
            (Some(secret), Some(issuer), _) => Some(Arc::new(HostedIdentity::new(
                config.identity.api_url.clone(),
                copy_secret(secret),
                issuer.clone(),
            ))),
            (_, _, Some(token)) => {
                tracing::warn!("using in-memory identity with a development session");
                Some(Arc::new(MemoryIdentity::dev(token.clone())))
            }
            _ => None,
        };

        Self::new(stt, coaching, tts, config.server.port)
            .identity(identity)
            .static_dir(config.server.static_dir.clone())
            .rate_limit_rpm(config.server.rate_limit_rpm)
    }

    /// Set the identity provider used for session checks and profiles
    #[must_use]
    pub fn identity(mut self, identity: Option<Arc<dyn IdentityProvider>>) -> Self {
        self.identity = identity;
        self
    }

    /// Set the static files directory for serving the web UI
    #[must_use]
    pub fn static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }

    /// Cap requests per minute across all clients
    #[must_use]
    pub const fn rate_limit_rpm(mut self, rpm: Option<u32>) -> Self {
        self.rate_limit_rpm = rpm;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        let state = Arc::new(ApiState {
            stt: self.stt,
            coaching: self.coaching,
            tts: self.tts,
            identity: self.identity,
            rate_limiter: self.rate_limit_rpm.map(rate_limit::create_limiter),
        });

        ApiServer {
            state,
            port: self.port,
            static_dir: self.static_dir,
        }
    }
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Routes that require a signed-in user
    fn protected_routes(&self) -> Router {
        Router::new()
            .route(
                "/api/speech-to-text",
                post(speech::speech_to_text).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
            )
            .route("/api/text-to-speech", post(speech::text_to_speech))
            .route("/api/ai-coach", post(coach::ai_coach))
            .route(
                "/api/profile",
                get(profile::get_profile).post(profile::update_profile),
            )
            .route("/api/onboarding", post(profile::complete_onboarding))
            .route_layer(axum::middleware::from_fn_with_state(
                self.state.clone(),
                auth::require_session,
            ))
            .with_state(self.state.clone())
    }

    /// Build the router with all routes
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = self
            .protected_routes()
            .merge(health::router())
            .merge(health::ready_router(self.state.clone()));

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir =
                ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        let router = router.layer(axum::middleware::from_fn_with_state(
            self.state.clone(),
            rate_limit::rate_limit_middleware,
        ));

        // CORS layer for cross-origin requests from frontend
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        self.serve(listener).await
    }

    /// Serve on an already-bound listener
    ///
    /// # Errors
    ///
    /// Returns error if the server stops abnormally
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let state = &self.state;
        if state.identity.is_none() {
            tracing::warn!("no identity provider configured, all /api requests will be refused");
        }
        tracing::info!(
            transcription = state.stt.is_configured(),
            coaching = state.coaching.is_configured(),
            synthesis = state.tts.is_configured(),
            rate_limited = state.rate_limiter.is_some(),
            "provider configuration"
        );

        let port = listener.local_addr().map(|a| a.port()).unwrap_or(self.port);
        tracing::info!(port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lenient_json_tolerates_garbage() {
        assert_eq!(lenient_json(b"{not json"), Value::Null);
        assert_eq!(lenient_json(br#"{"a":1}"#)["a"], 1);
    }
}
