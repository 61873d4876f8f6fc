//! Configuration management for the voice coach
//!
//! Values come from the environment, layered over an optional TOML file.
//! The environment always wins.

pub mod file;

use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};

pub use file::{CoachConfigFile, config_file_path, load_config_file};

/// Default synthesis voice
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

/// Default transcription model
pub const DEFAULT_STT_MODEL: &str = "scribe_v1";

/// Default synthesis model
pub const DEFAULT_TTS_MODEL: &str = "eleven_monolingual_v1";

/// Coaching model candidates, tried in order
pub const DEFAULT_COACHING_MODELS: &[&str] = &[
    "gemini-1.5-flash-latest",
    "gemini-1.5-flash",
    "gemini-1.0-pro",
    "gemini-pro",
];

/// Default identity provider backend API
pub const DEFAULT_IDENTITY_API_URL: &str = "https://api.clerk.com/v1";

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3000;

/// Voice coach configuration
#[derive(Debug)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Hosted provider credentials
    pub api_keys: ApiKeys,

    /// Speech configuration
    pub voice: VoiceConfig,

    /// Coaching model configuration
    pub coaching: CoachingConfig,

    /// Identity provider configuration
    pub identity: IdentityConfig,

    /// Terminal client configuration
    pub client: ClientConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Path to static files directory (web UI)
    pub static_dir: Option<PathBuf>,

    /// Global requests-per-minute cap
    pub rate_limit_rpm: Option<u32>,
}

/// API keys for hosted providers
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Generative language model key
    pub gemini: Option<SecretString>,

    /// Speech provider key (used for both transcription and synthesis)
    pub elevenlabs: Option<SecretString>,
}

/// Speech configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub voice_id: String,
    pub stt_model: String,
    pub tts_model: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.to_string(),
            stt_model: DEFAULT_STT_MODEL.to_string(),
            tts_model: DEFAULT_TTS_MODEL.to_string(),
        }
    }
}

/// Coaching model configuration
#[derive(Debug, Clone)]
pub struct CoachingConfig {
    /// Candidate model identifiers in priority order
    pub models: Vec<String>,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            models: DEFAULT_COACHING_MODELS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// Identity provider configuration
#[derive(Debug)]
pub struct IdentityConfig {
    /// Backend API secret
    pub secret_key: Option<SecretString>,

    /// Session token issuer (JWKS discovery base)
    pub issuer_url: Option<String>,

    /// Backend API base URL
    pub api_url: String,

    /// Fixed session token accepted by the in-memory identity store
    pub dev_session: Option<String>,
}

/// Terminal client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: String,
    pub session: Option<String>,
    pub goal: String,
}

/// Independent copy of a secret
#[must_use]
pub fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn load() -> crate::Result<Self> {
        let file = load_config_file();
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is present but invalid
    pub fn from_sources(
        file: CoachConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> crate::Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let port = match env("COACH_PORT").or_else(|| env("PORT")) {
            Some(raw) => raw
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid port {raw:?}: {e}")))?,
            None => file.server.port.unwrap_or(DEFAULT_PORT),
        };

        let rate_limit_rpm = match env("COACH_RATE_LIMIT_RPM") {
            Some(raw) => Some(raw.parse().map_err(|e| {
                crate::Error::Config(format!("invalid rate limit {raw:?}: {e}"))
            })?),
            None => file.server.rate_limit_rpm,
        };

        let server = ServerConfig {
            port,
            static_dir: env("COACH_STATIC_DIR")
                .or(file.server.static_dir)
                .map(PathBuf::from),
            rate_limit_rpm,
        };

        // Both names are accepted for the generative model key
        let api_keys = ApiKeys {
            gemini: env("GOOGLE_GEMINI_API_KEY")
                .or_else(|| env("GOOGLE_AI_API_KEY"))
                .or(file.api_keys.gemini)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(file.api_keys.elevenlabs)
                .map(SecretString::from),
        };

        let voice = VoiceConfig {
            voice_id: env("ELEVENLABS_VOICE_ID")
                .or(file.voice.voice_id)
                .unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            stt_model: env("COACH_STT_MODEL")
                .or(file.voice.stt_model)
                .unwrap_or_else(|| DEFAULT_STT_MODEL.to_string()),
            tts_model: env("COACH_TTS_MODEL")
                .or(file.voice.tts_model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
        };

        let models = env("COACH_MODELS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
            })
            .or(file.coaching.models)
            .filter(|models| !models.is_empty());
        let coaching = models.map_or_else(CoachingConfig::default, |models| CoachingConfig {
            models,
        });

        let identity = IdentityConfig {
            secret_key: env("IDENTITY_SECRET_KEY")
                .or(file.identity.secret_key)
                .map(SecretString::from),
            issuer_url: env("IDENTITY_ISSUER_URL").or(file.identity.issuer_url),
            api_url: env("IDENTITY_API_URL")
                .or(file.identity.api_url)
                .unwrap_or_else(|| DEFAULT_IDENTITY_API_URL.to_string()),
            dev_session: env("COACH_DEV_SESSION").or(file.identity.dev_session),
        };

        let client = ClientConfig {
            server_url: env("COACH_SERVER_URL")
                .or(file.client.server_url)
                .unwrap_or_else(|| format!("http://localhost:{port}")),
            session: env("COACH_SESSION").or(file.client.session),
            goal: file
                .client
                .goal
                .unwrap_or_else(|| crate::conversation::DEFAULT_GOAL.to_string()),
        };

        Ok(Self {
            server,
            api_keys,
            voice,
            coaching,
            identity,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_sources(CoachConfigFile::default(), |k| vars.get(k).cloned()).unwrap()
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.voice.voice_id, DEFAULT_VOICE_ID);
        assert_eq!(config.voice.stt_model, "scribe_v1");
        assert_eq!(config.coaching.models.len(), 4);
        assert_eq!(config.coaching.models[0], "gemini-1.5-flash-latest");
        assert!(config.api_keys.gemini.is_none());
        assert_eq!(config.client.server_url, "http://localhost:3000");
    }

    #[test]
    fn either_gemini_key_name_is_accepted() {
        let primary = config_from(&[("GOOGLE_GEMINI_API_KEY", "a"), ("GOOGLE_AI_API_KEY", "b")]);
        assert_eq!(primary.api_keys.gemini.unwrap().expose_secret(), "a");

        let alternate = config_from(&[("GOOGLE_AI_API_KEY", "b")]);
        assert_eq!(alternate.api_keys.gemini.unwrap().expose_secret(), "b");
    }

    #[test]
    fn empty_values_are_ignored() {
        let config = config_from(&[("ELEVENLABS_API_KEY", "  ")]);
        assert!(config.api_keys.elevenlabs.is_none());
    }

    #[test]
    fn model_list_is_split_and_trimmed() {
        let config = config_from(&[("COACH_MODELS", "a, b ,,c")]);
        assert_eq!(config.coaching.models, vec!["a", "b", "c"]);
    }

    #[test]
    fn environment_overrides_file() {
        let mut file = CoachConfigFile::default();
        file.voice.voice_id = Some("from-file".to_string());
        file.server.port = Some(9000);

        let config = Config::from_sources(file, |k| {
            (k == "ELEVENLABS_VOICE_ID").then(|| "from-env".to_string())
        })
        .unwrap();

        assert_eq!(config.voice.voice_id, "from-env");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.client.server_url, "http://localhost:9000");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let result = Config::from_sources(CoachConfigFile::default(), |k| {
            (k == "PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(crate::Error::Config(_))));
    }
}
