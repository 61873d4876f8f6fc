//! TOML configuration file loading
//!
//! Supports `~/.config/voice-coach/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay under the environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct CoachConfigFile {
    /// API keys for hosted providers
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Speech configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Coaching model configuration
    #[serde(default)]
    pub coaching: CoachingFileConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Identity provider configuration
    #[serde(default)]
    pub identity: IdentityFileConfig,

    /// Terminal client configuration
    #[serde(default)]
    pub client: ClientFileConfig,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Default synthesis voice
    pub voice_id: Option<String>,

    /// Transcription model (e.g. "scribe_v1")
    pub stt_model: Option<String>,

    /// Synthesis model (e.g. "eleven_monolingual_v1")
    pub tts_model: Option<String>,
}

/// Coaching model configuration
#[derive(Debug, Default, Deserialize)]
pub struct CoachingFileConfig {
    /// Candidate model identifiers in priority order
    pub models: Option<Vec<String>>,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub port: Option<u16>,
    pub static_dir: Option<String>,
    pub rate_limit_rpm: Option<u32>,
}

/// Identity provider configuration
#[derive(Debug, Default, Deserialize)]
pub struct IdentityFileConfig {
    pub secret_key: Option<String>,
    pub issuer_url: Option<String>,
    pub api_url: Option<String>,
    pub dev_session: Option<String>,
}

/// Terminal client configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClientFileConfig {
    pub server_url: Option<String>,
    pub session: Option<String>,
    pub goal: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CoachConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> CoachConfigFile {
    config_file_path().map_or_else(CoachConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Missing or malformed files fall back to defaults.
pub fn load_from(path: &Path) -> CoachConfigFile {
    if !path.exists() {
        return CoachConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                CoachConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            CoachConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voice-coach/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voice-coach").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_parses() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[voice]
voice_id = "abc"

[coaching]
models = ["m1", "m2"]
"#
        )
        .unwrap();

        let config = load_from(file.path());
        assert_eq!(config.voice.voice_id.as_deref(), Some("abc"));
        assert_eq!(config.coaching.models, Some(vec!["m1".to_string(), "m2".to_string()]));
        assert!(config.api_keys.gemini.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is = = not toml").unwrap();

        let config = load_from(file.path());
        assert!(config.server.port.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let config = load_from(Path::new("/definitely/not/here.toml"));
        assert!(config.voice.voice_id.is_none());
    }
}
