//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model locations
    #[serde(default)]
    pub models: ModelPaths,

    /// Audio ingestion configuration
    #[serde(default)]
    pub audio: AudioConfig,

    /// Pipeline execution configuration
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = localhost only)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Enable CORS origin checks (disable only for development)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
            cors_enabled: true,
        }
    }
}

/// On-disk model locations
///
/// Each path can also be overridden individually through the
/// `VAANI_MODELS__*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPaths {
    /// Whisper model directory (default-language recognition backend)
    #[serde(default = "default_whisper_dir")]
    pub whisper_dir: PathBuf,

    /// Multilingual conformer model directory
    #[serde(default = "default_recognizer_dir")]
    pub recognizer_dir: PathBuf,

    /// Translation encoder/decoder/tokenizer directory
    #[serde(default = "default_translation_dir")]
    pub translation_dir: PathBuf,

    /// Root directory holding one voice-bundle subdirectory per language
    #[serde(default = "default_tts_checkpoints_dir")]
    pub tts_checkpoints_dir: PathBuf,
}

impl Default for ModelPaths {
    fn default() -> Self {
        Self {
            whisper_dir: default_whisper_dir(),
            recognizer_dir: default_recognizer_dir(),
            translation_dir: default_translation_dir(),
            tts_checkpoints_dir: default_tts_checkpoints_dir(),
        }
    }
}

/// Audio ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate for all pipeline audio
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Inputs below this byte count are rejected without a decode attempt
    #[serde(default = "default_min_audio_bytes")]
    pub min_audio_bytes: usize,

    /// Bounded retries for transient decode failures
    #[serde(default = "default_decode_retries")]
    pub decode_retries: u32,

    /// Backoff between decode retries, in milliseconds
    #[serde(default = "default_decode_backoff_ms")]
    pub decode_backoff_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            min_audio_bytes: default_min_audio_bytes(),
            decode_retries: default_decode_retries(),
            decode_backoff_ms: default_decode_backoff_ms(),
        }
    }
}

/// Pipeline execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on concurrent compute-bound tasks (decode + inference)
    #[serde(default = "default_max_inference_tasks")]
    pub max_inference_tasks: usize,

    /// Maximum tokens the translation decoder may emit
    #[serde(default = "default_max_translation_tokens")]
    pub max_translation_tokens: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_inference_tasks: default_max_inference_tasks(),
            max_translation_tokens: default_max_translation_tokens(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_true() -> bool {
    true
}

fn default_whisper_dir() -> PathBuf {
    PathBuf::from("models/stt/whisper-tiny")
}

fn default_recognizer_dir() -> PathBuf {
    PathBuf::from("models/stt/indic-conformer")
}

fn default_translation_dir() -> PathBuf {
    PathBuf::from("models/translation/nllb")
}

fn default_tts_checkpoints_dir() -> PathBuf {
    PathBuf::from("models/tts/checkpoints")
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_min_audio_bytes() -> usize {
    100
}

fn default_decode_retries() -> u32 {
    2
}

fn default_decode_backoff_ms() -> u64 {
    200
}

fn default_max_inference_tasks() -> usize {
    4
}

fn default_max_translation_tokens() -> usize {
    128
}

/// Load settings from config files and environment.
///
/// `env` selects an overlay file (`config/{env}.yaml`); both files are
/// optional so a bare environment still starts with defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::from(Path::new("config/default.yaml")).required(false));

    if let Some(env) = env {
        builder = builder
            .add_source(File::from(Path::new(&format!("config/{env}.yaml"))).required(false));
    }

    let config = builder
        .add_source(Environment::with_prefix("VAANI").separator("__"))
        .build()?;

    let settings: Settings = config.try_deserialize()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.server.port, 8001);
        assert_eq!(settings.audio.sample_rate, 16000);
        assert_eq!(settings.audio.min_audio_bytes, 100);
        assert_eq!(settings.pipeline.max_inference_tasks, 4);
        assert_eq!(settings.pipeline.max_translation_tokens, 128);
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let settings = load_settings(None).expect("defaults should load");
        assert_eq!(settings.audio.sample_rate, 16000);
        assert!(settings.server.cors_enabled);
    }
}
