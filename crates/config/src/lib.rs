//! Layered configuration
//!
//! Priority: environment variables (`VAANI_*`) > `config/{env}.yaml` >
//! `config/default.yaml` > built-in defaults.

mod settings;

pub use settings::{
    load_settings, AudioConfig, ModelPaths, PipelineConfig, ServerConfig, Settings,
};

use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}
