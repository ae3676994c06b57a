//! Error types shared across the pipeline

use thiserror::Error;

/// Service-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the speech pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Audio decode / transcode failure
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech recognition failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Machine translation failure
    #[error("translation error: {0}")]
    Translation(String),

    /// Speech synthesis failure
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// A model failed to construct (missing files, bad weights)
    #[error("model load error for '{key}': {message}")]
    ModelLoad { key: String, message: String },

    /// Language tag has no route through the requested stage
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a model-load error under a cache key
    pub fn model_load(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelLoad {
            key: key.into(),
            message: message.into(),
        }
    }
}
