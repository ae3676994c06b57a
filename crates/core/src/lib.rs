//! Core types for the speech-to-speech translation service
//!
//! This crate provides the types shared by the pipeline and server crates:
//! - Waveform (fixed-rate mono audio)
//! - Language tag routing and the bridge-vocabulary table
//! - Error types
//! - The per-request pipeline output record

pub mod audio;
pub mod error;
pub mod language;
pub mod pipeline;

pub use audio::Waveform;
pub use error::{Error, Result};
pub use language::{bridge_code, is_default_language, supported_tags, DEFAULT_LANGUAGE};
pub use pipeline::PipelineOutput;
