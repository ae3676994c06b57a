//! Speech pipeline
//!
//! Sequences audio normalization, recognition, translation, and
//! synthesis over chunked streaming audio. Stages share a model cache
//! and a device selector; all compute-bound work runs off the request
//! path through a bounded worker pool.

pub mod audio;
pub mod cache;
pub mod device;
pub mod mt;
pub mod orchestrator;
pub mod stt;
pub mod tts;

pub use audio::AudioNormalizer;
pub use cache::ModelCache;
pub use device::{DeviceKind, DeviceSelector};
pub use mt::TranslationStage;
pub use orchestrator::Orchestrator;
pub use stt::{RecognitionRoute, RecognitionStage};
pub use tts::SynthesisStage;
