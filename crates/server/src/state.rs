//! Application state
//!
//! Shared state across all handlers. Everything is constructed once at
//! startup and injected; handlers never reach for globals.

use std::sync::Arc;

use vaani_config::Settings;
use vaani_pipeline::{
    AudioNormalizer, DeviceSelector, ModelCache, Orchestrator, RecognitionStage, SynthesisStage,
    TranslationStage,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the full pipeline from settings.
    pub fn new(settings: Settings) -> Self {
        let cache = Arc::new(ModelCache::new());
        let device = Arc::new(DeviceSelector::detect());

        let orchestrator = Orchestrator::new(
            AudioNormalizer::new(settings.audio.clone()),
            RecognitionStage::new(
                cache.clone(),
                device,
                settings.models.whisper_dir.clone(),
                settings.models.recognizer_dir.clone(),
            ),
            TranslationStage::new(
                cache.clone(),
                settings.models.translation_dir.clone(),
                settings.pipeline.max_translation_tokens,
            ),
            SynthesisStage::new(cache, settings.models.tts_checkpoints_dir.clone()),
            settings.pipeline.max_inference_tasks,
        );

        Self {
            settings: Arc::new(settings),
            orchestrator: Arc::new(orchestrator),
        }
    }
}
