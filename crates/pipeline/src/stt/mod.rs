//! Recognition stage
//!
//! Converts waveforms to text. Routing is a pure function of the
//! language tag: the default language goes to the general-purpose
//! Whisper backend, everything else to the multilingual conformer,
//! which takes the language selector directly. Backend failures are
//! non-fatal; the caller always gets a clean (possibly empty) string.

mod conformer;
mod whisper;

pub use conformer::{ConformerBackend, ConformerConfig};
pub use whisper::WhisperBackend;

use std::path::PathBuf;
use std::sync::Arc;

use vaani_core::{is_default_language, Result, Waveform};

use crate::cache::ModelCache;
use crate::device::DeviceSelector;

/// Cache key for the default-language backend
pub const KEY_DEFAULT: &str = "recognition-default";
/// Cache key for the multilingual backend
pub const KEY_MULTILINGUAL: &str = "recognition-multilingual";

/// Which recognition backend serves a language tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionRoute {
    /// General-purpose acoustic model (default language)
    Default,
    /// Multilingual model taking a language selector
    Multilingual,
}

/// Pure routing function, no runtime type inspection
pub fn route(tag: &str) -> RecognitionRoute {
    if is_default_language(tag) {
        RecognitionRoute::Default
    } else {
        RecognitionRoute::Multilingual
    }
}

/// Speech recognition over cached backends
pub struct RecognitionStage {
    cache: Arc<ModelCache>,
    device: Arc<DeviceSelector>,
    whisper_dir: PathBuf,
    recognizer_dir: PathBuf,
}

impl RecognitionStage {
    pub fn new(
        cache: Arc<ModelCache>,
        device: Arc<DeviceSelector>,
        whisper_dir: PathBuf,
        recognizer_dir: PathBuf,
    ) -> Self {
        Self {
            cache,
            device,
            whisper_dir,
            recognizer_dir,
        }
    }

    /// Transcribe a waveform.
    ///
    /// Recognition failure is non-fatal: errors are logged and an empty
    /// string returned so the pipeline can still produce a result.
    pub async fn transcribe(&self, waveform: &Waveform, lang: &str) -> String {
        if waveform.is_empty() {
            return String::new();
        }

        let started = std::time::Instant::now();
        let result = match route(lang) {
            RecognitionRoute::Default => self.transcribe_default(waveform).await,
            RecognitionRoute::Multilingual => self.transcribe_multilingual(waveform, lang).await,
        };

        match result {
            Ok(text) => {
                tracing::info!(
                    lang,
                    route = ?route(lang),
                    stt_ms = started.elapsed().as_millis() as u64,
                    chars = text.len(),
                    "Transcription complete"
                );
                text
            }
            Err(e) => {
                tracing::error!(lang, error = %e, "Transcription failed");
                String::new()
            }
        }
    }

    async fn transcribe_default(&self, waveform: &Waveform) -> Result<String> {
        let dir = self.whisper_dir.clone();
        let device = self.device.candle_device().clone();
        let kind = self.device.kind();
        let model = self
            .cache
            .load::<WhisperBackend, _>(KEY_DEFAULT, move || {
                tracing::info!(dir = %dir.display(), device = %kind, "Constructing Whisper backend");
                WhisperBackend::new(&dir, device)
            })
            .await?;

        let samples = waveform.samples().to_vec();
        tokio::task::spawn_blocking(move || model.transcribe(&samples))
            .await
            .map_err(|e| vaani_core::Error::Recognition(format!("transcription task failed: {e}")))?
    }

    async fn transcribe_multilingual(&self, waveform: &Waveform, lang: &str) -> Result<String> {
        let dir = self.recognizer_dir.clone();
        let kind = self.device.kind();
        let model = self
            .cache
            .load::<ConformerBackend, _>(KEY_MULTILINGUAL, move || {
                tracing::info!(dir = %dir.display(), device = %kind, "Constructing conformer backend");
                ConformerBackend::new(&dir, ConformerConfig::default())
            })
            .await?;

        let samples = waveform.samples().to_vec();
        let lang = lang.to_string();
        tokio::task::spawn_blocking(move || model.transcribe(&samples, &lang))
            .await
            .map_err(|e| vaani_core::Error::Recognition(format!("transcription task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vaani_config::{AudioConfig, ModelPaths};

    fn stage() -> RecognitionStage {
        let paths = ModelPaths::default();
        RecognitionStage::new(
            Arc::new(ModelCache::new()),
            Arc::new(DeviceSelector::detect()),
            paths.whisper_dir,
            paths.recognizer_dir,
        )
    }

    #[test]
    fn test_routing_is_pure() {
        assert_eq!(route("en"), RecognitionRoute::Default);
        assert_eq!(route("hi"), RecognitionRoute::Multilingual);
        assert_eq!(route("ta"), RecognitionRoute::Multilingual);
        assert_eq!(route("xx"), RecognitionRoute::Multilingual);
    }

    #[tokio::test]
    async fn test_empty_waveform_short_circuits() {
        let stage = stage();
        let wave = Waveform::empty(AudioConfig::default().sample_rate);
        assert_eq!(stage.transcribe(&wave, "hi").await, "");
    }

    #[tokio::test]
    async fn test_missing_model_degrades_to_empty_text() {
        // No model files exist at the default paths; the stage must
        // swallow the load failure and return an empty transcript.
        let stage = stage();
        let wave = Waveform::new(vec![0.1; 1600], 16000);
        assert_eq!(stage.transcribe(&wave, "hi").await, "");
        assert_eq!(stage.transcribe(&wave, "en").await, "");
    }
}
