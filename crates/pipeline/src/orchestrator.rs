//! Pipeline coordinator
//!
//! Owns the stage objects and sequences them for each request. Heavy
//! work runs through a bounded pool of compute permits so a burst of
//! uploads cannot oversubscribe the model threads. Stage failures stop
//! at the stage boundary; the coordinator always hands the caller a
//! well-formed result.

use std::sync::Arc;

use base64::Engine;
use tokio::sync::Semaphore;

use vaani_core::{Error, PipelineOutput, Result};

use crate::audio::AudioNormalizer;
use crate::mt::TranslationStage;
use crate::stt::RecognitionStage;
use crate::tts::SynthesisStage;

/// Error surfaced when normalization produces no samples
const EMPTY_AUDIO_ERROR: &str = "Empty or invalid audio data extracted.";

/// End-to-end speech pipeline
pub struct Orchestrator {
    normalizer: AudioNormalizer,
    recognition: RecognitionStage,
    translation: TranslationStage,
    synthesis: SynthesisStage,
    compute: Arc<Semaphore>,
}

impl Orchestrator {
    pub fn new(
        normalizer: AudioNormalizer,
        recognition: RecognitionStage,
        translation: TranslationStage,
        synthesis: SynthesisStage,
        max_inference_tasks: usize,
    ) -> Self {
        Self {
            normalizer,
            recognition,
            translation,
            synthesis,
            compute: Arc::new(Semaphore::new(max_inference_tasks.max(1))),
        }
    }

    /// Run one audio chunk through normalize, recognize, and optionally
    /// translate.
    ///
    /// Translation runs only when a target language is supplied, it
    /// differs from the source, and recognition produced text. A
    /// translation failure keeps the transcription and reports the
    /// failure alongside it.
    pub async fn process_speech(
        &self,
        raw_audio: &[u8],
        lang: &str,
        target_lang: Option<&str>,
    ) -> PipelineOutput {
        let started = std::time::Instant::now();

        let Ok(_permit) = self.compute.acquire().await else {
            return PipelineOutput::failed("Pipeline is shutting down.");
        };

        let waveform = self.normalizer.normalize(raw_audio).await;
        if waveform.is_empty() {
            return PipelineOutput::failed(EMPTY_AUDIO_ERROR);
        }

        let text = self.recognition.transcribe(&waveform, lang).await;

        let mut output = PipelineOutput {
            text,
            ..Default::default()
        };

        if let Some(target) = target_lang {
            let wanted = !target.eq_ignore_ascii_case(lang) && !output.text.is_empty();
            if wanted {
                match self.translation.translate(&output.text, lang, target).await {
                    Ok(translated) => output.translated_text = translated,
                    Err(e) => {
                        tracing::error!(lang, target, error = %e, "Translation stage failed");
                        output.error = Some(format!("Translation failed: {e}"));
                    }
                }
            }
        }

        tracing::info!(
            lang,
            target = target_lang.unwrap_or("-"),
            audio_secs = format!("{:.2}", waveform.duration().as_secs_f32()),
            total_ms = started.elapsed().as_millis() as u64,
            chars = output.text.len(),
            "Speech request processed"
        );
        output
    }

    /// Synthesize text and return the audio as base64-encoded WAV.
    pub async fn generate_tts(&self, text: &str, lang: &str, style: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(Error::Synthesis("No text provided".to_string()));
        }

        let _permit = self
            .compute
            .acquire()
            .await
            .map_err(|_| Error::Synthesis("Pipeline is shutting down.".to_string()))?;

        let started = std::time::Instant::now();
        let wave = self
            .synthesis
            .synthesize(text, lang, style)
            .await
            .ok_or_else(|| {
                Error::Synthesis(format!("Speech generation failed for language '{lang}'"))
            })?;

        // Container assembly and base64 are CPU work; keep them off the
        // request path for long utterances.
        let encoded = tokio::task::spawn_blocking(move || -> Result<String> {
            let wav_bytes = wave.to_wav_bytes()?;
            Ok(base64::engine::general_purpose::STANDARD.encode(wav_bytes))
        })
        .await
        .map_err(|e| Error::Synthesis(format!("encoding task failed: {e}")))??;

        tracing::info!(
            lang,
            style,
            total_ms = started.elapsed().as_millis() as u64,
            "Speech generated"
        );
        Ok(encoded)
    }

    /// Languages the synthesis stage can serve
    pub fn tts_languages(&self) -> Vec<String> {
        self.synthesis.available_languages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use crate::cache::ModelCache;
    use crate::device::DeviceSelector;
    use vaani_config::{AudioConfig, ModelPaths, PipelineConfig};

    fn orchestrator() -> Orchestrator {
        let cache = Arc::new(ModelCache::new());
        let device = Arc::new(DeviceSelector::detect());
        let paths = ModelPaths::default();
        let pipeline = PipelineConfig::default();

        Orchestrator::new(
            AudioNormalizer::new(AudioConfig::default()),
            RecognitionStage::new(
                cache.clone(),
                device,
                paths.whisper_dir,
                paths.recognizer_dir,
            ),
            TranslationStage::new(
                cache.clone(),
                paths.translation_dir,
                pipeline.max_translation_tokens,
            ),
            SynthesisStage::new(cache, PathBuf::from("/nonexistent/voices")),
            pipeline.max_inference_tasks,
        )
    }

    #[tokio::test]
    async fn test_empty_audio_reports_uniform_error() {
        let out = orchestrator().process_speech(&[], "en", None).await;
        assert_eq!(out.error.as_deref(), Some(EMPTY_AUDIO_ERROR));
        assert!(out.text.is_empty());
        assert!(out.translated_text.is_empty());
    }

    #[tokio::test]
    async fn test_tts_rejects_empty_text_before_models() {
        let err = orchestrator().generate_tts("   ", "hi", "male").await.unwrap_err();
        assert!(err.to_string().contains("No text provided"));
    }

    #[tokio::test]
    async fn test_tts_missing_voice_is_error() {
        let err = orchestrator().generate_tts("hello", "hi", "male").await.unwrap_err();
        assert!(err.to_string().contains("hi"));
    }

    #[tokio::test]
    async fn test_tts_languages_empty_without_bundles() {
        assert!(orchestrator().tts_languages().is_empty());
    }
}
