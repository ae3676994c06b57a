//! Synthesis stage
//!
//! Two-model text-to-speech: an acoustic model turns character ids into
//! a mel spectrogram, a vocoder turns the spectrogram into samples.
//! Each language's models ship as a voice bundle on disk and load
//! lazily into the shared cache. Synthesis failures are reported as
//! absence, not errors; callers decide what absence means for them.

mod bundle;
mod configs;

pub use bundle::VoiceBundle;
pub use configs::{resolve_path, ResolvedConfig};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use serde_json::Value;

use vaani_core::{Error, Result, Waveform};

use crate::cache::ModelCache;

/// Inference threads per session
const NUM_THREADS: usize = 2;

/// Fallback output rate when the voice config does not declare one
const DEFAULT_VOICE_RATE: u32 = 22050;

/// Cache key for one language's synthesizer
pub fn synthesis_key(lang: &str) -> String {
    format!("synthesis-{lang}")
}

/// Character-to-id table built from the acoustic model config
struct CharTokenizer {
    ids: HashMap<char, i64>,
}

impl CharTokenizer {
    /// The vocabulary order is pad, punctuation, then letters, matching
    /// the table the acoustic model was trained with.
    fn from_config(config: &Value) -> Result<Self> {
        let chars = config
            .get("characters")
            .ok_or_else(|| Error::Synthesis("config has no characters table".to_string()))?;
        let field = |name: &str| chars.get(name).and_then(Value::as_str).unwrap_or("");

        let mut ids = HashMap::new();
        let mut next = 0i64;
        for ch in field("pad")
            .chars()
            .chain(field("punctuations").chars())
            .chain(field("characters").chars())
        {
            ids.entry(ch).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
        }

        if ids.is_empty() {
            return Err(Error::Synthesis("empty character table".to_string()));
        }
        Ok(Self { ids })
    }

    /// Encode text, silently dropping characters outside the table.
    fn encode(&self, text: &str) -> Vec<i64> {
        text.chars().filter_map(|ch| self.ids.get(&ch).copied()).collect()
    }
}

/// Acoustic model and vocoder pair for one language
pub struct Synthesizer {
    acoustic: Mutex<Session>,
    vocoder: Mutex<Session>,
    tokenizer: CharTokenizer,
    speakers: HashMap<String, i64>,
    sample_rate: u32,
}

impl Synthesizer {
    pub fn new(bundle: &VoiceBundle) -> Result<Self> {
        let session = |path: &Path| -> Result<Session> {
            Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.with_intra_threads(NUM_THREADS))
                .and_then(|b| b.commit_from_file(path))
                .map_err(|e| Error::Synthesis(format!("{}: {e}", path.display())))
        };
        let acoustic = session(&bundle.acoustic_model)?;
        let vocoder = session(&bundle.vocoder_model)?;

        let config = ResolvedConfig::load(&bundle.acoustic_config)?;
        let tokenizer = CharTokenizer::from_config(config.value())?;
        let sample_rate = config
            .value()
            .get("audio")
            .and_then(|a| a.get("sample_rate"))
            .and_then(Value::as_u64)
            .map(|r| r as u32)
            .unwrap_or(DEFAULT_VOICE_RATE);

        let speakers = bundle.load_speakers()?;

        tracing::info!(
            lang = %bundle.lang,
            speakers = speakers.len(),
            sample_rate,
            "Synthesizer ready"
        );

        Ok(Self {
            acoustic: Mutex::new(acoustic),
            vocoder: Mutex::new(vocoder),
            tokenizer,
            speakers,
            sample_rate,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Synthesize `text` in the given voice style.
    pub fn synthesize(&self, text: &str, style: &str) -> Result<Waveform> {
        let speaker_id = *self
            .speakers
            .get(style)
            .ok_or_else(|| Error::Synthesis(format!("unknown voice style '{style}'")))?;

        let token_ids = self.tokenizer.encode(text);
        if token_ids.is_empty() {
            return Err(Error::Synthesis(
                "no synthesizable characters in text".to_string(),
            ));
        }

        let text_array = ndarray::Array2::from_shape_vec((1, token_ids.len()), token_ids)
            .map_err(|e| Error::Synthesis(format!("text array: {e}")))?;
        let text_tensor = Tensor::from_array(text_array)
            .map_err(|e| Error::Synthesis(format!("text tensor: {e}")))?;
        let speaker_tensor = Tensor::from_array(ndarray::Array1::from_vec(vec![speaker_id]))
            .map_err(|e| Error::Synthesis(format!("speaker tensor: {e}")))?;

        let mut acoustic = self.acoustic.lock();
        let acoustic_outputs = acoustic
            .run(ort::inputs![
                "text" => text_tensor,
                "speaker_id" => speaker_tensor,
            ])
            .map_err(|e| Error::Synthesis(format!("acoustic inference failed: {e}")))?;

        let (mel_shape, mel_data) = acoustic_outputs
            .get("mel")
            .ok_or_else(|| Error::Synthesis("missing mel output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Synthesis(format!("extract mel: {e}")))?;

        let mel_dims: Vec<usize> = mel_shape.iter().map(|&d| d as usize).collect();
        let mel_array = ndarray::ArrayD::from_shape_vec(
            ndarray::IxDyn(&mel_dims),
            mel_data.to_vec(),
        )
        .map_err(|e| Error::Synthesis(format!("mel array: {e}")))?;
        let mel_tensor = Tensor::from_array(mel_array)
            .map_err(|e| Error::Synthesis(format!("mel tensor: {e}")))?;

        let mut vocoder = self.vocoder.lock();
        let vocoder_outputs = vocoder
            .run(ort::inputs!["mel" => mel_tensor])
            .map_err(|e| Error::Synthesis(format!("vocoder inference failed: {e}")))?;

        let (_, audio_data) = vocoder_outputs
            .get("audio")
            .ok_or_else(|| Error::Synthesis("missing audio output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Synthesis(format!("extract audio: {e}")))?;

        Ok(Waveform::new(audio_data.to_vec(), self.sample_rate))
    }
}

/// Text-to-speech over cached per-language synthesizers
pub struct SynthesisStage {
    cache: Arc<ModelCache>,
    checkpoints_dir: PathBuf,
}

impl SynthesisStage {
    pub fn new(cache: Arc<ModelCache>, checkpoints_dir: PathBuf) -> Self {
        Self {
            cache,
            checkpoints_dir,
        }
    }

    /// Synthesize text for a language and voice style.
    ///
    /// Every failure mode, from a missing bundle to a vocoder error, is
    /// logged and collapsed to `None`.
    pub async fn synthesize(&self, text: &str, lang: &str, style: &str) -> Option<Waveform> {
        let key = synthesis_key(lang);
        let root = self.checkpoints_dir.clone();
        let owned_lang = lang.to_string();

        let model = match self
            .cache
            .load::<Synthesizer, _>(&key, move || {
                let bundle = VoiceBundle::resolve(&root, &owned_lang)?;
                tracing::info!(lang = %owned_lang, "Constructing synthesizer");
                Synthesizer::new(&bundle)
            })
            .await
        {
            Ok(model) => model,
            Err(e) => {
                tracing::error!(lang, error = %e, "Synthesizer unavailable");
                return None;
            }
        };

        let started = std::time::Instant::now();
        let owned_text = text.to_string();
        let owned_style = style.to_string();
        let result =
            tokio::task::spawn_blocking(move || model.synthesize(&owned_text, &owned_style)).await;

        match result {
            Ok(Ok(wave)) => {
                tracing::info!(
                    lang,
                    style,
                    tts_ms = started.elapsed().as_millis() as u64,
                    samples = wave.len(),
                    "Synthesis complete"
                );
                Some(wave)
            }
            Ok(Err(e)) => {
                tracing::error!(lang, style, error = %e, "Synthesis failed");
                None
            }
            Err(e) => {
                tracing::error!(lang, error = %e, "Synthesis task failed");
                None
            }
        }
    }

    /// Languages with a complete voice bundle on disk
    pub fn available_languages(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.checkpoints_dir) else {
            return Vec::new();
        };

        let mut langs: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|lang| VoiceBundle::is_complete(&self.checkpoints_dir, lang))
            .collect();
        langs.sort();
        langs
    }
}
