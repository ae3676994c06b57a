//! Multilingual conformer recognition backend (ONNX)
//!
//! One shared acoustic model with a per-language token vocabulary. The
//! model emits frame-level log-probabilities which are collapsed with
//! greedy CTC decoding; subword boundary markers become spaces.

use std::collections::HashMap;
use std::path::Path;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;

use vaani_core::{Error, Result};

/// Subword boundary marker in the model vocabulary
const BOUNDARY_MARKER: char = '\u{2581}'; // ▁

/// Conformer backend configuration
#[derive(Debug, Clone)]
pub struct ConformerConfig {
    /// Inference threads per session
    pub num_threads: usize,
}

impl Default for ConformerConfig {
    fn default() -> Self {
        Self { num_threads: 2 }
    }
}

/// Per-language vocabulary: token list with the blank at the end
type Vocabulary = Vec<String>;

/// Multilingual CTC conformer
#[derive(Debug)]
pub struct ConformerBackend {
    session: Mutex<Session>,
    vocabularies: HashMap<String, Vocabulary>,
}

impl ConformerBackend {
    pub fn new(model_dir: &Path, config: ConformerConfig) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        if !model_path.exists() {
            return Err(Error::model_load(
                super::KEY_MULTILINGUAL,
                format!("model not found: {}", model_path.display()),
            ));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(config.num_threads))
            .and_then(|b| b.commit_from_file(&model_path))
            .map_err(|e| Error::model_load(super::KEY_MULTILINGUAL, format!("session: {e}")))?;

        let vocab_path = model_dir.join("vocab.json");
        let vocab_str = std::fs::read_to_string(&vocab_path)
            .map_err(|e| Error::model_load(super::KEY_MULTILINGUAL, format!("vocab.json: {e}")))?;
        let vocabularies: HashMap<String, Vocabulary> = serde_json::from_str(&vocab_str)
            .map_err(|e| Error::model_load(super::KEY_MULTILINGUAL, format!("vocab.json: {e}")))?;

        tracing::info!(
            languages = vocabularies.len(),
            "Conformer backend ready"
        );

        Ok(Self {
            session: Mutex::new(session),
            vocabularies,
        })
    }

    /// Languages with a vocabulary in this model
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.vocabularies.keys().map(String::as_str)
    }

    /// Transcribe a 16 kHz mono waveform for one language.
    pub fn transcribe(&self, samples: &[f32], lang: &str) -> Result<String> {
        let vocab = self
            .vocabularies
            .get(lang)
            .ok_or_else(|| Error::UnsupportedLanguage(lang.to_string()))?;

        let audio = ndarray::Array2::from_shape_vec((1, samples.len()), samples.to_vec())
            .map_err(|e| Error::Recognition(format!("audio array: {e}")))?;
        let length = ndarray::Array1::from_vec(vec![samples.len() as i64]);

        let audio_tensor = Tensor::from_array(audio)
            .map_err(|e| Error::Recognition(format!("audio tensor: {e}")))?;
        let length_tensor = Tensor::from_array(length)
            .map_err(|e| Error::Recognition(format!("length tensor: {e}")))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![
                "audio_signal" => audio_tensor,
                "length" => length_tensor,
            ])
            .map_err(|e| Error::Recognition(format!("inference: {e}")))?;

        let (shape, data) = outputs
            .get("logprobs")
            .ok_or_else(|| Error::Recognition("missing logprobs output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Recognition(format!("extract logprobs: {e}")))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 {
            return Err(Error::Recognition(format!(
                "unexpected logprobs shape: {dims:?}"
            )));
        }
        let (frames, classes) = (dims[1], dims[2]);

        Ok(ctc_collapse(data, frames, classes, vocab))
    }
}

/// Greedy CTC decode: per-frame argmax, collapse repeats, drop blanks,
/// then turn subword boundary markers into spaces.
fn ctc_collapse(logprobs: &[f32], frames: usize, classes: usize, vocab: &[String]) -> String {
    let blank_id = vocab.len().saturating_sub(1);
    let mut pieces = String::new();
    let mut previous = usize::MAX;

    for frame in 0..frames {
        let row = &logprobs[frame * classes..(frame + 1) * classes];
        let limit = row.len().min(vocab.len());
        let best = row[..limit]
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, _)| idx)
            .unwrap_or(blank_id);

        if best != previous && best != blank_id {
            pieces.push_str(&vocab[best]);
        }
        previous = best;
    }

    pieces.replace(BOUNDARY_MARKER, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_ctc_collapse_repeats_and_blanks() {
        // vocab: ["▁न", "म", "स", "|"] with blank at index 3
        let vocab = vocab(&["\u{2581}न", "म", "स", "|"]);
        // frames: 0 0 blank 1 1 2 → "▁न" "म" "स"
        #[rustfmt::skip]
        let logprobs = [
            1.0, 0.0, 0.0, 0.0,
            1.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
        ];
        assert_eq!(ctc_collapse(&logprobs, 6, 4, &vocab), "नमस");
    }

    #[test]
    fn test_boundary_marker_becomes_space() {
        let vocab = vocab(&["\u{2581}hello", "\u{2581}world", "|"]);
        #[rustfmt::skip]
        let logprobs = [
            1.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
            0.0, 1.0, 0.0,
        ];
        assert_eq!(ctc_collapse(&logprobs, 3, 3, &vocab), "hello world");
    }

    #[test]
    fn test_all_blank_frames_yield_empty_text() {
        let vocab = vocab(&["a", "b", "|"]);
        #[rustfmt::skip]
        let logprobs = [
            0.0, 0.0, 1.0,
            0.0, 0.0, 1.0,
        ];
        assert_eq!(ctc_collapse(&logprobs, 2, 3, &vocab), "");
    }

    #[test]
    fn test_missing_model_dir_is_load_error() {
        let err =
            ConformerBackend::new(Path::new("/nonexistent/stt"), ConformerConfig::default())
                .unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
