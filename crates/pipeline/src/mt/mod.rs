//! Translation stage
//!
//! Seq2seq machine translation over an ONNX encoder/decoder pair with a
//! shared multilingual tokenizer. Language tags are mapped to the
//! model's bridge vocabulary; the decoder is forced to open with the
//! target-language token and decoded greedily.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use parking_lot::Mutex;
use tokenizers::Tokenizer;

use vaani_core::{bridge_code, Error, Result};

use crate::cache::ModelCache;

/// Cache key for the translation model
pub const KEY_TRANSLATION: &str = "translation";

/// Inference threads per session
const NUM_THREADS: usize = 2;

/// Encoder/decoder pair plus tokenizer
pub struct TranslationModel {
    encoder: Mutex<Session>,
    decoder: Mutex<Session>,
    tokenizer: Tokenizer,
    eos_id: i64,
}

impl TranslationModel {
    pub fn new(model_dir: &Path) -> Result<Self> {
        let encoder_path = model_dir.join("encoder.onnx");
        if !encoder_path.exists() {
            return Err(Error::model_load(
                KEY_TRANSLATION,
                format!("encoder not found: {}", encoder_path.display()),
            ));
        }

        let session = |path: PathBuf| -> Result<Session> {
            Session::builder()
                .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
                .and_then(|b| b.with_intra_threads(NUM_THREADS))
                .and_then(|b| b.commit_from_file(&path))
                .map_err(|e| {
                    Error::model_load(KEY_TRANSLATION, format!("{}: {e}", path.display()))
                })
        };
        let encoder = session(encoder_path)?;
        let decoder = session(model_dir.join("decoder.onnx"))?;

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| Error::model_load(KEY_TRANSLATION, format!("tokenizer: {e}")))?;

        let eos_id = tokenizer
            .token_to_id("</s>")
            .ok_or_else(|| Error::model_load(KEY_TRANSLATION, "no </s> token".to_string()))?
            as i64;

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
            tokenizer,
            eos_id,
        })
    }

    /// Bridge-vocabulary token id for a language code, if the tokenizer
    /// knows it.
    fn language_id(&self, code: &str) -> Option<i64> {
        self.tokenizer.token_to_id(code).map(|id| id as i64)
    }

    /// Translate between two bridge codes with greedy decoding.
    pub fn translate(
        &self,
        text: &str,
        src_code: &str,
        tgt_code: &str,
        max_tokens: usize,
    ) -> Result<String> {
        let src_id = self
            .language_id(src_code)
            .ok_or_else(|| Error::Translation(format!("unknown source code {src_code}")))?;
        let tgt_id = self
            .language_id(tgt_code)
            .ok_or_else(|| Error::Translation(format!("unknown target code {tgt_code}")))?;

        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| Error::Translation(format!("tokenization failed: {e}")))?;

        // Source sentence is framed with its language token and EOS.
        let mut input_ids: Vec<i64> = vec![src_id];
        input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
        input_ids.push(self.eos_id);
        let seq_len = input_ids.len();

        let input_array = ndarray::Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| Error::Translation(format!("input array: {e}")))?;
        let input_tensor = Tensor::from_array(input_array)
            .map_err(|e| Error::Translation(format!("input tensor: {e}")))?;

        let mut encoder = self.encoder.lock();
        let encoder_outputs = encoder
            .run(ort::inputs!["input_ids" => input_tensor])
            .map_err(|e| Error::Translation(format!("encoder inference failed: {e}")))?;

        let (hidden_shape, hidden_data) = encoder_outputs
            .get("last_hidden_state")
            .ok_or_else(|| Error::Translation("missing encoder output".to_string()))?
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Translation(format!("extract encoder output: {e}")))?;

        let hidden_dims: Vec<usize> = hidden_shape.iter().map(|&d| d as usize).collect();
        if hidden_dims.len() != 3 {
            return Err(Error::Translation(format!(
                "unexpected encoder shape: {hidden_dims:?}"
            )));
        }
        let hidden_array = ndarray::Array3::from_shape_vec(
            (hidden_dims[0], hidden_dims[1], hidden_dims[2]),
            hidden_data.to_vec(),
        )
        .map_err(|e| Error::Translation(format!("encoder array: {e}")))?;

        // Decoder opens with EOS then the forced target-language token.
        let mut output_ids: Vec<i64> = vec![self.eos_id, tgt_id];

        for _ in 0..max_tokens {
            let decoder_input = ndarray::Array2::from_shape_vec(
                (1, output_ids.len()),
                output_ids.clone(),
            )
            .map_err(|e| Error::Translation(format!("decoder input: {e}")))?;

            let decoder_input_tensor = Tensor::from_array(decoder_input)
                .map_err(|e| Error::Translation(format!("decoder tensor: {e}")))?;
            let hidden_tensor = Tensor::from_array(hidden_array.clone())
                .map_err(|e| Error::Translation(format!("hidden tensor: {e}")))?;

            let mut decoder = self.decoder.lock();
            let decoder_outputs = decoder
                .run(ort::inputs![
                    "input_ids" => decoder_input_tensor,
                    "encoder_hidden_states" => hidden_tensor,
                ])
                .map_err(|e| Error::Translation(format!("decoder inference failed: {e}")))?;

            let (logits_shape, logits_data) = decoder_outputs
                .get("logits")
                .ok_or_else(|| Error::Translation("missing decoder logits".to_string()))?
                .try_extract_tensor::<f32>()
                .map_err(|e| Error::Translation(format!("extract logits: {e}")))?;

            let logits_dims: Vec<usize> = logits_shape.iter().map(|&d| d as usize).collect();
            if logits_dims.len() != 3 || logits_dims[1] == 0 {
                return Err(Error::Translation(format!(
                    "unexpected logits shape: {logits_dims:?}"
                )));
            }
            let vocab_size = logits_dims[2];
            let start = (logits_dims[1] - 1) * vocab_size;
            let last_logits = &logits_data[start..start + vocab_size];

            let next = last_logits
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(idx, _)| idx as i64)
                .unwrap_or(self.eos_id);

            if next == self.eos_id {
                break;
            }
            output_ids.push(next);
        }

        // Strip the priming tokens before detokenizing.
        let text_tokens: Vec<u32> = output_ids[2..].iter().map(|&id| id as u32).collect();
        let translation = self
            .tokenizer
            .decode(&text_tokens, true)
            .map_err(|e| Error::Translation(format!("detokenization failed: {e}")))?;

        Ok(translation.trim().to_string())
    }
}

/// Text translation over the cached seq2seq model
pub struct TranslationStage {
    cache: Arc<ModelCache>,
    model_dir: PathBuf,
    max_tokens: usize,
}

impl TranslationStage {
    pub fn new(cache: Arc<ModelCache>, model_dir: PathBuf, max_tokens: usize) -> Self {
        Self {
            cache,
            model_dir,
            max_tokens,
        }
    }

    /// Translate `text` from `src_tag` to `tgt_tag`.
    ///
    /// Identity requests and empty text pass through before any model
    /// work. Tags outside the bridge vocabulary also pass through, with
    /// a warning. Model load failures propagate; inference failures
    /// degrade to the original text with a failure marker appended.
    pub async fn translate(&self, text: &str, src_tag: &str, tgt_tag: &str) -> Result<String> {
        if text.is_empty() || src_tag.eq_ignore_ascii_case(tgt_tag) {
            return Ok(text.to_string());
        }

        let (src_code, tgt_code) = match (bridge_code(src_tag), bridge_code(tgt_tag)) {
            (Some(s), Some(t)) => (s, t),
            _ => {
                tracing::warn!(
                    src = src_tag,
                    tgt = tgt_tag,
                    "Language pair outside bridge vocabulary, passing text through"
                );
                return Ok(text.to_string());
            }
        };

        let dir = self.model_dir.clone();
        let model = self
            .cache
            .load::<TranslationModel, _>(KEY_TRANSLATION, move || {
                tracing::info!(dir = %dir.display(), "Constructing translation model");
                TranslationModel::new(&dir)
            })
            .await?;

        let started = std::time::Instant::now();
        let owned_text = text.to_string();
        let max_tokens = self.max_tokens;
        let result = tokio::task::spawn_blocking(move || {
            model.translate(&owned_text, src_code, tgt_code, max_tokens)
        })
        .await
        .map_err(|e| Error::Translation(format!("translation task failed: {e}")))?;

        match result {
            Ok(translation) => {
                tracing::info!(
                    src = src_tag,
                    tgt = tgt_tag,
                    mt_ms = started.elapsed().as_millis() as u64,
                    chars = translation.len(),
                    "Translation complete"
                );
                Ok(translation)
            }
            Err(e) => {
                tracing::error!(src = src_tag, tgt = tgt_tag, error = %e, "Translation failed");
                Ok(format!("{text} (translation failed)"))
            }
        }
    }
}
