//! Whisper recognition backend (candle)
//!
//! General-purpose backend for the default language. Runs a single
//! 30-second window with greedy decoding; chunked streaming input is
//! expected to arrive in utterance-sized pieces well under that bound.

use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use parking_lot::Mutex;
use tokenizers::Tokenizer;

use vaani_core::{Error, Result};

/// Decode budget for one window
const MAX_DECODE_TOKENS: usize = 224;

/// Whisper model plus tokenizer, serialized behind a mutex because the
/// decoder's KV cache makes forward passes stateful.
#[derive(Debug)]
pub struct WhisperBackend {
    inner: Mutex<m::model::Whisper>,
    config: Config,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    device: Device,
    sot_token: u32,
    eot_token: u32,
    transcribe_token: u32,
    no_timestamps_token: u32,
    language_token: u32,
}

impl WhisperBackend {
    pub fn new(model_dir: &Path, device: Device) -> Result<Self> {
        if !model_dir.exists() {
            return Err(Error::model_load(
                super::KEY_DEFAULT,
                format!("model directory not found: {}", model_dir.display()),
            ));
        }

        let config_str = std::fs::read_to_string(model_dir.join("config.json"))
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("config.json: {e}")))?;
        let config: Config = serde_json::from_str(&config_str)
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("config.json: {e}")))?;

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[model_dir.join("model.safetensors")],
                m::DTYPE,
                &device,
            )
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("weights: {e}")))?
        };
        let model = m::model::Whisper::load(&vb, config.clone())
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("model build: {e}")))?;

        let tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("tokenizer: {e}")))?;

        // Mel filterbank blob ships alongside the weights.
        let mel_name = if config.num_mel_bins == 128 {
            "mel_filters_128.bytes"
        } else {
            "mel_filters.bytes"
        };
        let mel_bytes = std::fs::read(model_dir.join(mel_name))
            .map_err(|e| Error::model_load(super::KEY_DEFAULT, format!("{mel_name}: {e}")))?;
        let mut mel_filters = vec![0f32; mel_bytes.len() / 4];
        LittleEndian::read_f32_into(&mel_bytes, &mut mel_filters);

        let token = |name: &str| -> Result<u32> {
            tokenizer
                .token_to_id(name)
                .ok_or_else(|| Error::model_load(super::KEY_DEFAULT, format!("no token {name}")))
        };
        let sot_token = token(m::SOT_TOKEN)?;
        let eot_token = token(m::EOT_TOKEN)?;
        let transcribe_token = token(m::TRANSCRIBE_TOKEN)?;
        let no_timestamps_token = token(m::NO_TIMESTAMPS_TOKEN)?;
        let language_token = token("<|en|>")?;

        tracing::info!(
            mel_bins = config.num_mel_bins,
            "Whisper backend ready"
        );

        Ok(Self {
            inner: Mutex::new(model),
            config,
            tokenizer,
            mel_filters,
            device,
            sot_token,
            eot_token,
            transcribe_token,
            no_timestamps_token,
            language_token,
        })
    }

    /// Greedy transcription of one padded 30s window.
    pub fn transcribe(&self, samples: &[f32]) -> Result<String> {
        if samples.is_empty() {
            return Ok(String::new());
        }

        // Pad or truncate to the model's fixed window.
        let mut window = samples.to_vec();
        window.resize(m::N_SAMPLES, 0.0);

        let mel = audio::pcm_to_mel(&self.config, &window, &self.mel_filters);
        let mel_len = mel.len();
        let n_mels = self.config.num_mel_bins;
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)
            .map_err(|e| Error::Recognition(format!("mel tensor: {e}")))?;

        let mut model = self.inner.lock();
        model.reset_kv_cache();

        let features = model
            .encoder
            .forward(&mel, true)
            .map_err(|e| Error::Recognition(format!("encoder: {e}")))?;

        let mut tokens = vec![
            self.sot_token,
            self.language_token,
            self.transcribe_token,
            self.no_timestamps_token,
        ];

        for step in 0..MAX_DECODE_TOKENS {
            let input = Tensor::new(tokens.as_slice(), &self.device)
                .and_then(|t| t.unsqueeze(0))
                .map_err(|e| Error::Recognition(format!("decoder input: {e}")))?;

            let ys = model
                .decoder
                .forward(&input, &features, step == 0)
                .map_err(|e| Error::Recognition(format!("decoder: {e}")))?;

            let (_, seq_len, _) = ys
                .dims3()
                .map_err(|e| Error::Recognition(format!("decoder output: {e}")))?;
            let logits = model
                .decoder
                .final_linear(
                    &ys.i((..1, seq_len - 1..))
                        .map_err(|e| Error::Recognition(format!("logits slice: {e}")))?,
                )
                .and_then(|t| t.i(0)?.i(0))
                .map_err(|e| Error::Recognition(format!("final linear: {e}")))?;

            let next = logits
                .argmax(0)
                .and_then(|t| t.to_scalar::<u32>())
                .map_err(|e| Error::Recognition(format!("argmax: {e}")))?;

            if next == self.eot_token {
                break;
            }
            tokens.push(next);
        }

        let text_tokens: Vec<u32> = tokens
            .iter()
            .copied()
            .filter(|&t| t < self.sot_token.min(self.eot_token))
            .collect();
        let text = self
            .tokenizer
            .decode(&text_tokens, true)
            .map_err(|e| Error::Recognition(format!("token decode: {e}")))?;

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_dir_is_load_error() {
        let err = WhisperBackend::new(Path::new("/nonexistent/whisper"), Device::Cpu).unwrap_err();
        match err {
            Error::ModelLoad { key, .. } => assert_eq!(key, super::super::KEY_DEFAULT),
            other => panic!("expected ModelLoad, got {other:?}"),
        }
    }
}
