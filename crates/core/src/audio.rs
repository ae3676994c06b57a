//! Waveform type and WAV helpers
//!
//! All pipeline stages exchange audio as 16 kHz mono f32 samples. An
//! empty waveform is the uniform "no usable audio" signal, not an error.

use std::time::Duration;

use crate::{Error, Result};

/// Mono floating-point waveform at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// The explicit "no speech / no usable audio" value
    pub fn empty(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Decode PCM16 little-endian bytes into a waveform
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / 32768.0
            })
            .collect();
        Self::new(samples, sample_rate)
    }

    /// Encode as a 16-bit PCM mono WAV blob
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| Error::Audio(format!("WAV writer init failed: {e}")))?;
            for &sample in &self.samples {
                let clamped = sample.clamp(-1.0, 1.0);
                writer
                    .write_sample((clamped * 32767.0) as i16)
                    .map_err(|e| Error::Audio(format!("WAV write failed: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| Error::Audio(format!("WAV finalize failed: {e}")))?;
        }
        Ok(cursor.into_inner())
    }
}
