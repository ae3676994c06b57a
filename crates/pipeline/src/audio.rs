//! Audio normalization
//!
//! Converts arbitrary uploaded audio bytes into a 16 kHz mono f32
//! waveform. WAV containers are decoded in-process; anything else goes
//! through an ffmpeg subprocess with bounded retries. Every failure
//! path collapses to the one uniform signal callers handle: an empty
//! waveform.

use std::io::Write;
use std::time::Duration;

use tokio::process::Command;

use vaani_config::AudioConfig;
use vaani_core::{Error, Result, Waveform};

/// Decodes and resamples uploaded audio into pipeline waveforms
pub struct AudioNormalizer {
    config: AudioConfig,
}

impl AudioNormalizer {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Normalize raw audio bytes to a mono waveform at the target rate.
    ///
    /// Undersized inputs are rejected before any decode attempt.
    /// Transient decode failures are retried with backoff; exhausted
    /// retries surface as an empty waveform, never an error.
    pub async fn normalize(&self, raw: &[u8]) -> Waveform {
        let rate = self.config.sample_rate;

        if raw.len() < self.config.min_audio_bytes {
            tracing::warn!(
                bytes = raw.len(),
                min_bytes = self.config.min_audio_bytes,
                "Rejecting undersized audio input"
            );
            return Waveform::empty(rate);
        }

        if is_wav(raw) {
            // Decode and resample are CPU-bound; keep them off the
            // request thread like the ffmpeg path.
            let bytes = raw.to_vec();
            return match tokio::task::spawn_blocking(move || decode_wav(&bytes, rate)).await {
                Ok(Ok(wave)) => wave,
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "WAV decode failed");
                    Waveform::empty(rate)
                }
                Err(e) => {
                    tracing::error!(error = %e, "WAV decode task failed");
                    Waveform::empty(rate)
                }
            };
        }

        let mut attempt = 0;
        loop {
            match self.decode_with_ffmpeg(raw).await {
                Ok(wave) => {
                    if wave.is_empty() {
                        tracing::warn!("Decoded audio contained zero samples");
                    }
                    return wave;
                }
                Err(e) if attempt < self.config.decode_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        retries = self.config.decode_retries,
                        error = %e,
                        "Audio decode failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(self.config.decode_backoff_ms)).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Audio decode failed, giving up");
                    return Waveform::empty(rate);
                }
            }
        }
    }

    /// Decode a compressed container via ffmpeg to raw PCM16.
    ///
    /// Scratch files are `NamedTempFile`s; dropping them removes the
    /// files on every exit path, including errors.
    async fn decode_with_ffmpeg(&self, raw: &[u8]) -> Result<Waveform> {
        let rate = self.config.sample_rate;

        let mut input = tempfile::Builder::new()
            .prefix("vaani_in_")
            .tempfile()
            .map_err(|e| Error::Audio(format!("failed to create scratch file: {e}")))?;
        input
            .write_all(raw)
            .map_err(|e| Error::Audio(format!("failed to write scratch file: {e}")))?;

        let output = tempfile::Builder::new()
            .prefix("vaani_out_")
            .suffix(".raw")
            .tempfile()
            .map_err(|e| Error::Audio(format!("failed to create scratch file: {e}")))?;

        let status = Command::new("ffmpeg")
            .args([
                "-y",
                "-loglevel",
                "error",
                "-i",
                &input.path().to_string_lossy(),
                "-ar",
                &rate.to_string(),
                "-ac",
                "1",
                "-f",
                "s16le",
                "-acodec",
                "pcm_s16le",
                &output.path().to_string_lossy(),
            ])
            .output()
            .await
            .map_err(|e| Error::Audio(format!("ffmpeg spawn failed: {e}")))?;

        if !status.status.success() {
            let stderr = String::from_utf8_lossy(&status.stderr);
            return Err(Error::Audio(format!(
                "ffmpeg conversion failed: {}",
                stderr.trim()
            )));
        }

        let pcm_bytes = tokio::fs::read(output.path())
            .await
            .map_err(|e| Error::Audio(format!("failed to read decoded audio: {e}")))?;

        Ok(Waveform::from_pcm16(&pcm_bytes, rate))
    }
}

fn is_wav(raw: &[u8]) -> bool {
    raw.len() >= 12 && &raw[..4] == b"RIFF" && &raw[8..12] == b"WAVE"
}

/// Decode a WAV container in-process and downmix/resample to the target.
fn decode_wav(raw: &[u8], target_rate: u32) -> Result<Waveform> {
    let reader = hound::WavReader::new(std::io::Cursor::new(raw))
        .map_err(|e| Error::Audio(format!("invalid WAV: {e}")))?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Audio(format!("WAV read failed: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Audio(format!("WAV read failed: {e}")))?
        }
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks_exact(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        samples
    };

    if spec.sample_rate == target_rate {
        return Ok(Waveform::new(mono, target_rate));
    }
    Ok(resample(&mono, spec.sample_rate, target_rate))
}

/// Resample with rubato's FFT resampler, linear interpolation for
/// frames too short for it.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Waveform {
    use rubato::{FftFixedIn, Resampler};

    if samples.len() < 64 {
        return resample_linear(samples, from_rate, to_rate);
    }

    let chunk_size = samples.len().min(1024);
    let samples_f64: Vec<f64> = samples.iter().map(|&s| s as f64).collect();

    match FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, 2, 1) {
        Ok(mut resampler) => {
            let mut out = Vec::new();
            for chunk in samples_f64.chunks(chunk_size) {
                let frame = if chunk.len() == chunk_size {
                    chunk.to_vec()
                } else {
                    let mut padded = chunk.to_vec();
                    padded.resize(chunk_size, 0.0);
                    padded
                };
                match resampler.process(&[frame], None) {
                    Ok(frames) => out.extend(frames[0].iter().map(|&s| s as f32)),
                    Err(e) => {
                        tracing::warn!("Resampler failed mid-stream, using linear fallback: {e}");
                        return resample_linear(samples, from_rate, to_rate);
                    }
                }
            }
            Waveform::new(out, to_rate)
        }
        Err(e) => {
            tracing::warn!("Resampler init failed, using linear fallback: {e}");
            resample_linear(samples, from_rate, to_rate)
        }
    }
}

fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Waveform {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src_idx = i as f64 / ratio;
        let idx_floor = src_idx.floor() as usize;
        let idx_ceil = (idx_floor + 1).min(samples.len().saturating_sub(1));
        let frac = (src_idx - idx_floor as f64) as f32;

        let sample = samples[idx_floor] * (1.0 - frac) + samples[idx_ceil] * frac;
        resampled.push(sample);
    }

    Waveform::new(resampled, to_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> AudioNormalizer {
        AudioNormalizer::new(AudioConfig::default())
    }

    fn wav_fixture(sample_rate: u32, channels: u16, samples_per_channel: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..samples_per_channel {
                let value = ((i as f32 * 0.05).sin() * 8000.0) as i16;
                for _ in 0..channels {
                    writer.write_sample(value).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_undersized_input_rejected_without_decode() {
        let wave = normalizer().normalize(&[0u8; 10]).await;
        assert!(wave.is_empty());
        assert_eq!(wave.sample_rate(), 16000);
    }

    #[tokio::test]
    async fn test_wav_decode_at_target_rate() {
        let bytes = wav_fixture(16000, 1, 1600);
        let wave = normalizer().normalize(&bytes).await;
        assert_eq!(wave.sample_rate(), 16000);
        assert_eq!(wave.len(), 1600);
    }

    #[tokio::test]
    async fn test_stereo_wav_downmixed_to_mono() {
        let bytes = wav_fixture(16000, 2, 800);
        let wave = normalizer().normalize(&bytes).await;
        assert_eq!(wave.sample_rate(), 16000);
        assert_eq!(wave.len(), 800);
    }

    #[tokio::test]
    async fn test_wav_resampled_to_target_rate() {
        let bytes = wav_fixture(48000, 1, 4800);
        let wave = normalizer().normalize(&bytes).await;
        assert_eq!(wave.sample_rate(), 16000);
        assert!(!wave.is_empty());
        // 100ms of 48kHz audio should land near 1600 samples at 16kHz.
        assert!((wave.len() as i64 - 1600).unsigned_abs() < 200);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_wav_decode_yields_the_request_thread() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let ticked = Arc::new(AtomicBool::new(false));
        let flag = ticked.clone();
        let watcher = tokio::spawn(async move {
            flag.store(true, Ordering::SeqCst);
        });

        // On a single-threaded runtime the watcher can only run if the
        // decode suspends instead of holding the executor thread.
        let bytes = wav_fixture(48000, 2, 48000);
        let wave = normalizer().normalize(&bytes).await;
        assert!(!wave.is_empty());
        assert!(
            ticked.load(Ordering::SeqCst),
            "decode held the executor thread"
        );
        watcher.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_decode_failures_are_retried_with_backoff() {
        let mut config = AudioConfig::default();
        config.decode_retries = 2;
        config.decode_backoff_ms = 30;
        let normalizer = AudioNormalizer::new(config);

        let started = std::time::Instant::now();
        let wave = normalizer.normalize(&vec![0xABu8; 4096]).await;
        assert!(wave.is_empty());
        // Two failed attempts must each back off before the final one
        // gives up.
        assert!(
            started.elapsed() >= Duration::from_millis(60),
            "decode gave up without backing off between retries"
        );
    }

    #[tokio::test]
    async fn test_garbage_input_yields_empty_waveform() {
        let mut config = AudioConfig::default();
        config.decode_retries = 0;
        config.decode_backoff_ms = 1;
        let normalizer = AudioNormalizer::new(config);

        let garbage = vec![0xABu8; 4096];
        let wave = normalizer.normalize(&garbage).await;
        assert!(wave.is_empty());
    }

    #[test]
    fn test_wav_signature_detection() {
        assert!(is_wav(&wav_fixture(16000, 1, 10)));
        assert!(!is_wav(b"\x1aE\xdf\xa3 not a wav container"));
        assert!(!is_wav(b"RIFF"));
    }
}
