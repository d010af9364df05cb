//! Piper CLI engine.
//!
//! Each call spawns one `piper` process:
//!
//! ```text
//! piper --model <voice>.onnx --length_scale <1/speed> --output_raw
//!   stdin  ← utterance text (UTF-8)
//!   stdout → raw little-endian PCM16 mono at the model's sample rate
//! ```
//!
//! The child is spawned with `kill_on_drop`, so dropping the future (job
//! cancellation or an outer timeout) terminates the process.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::engine::{SynthError, SynthesisAdapter};
use super::model::VoiceModel;
use crate::audio::PcmBuffer;
use crate::config::{AppConfig, AppPaths};
use crate::text::clamp_speed;

/// Longest stderr excerpt carried in an error message.
const STDERR_EXCERPT: usize = 400;

/// Subprocess adapter for the Piper neural TTS engine.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    bin: PathBuf,
    models_dir: PathBuf,
}

impl PiperEngine {
    pub fn new(bin: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            models_dir: models_dir.into(),
        }
    }

    /// Binary and models directory from settings.
    pub fn from_config(config: &AppConfig, paths: &AppPaths) -> Self {
        Self::new(&config.synth.piper_bin, config.models_dir(paths))
    }

    pub fn models_dir(&self) -> &std::path::Path {
        &self.models_dir
    }

    pub fn bin(&self) -> &std::path::Path {
        &self.bin
    }
}

/// `1 / speed`, with speed clamped first and the result kept in `[0.5, 2.0]`.
pub fn length_scale(speed: f64) -> f64 {
    (1.0 / clamp_speed(speed)).clamp(0.5, 2.0)
}

/// Decode little-endian PCM16.  A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0)
        .collect()
}

fn excerpt(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().nth(STDERR_EXCERPT) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[async_trait]
impl SynthesisAdapter for PiperEngine {
    fn name(&self) -> &'static str {
        "piper"
    }

    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        speed: f64,
    ) -> Result<PcmBuffer, SynthError> {
        let model = VoiceModel::resolve(&self.models_dir, voice_id)?;
        let scale = length_scale(speed);
        log::debug!(
            "piper: {} chars with {} (length_scale {scale:.3})",
            text.chars().count(),
            model.voice_id
        );

        let mut child = Command::new(&self.bin)
            .arg("--model")
            .arg(&model.onnx_path)
            .arg("--length_scale")
            .arg(format!("{scale:.3}"))
            .arg("--output_raw")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SynthError::EngineFailed(format!(
                        "piper binary not found: {}",
                        self.bin.display()
                    ))
                } else {
                    SynthError::from(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            // Dropping stdin closes the pipe so piper sees EOF.
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(SynthError::EngineFailed(format!(
                "piper exited with {}: {}",
                output.status,
                excerpt(&output.stderr)
            )));
        }

        let samples = decode_pcm16_le(&output.stdout);
        if samples.is_empty() {
            return Err(SynthError::EngineFailed(format!(
                "piper produced no audio for {}",
                model.voice_id
            )));
        }
        Ok(PcmBuffer::mono(samples, model.sample_rate))
    }
}
