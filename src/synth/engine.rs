//! Synthesis adapter trait and its error type.
//!
//! # Overview
//!
//! [`SynthesisAdapter`] is the only thing the pipeline knows about speech
//! engines: `(voice_id, text, speed) → PcmBuffer`.  It is object-safe and
//! `Send + Sync` so it can be held behind an `Arc<dyn SynthesisAdapter>`.
//!
//! [`PiperEngine`](super::PiperEngine) is the production implementation.
//! [`MockSynth`] (available under `#[cfg(test)]`) renders a tone whose length
//! follows the text, so pipeline tests run without a model on disk.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::PcmBuffer;

// ---------------------------------------------------------------------------
// SynthError
// ---------------------------------------------------------------------------

/// Every way a single synthesis call can fail.  All of them are terminal for
/// the render; nothing is retried.
#[derive(Debug, Clone, Error)]
pub enum SynthError {
    /// No model files exist for the requested voice.
    #[error("voice not found: {0}")]
    VoiceNotFound(String),

    /// The engine ran but reported failure.
    #[error("engine failed: {0}")]
    EngineFailed(String),

    /// The call did not finish within the configured timeout.
    #[error("synthesis timed out after {0}s")]
    Timeout(u64),

    /// Spawning the engine or talking to it failed.
    #[error("engine I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for SynthError {
    fn from(e: std::io::Error) -> Self {
        SynthError::Io(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// SynthesisAdapter trait
// ---------------------------------------------------------------------------

/// Turns one utterance into PCM.
///
/// # Contract
///
/// - `speed` is already clamped to `[0.5, 2.0]` by the caller.
/// - The returned buffer carries the engine's native sample rate; it may be
///   stereo, the pipeline folds it to mono.
#[async_trait]
pub trait SynthesisAdapter: Send + Sync {
    /// Short engine name for logs and sidecars.
    fn name(&self) -> &'static str;

    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        speed: f64,
    ) -> Result<PcmBuffer, SynthError>;
}

// Compile-time assertion: Box<dyn SynthesisAdapter> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn SynthesisAdapter>) {}
};

// ---------------------------------------------------------------------------
// MockSynth  (test-only)
// ---------------------------------------------------------------------------

/// Test double: renders `text.len() × 10 ms` of a 220 Hz tone at 0.2 peak.
#[cfg(test)]
pub struct MockSynth {
    sample_rate: u32,
    voice_rates: std::collections::HashMap<String, u32>,
    fail_voice: Option<String>,
    delay: Option<std::time::Duration>,
    calls: std::sync::Mutex<Vec<(String, String, f64)>>,
}

#[cfg(test)]
impl MockSynth {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            voice_rates: Default::default(),
            fail_voice: None,
            delay: None,
            calls: Default::default(),
        }
    }

    /// Render `voice` at a different rate.
    pub fn with_voice_rate(mut self, voice: &str, rate: u32) -> Self {
        self.voice_rates.insert(voice.to_string(), rate);
        self
    }

    /// Fail every call for `voice` with `VoiceNotFound`.
    pub fn failing_on(mut self, voice: &str) -> Self {
        self.fail_voice = Some(voice.to_string());
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `(voice, text, speed)` of every call so far.
    pub fn calls(&self) -> Vec<(String, String, f64)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl SynthesisAdapter for MockSynth {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn synthesize(
        &self,
        voice_id: &str,
        text: &str,
        speed: f64,
    ) -> Result<PcmBuffer, SynthError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((voice_id.to_string(), text.to_string(), speed));
        }
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_voice.as_deref() == Some(voice_id) {
            return Err(SynthError::VoiceNotFound(voice_id.to_string()));
        }
        let sr = self.voice_rates.get(voice_id).copied().unwrap_or(self.sample_rate);
        let n = text.chars().count() * sr as usize / 100;
        let samples = (0..n)
            .map(|i| 0.2 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect();
        Ok(PcmBuffer::mono(samples, sr))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_length_follows_text() {
        let synth = MockSynth::new(16_000);
        let buf = synth.synthesize("v", "hello", 1.0).await.unwrap();
        assert_eq!(buf.samples.len(), 800);
        assert_eq!(buf.sample_rate, 16_000);
        assert_eq!(synth.calls(), vec![("v".into(), "hello".into(), 1.0)]);
    }

    #[tokio::test]
    async fn mock_per_voice_rate_and_failure() {
        let synth = MockSynth::new(22_050)
            .with_voice_rate("slow", 16_000)
            .failing_on("broken");
        assert_eq!(synth.synthesize("slow", "a", 1.0).await.unwrap().sample_rate, 16_000);
        assert!(matches!(
            synth.synthesize("broken", "a", 1.0).await,
            Err(SynthError::VoiceNotFound(_))
        ));
    }

    #[test]
    fn box_dyn_adapter_compiles() {
        let _adapter: Box<dyn SynthesisAdapter> = Box::new(MockSynth::new(8_000));
    }

    #[test]
    fn error_display_carries_context() {
        assert!(SynthError::VoiceNotFound("en_US-amy".into())
            .to_string()
            .contains("en_US-amy"));
        assert!(SynthError::Timeout(60).to_string().contains("60s"));
        let io: SynthError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(io, SynthError::Io(_)));
    }
}
