//! Background beds: loop, shape, duck under the voice, and overlay.
//!
//! # Example
//!
//! ```rust
//! use voice_render::audio::PcmBuffer;
//! use voice_render::background::{mix_background, BackgroundConfig, BedSource};
//!
//! let voice = PcmBuffer::mono(vec![0.1; 16_000], 16_000);
//! let cfg = BackgroundConfig::new(BedSource::Kind("none".into()));
//! let out = mix_background(voice.clone(), &cfg, std::path::Path::new("fx"), &Default::default());
//! assert_eq!(out.samples.len(), voice.samples.len());
//! ```

pub mod bed;
pub mod ducking;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio::buffer::PcmBuffer;

pub use bed::{fit_bed, gain_to_db, load_bed, shape_bed, BedSource, AMBIENCE_KINDS};
pub use ducking::{activity_envelope, duck, ducking_gain, DuckingConfig};

/// Per-render background request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundConfig {
    pub source: BedSource,
    /// Linear bed gain; `None` leaves the bed at file level.
    #[serde(default)]
    pub gain: Option<f64>,
    #[serde(default)]
    pub fade_in_ms: u32,
    #[serde(default)]
    pub fade_out_ms: u32,
    #[serde(default)]
    pub ducking: Option<DuckingChoice>,
}

/// `true` ducks with the configured defaults, an object ducks with its own
/// parameters (missing fields take the built-in defaults).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DuckingChoice {
    Enabled(bool),
    Custom(DuckingConfig),
}

impl DuckingChoice {
    /// The parameters to duck with, or `None` when ducking is off.
    pub fn resolve(&self, defaults: &DuckingConfig) -> Option<DuckingConfig> {
        match self {
            DuckingChoice::Enabled(true) => Some(*defaults),
            DuckingChoice::Enabled(false) => None,
            DuckingChoice::Custom(cfg) => Some(*cfg),
        }
    }
}

impl BackgroundConfig {
    pub fn new(source: BedSource) -> Self {
        Self {
            source,
            gain: None,
            fade_in_ms: 0,
            fade_out_ms: 0,
            ducking: None,
        }
    }
}

/// Sum `bed` into `voice` sample-wise, clipped to `[-1, 1]`.
pub fn overlay(voice: &mut [f32], bed: &[f32]) {
    for (v, b) in voice.iter_mut().zip(bed) {
        let s = *v + *b;
        *v = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
    }
}

/// Mix the configured bed under `voice`.  The output keeps the voice's
/// length and rate and is always mono.  `ducking_defaults` applies when the
/// request enables ducking without parameters.
pub fn mix_background(
    voice: PcmBuffer,
    cfg: &BackgroundConfig,
    fx_dir: &Path,
    ducking_defaults: &DuckingConfig,
) -> PcmBuffer {
    let mut voice = voice.into_mono();
    if voice.is_empty() {
        return voice;
    }
    let sr = voice.sample_rate;
    let raw = load_bed(&cfg.source, fx_dir);
    let mut bed = fit_bed(&raw, sr, voice.samples.len());

    let gain_db = cfg.gain.map(gain_to_db).unwrap_or(0.0);
    shape_bed(&mut bed, sr, gain_db, cfg.fade_in_ms, cfg.fade_out_ms);

    let ducking = cfg.ducking.as_ref().and_then(|d| d.resolve(ducking_defaults));
    if let Some(ducking) = &ducking {
        duck(&mut bed, &voice.samples, sr, ducking);
    }

    log::debug!(
        "background: mixed {:?} (gain {gain_db:.1} dB, ducking {})",
        cfg.source,
        if ducking.is_some() { "on" } else { "off" }
    );
    overlay(&mut voice.samples, &bed);
    voice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::rms;
    use crate::audio::wav::write_wav_pcm16;

    fn bed_dir(level: f32, sr: u32) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_wav_pcm16(
            &dir.path().join("rain.wav"),
            &PcmBuffer::mono(vec![level; sr as usize / 2], sr),
        )
        .unwrap();
        dir
    }

    #[test]
    fn overlay_clips() {
        let mut v = vec![0.8, -0.8, 0.1];
        overlay(&mut v, &[0.5, -0.5, f32::NAN]);
        assert_eq!(v, vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn missing_bed_leaves_voice_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let voice = PcmBuffer::mono(vec![0.2; 8_000], 8_000);
        let out = mix_background(
            voice.clone(),
            &BackgroundConfig::new(BedSource::Kind("forest".into())),
            dir.path(),
            &DuckingConfig::default(),
        );
        assert_eq!(out, voice);
    }

    #[test]
    fn bed_is_looped_under_whole_voice() {
        let dir = bed_dir(0.1, 8_000);
        let voice = PcmBuffer::mono(vec![0.0; 24_000], 8_000);
        let out = mix_background(
            voice,
            &BackgroundConfig::new(BedSource::Kind("rain".into())),
            dir.path(),
            &DuckingConfig::default(),
        );
        assert_eq!(out.samples.len(), 24_000);
        assert!((out.samples[23_999] - 0.1).abs() < 1e-3);
    }

    #[test]
    fn zero_gain_mutes_bed() {
        let dir = bed_dir(0.3, 8_000);
        let voice = PcmBuffer::mono(vec![0.0; 8_000], 8_000);
        let cfg = BackgroundConfig {
            gain: Some(0.0),
            ..BackgroundConfig::new(BedSource::Kind("rain".into()))
        };
        let out = mix_background(voice, &cfg, dir.path(), &DuckingConfig::default());
        assert!(out.peak() < 1e-5);
    }

    #[test]
    fn ducked_bed_is_quieter_under_speech() {
        let sr = 8_000;
        let dir = bed_dir(0.1, sr);
        let n = sr as usize;
        let mut voice = vec![0.0_f32; 3 * n];
        for (i, s) in voice.iter_mut().enumerate().skip(n).take(n) {
            *s = 0.3 * (2.0 * std::f32::consts::PI * 250.0 * i as f32 / sr as f32).sin();
        }

        let source = BedSource::Kind("rain".into());
        let plain = mix_background(
            PcmBuffer::mono(voice.clone(), sr),
            &BackgroundConfig::new(source.clone()),
            dir.path(),
            &DuckingConfig::default(),
        );
        let ducked = mix_background(
            PcmBuffer::mono(voice.clone(), sr),
            &BackgroundConfig {
                ducking: Some(DuckingChoice::Enabled(true)),
                ..BackgroundConfig::new(source)
            },
            dir.path(),
            &DuckingConfig::default(),
        );

        // Subtract the voice to isolate the bed.
        let bed_of = |mixed: &PcmBuffer| -> Vec<f32> {
            mixed.samples[n + n / 4..2 * n - n / 4]
                .iter()
                .zip(&voice[n + n / 4..2 * n - n / 4])
                .map(|(m, v)| m - v)
                .collect()
        };
        assert!(rms(&bed_of(&ducked)) < 0.5 * rms(&bed_of(&plain)));
    }

    #[test]
    fn config_deserializes_from_json() {
        let cfg: BackgroundConfig = serde_json::from_str(
            r#"{"source":{"kind":"cafe"},"gain":0.3,"ducking":{"reductionDb":12}}"#,
        )
        .unwrap();
        assert_eq!(cfg.source, BedSource::Kind("cafe".into()));
        assert_eq!(cfg.gain, Some(0.3));
        let d = cfg.ducking.unwrap().resolve(&DuckingConfig::default()).unwrap();
        assert_eq!(d.reduction_db, 12.0);
        assert_eq!(d.release_ms, 180);
    }

    #[test]
    fn boolean_ducking_uses_defaults() {
        let cfg: BackgroundConfig =
            serde_json::from_str(r#"{"source":{"path":"/tmp/bed.wav"},"ducking":true}"#).unwrap();
        let defaults = DuckingConfig {
            reduction_db: 6.0,
            ..Default::default()
        };
        assert_eq!(cfg.ducking.unwrap().resolve(&defaults), Some(defaults));
        assert_eq!(DuckingChoice::Enabled(false).resolve(&defaults), None);
    }
}
