//! Sidechain ducking: lower the bed while the voice is active.
//!
//! ```text
//! voice ─▶ 10 ms centred RMS ─▶ ≥ threshold? ─▶ activity (0/1)
//!   activity ─one-pole(attack)──────────────▶ env_att
//!   reverse(env_att) ─one-pole(release)─▶ reverse ─▶ env_rel
//!   env = max(env_att, env_rel)
//!   gain = (1 − env) + env · 10^(−|reduction|/20)
//! ```
//!
//! Smoothing the release on the reversed attack curve lets the bed start
//! dipping slightly *before* speech resumes and recover smoothly after it.

use serde::{Deserialize, Serialize};

use crate::audio::buffer::{db_to_linear, ms_to_samples};

const DETECTOR_MS: u32 = 10;

/// Ducking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuckingConfig {
    /// Attenuation applied while the voice is active (sign ignored).
    pub reduction_db: f64,
    /// Voice RMS (dBFS) above which the voice counts as active.
    pub threshold_dbfs: f64,
    pub attack_ms: u32,
    pub release_ms: u32,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            reduction_db: 9.0,
            threshold_dbfs: -35.0,
            attack_ms: 40,
            release_ms: 180,
        }
    }
}

/// Centred moving RMS over `win` samples (zero-padded at the edges).
fn centred_rms(x: &[f32], win: usize) -> Vec<f32> {
    let n = x.len();
    let half = win / 2;
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0_f64);
    for &s in x {
        let v = if s.is_finite() { s as f64 } else { 0.0 };
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v * v);
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + win - half).min(n);
            ((prefix[hi] - prefix[lo]) / win as f64).sqrt() as f32
        })
        .collect()
}

/// First-order low-pass with `coef = exp(-1 / max(1, ms·sr/1000))`.
/// The output starts at zero.
fn one_pole(x: &[f32], ms: u32, sample_rate: u32) -> Vec<f32> {
    let n = (ms_to_samples(ms, sample_rate)).max(1) as f64;
    let coef = (-1.0 / n).exp() as f32;
    let mut y = vec![0.0_f32; x.len()];
    for i in 1..x.len() {
        y[i] = coef * y[i - 1] + (1.0 - coef) * x[i];
    }
    y
}

/// Smoothed voice-activity envelope in `[0, 1]`.
pub fn activity_envelope(voice: &[f32], sample_rate: u32, cfg: &DuckingConfig) -> Vec<f32> {
    let win = ms_to_samples(DETECTOR_MS, sample_rate).max(1);
    let threshold = db_to_linear(cfg.threshold_dbfs) as f32;
    let active: Vec<f32> = centred_rms(voice, win)
        .into_iter()
        .map(|r| if r >= threshold { 1.0 } else { 0.0 })
        .collect();

    let attack = one_pole(&active, cfg.attack_ms, sample_rate);
    let reversed: Vec<f32> = attack.iter().rev().copied().collect();
    let mut release = one_pole(&reversed, cfg.release_ms, sample_rate);
    release.reverse();

    attack
        .into_iter()
        .zip(release)
        .map(|(a, r)| a.max(r))
        .collect()
}

/// Per-sample gain to apply to the bed.
pub fn ducking_gain(voice: &[f32], sample_rate: u32, cfg: &DuckingConfig) -> Vec<f32> {
    let floor = db_to_linear(-cfg.reduction_db.abs()) as f32;
    activity_envelope(voice, sample_rate, cfg)
        .into_iter()
        .map(|env| (1.0 - env) + env * floor)
        .collect()
}

/// Duck `bed` in place against `voice`.  Only the overlapping prefix is
/// touched.
pub fn duck(bed: &mut [f32], voice: &[f32], sample_rate: u32, cfg: &DuckingConfig) {
    let n = bed.len().min(voice.len());
    let gain = ducking_gain(&voice[..n], sample_rate, cfg);
    for (s, g) in bed[..n].iter_mut().zip(gain) {
        *s *= g;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::rms;

    /// 1 s silence, 1 s tone, 1 s silence.
    fn gated_voice(sr: u32) -> Vec<f32> {
        let n = sr as usize;
        let mut v = vec![0.0_f32; 3 * n];
        for (i, s) in v.iter_mut().enumerate().skip(n).take(n) {
            *s = 0.3 * (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sr as f32).sin();
        }
        v
    }

    #[test]
    fn ducking_lowers_bed_during_voice() {
        let sr = 16_000;
        let n = sr as usize;
        let voice = gated_voice(sr);
        let mut bed = vec![0.2_f32; voice.len()];
        duck(&mut bed, &voice, sr, &DuckingConfig::default());

        let during = rms(&bed[n + n / 4..2 * n - n / 4]);
        let before = rms(&bed[..n / 2]);
        assert!(during < 0.5 * before, "during {during}, before {before}");
        // 9 dB ≈ ×0.355
        assert!((during - 0.2 * 0.355).abs() < 0.01);
        // fully recovered well after the voice stops
        assert!((bed[3 * n - 1] - 0.2).abs() < 1e-3);
    }

    #[test]
    fn release_curve_leads_into_speech() {
        let sr = 16_000;
        let n = sr as usize;
        let gain = ducking_gain(&gated_voice(sr), sr, &DuckingConfig::default());
        // 50 ms before the voice starts the bed is already dipping
        assert!(gain[n - 800] < 0.9, "{}", gain[n - 800]);
        assert!(gain[0] > 0.99, "{}", gain[0]);
    }

    #[test]
    fn silent_voice_leaves_bed_alone() {
        let voice = vec![0.0_f32; 8_000];
        let mut bed = vec![0.1_f32; 8_000];
        duck(&mut bed, &voice, 8_000, &DuckingConfig::default());
        assert!(bed.iter().all(|&s| (s - 0.1).abs() < 1e-7));
    }

    #[test]
    fn reduction_sign_is_ignored() {
        let sr = 8_000;
        let voice = gated_voice(sr);
        let pos = ducking_gain(&voice, sr, &DuckingConfig::default());
        let neg = ducking_gain(
            &voice,
            sr,
            &DuckingConfig {
                reduction_db: -9.0,
                ..Default::default()
            },
        );
        assert_eq!(pos, neg);
    }

    #[test]
    fn mismatched_lengths_only_touch_overlap() {
        let mut bed = vec![0.5_f32; 100];
        duck(&mut bed, &[0.9; 10], 8_000, &DuckingConfig::default());
        assert!(bed[10..].iter().all(|&s| s == 0.5));
    }
}
