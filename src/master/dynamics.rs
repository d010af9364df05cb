//! Dynamics stages: soft-knee compressor and hard peak limiter.

use super::preset::CompressorParams;
use crate::audio::buffer::{db_to_linear, linear_to_db, ms_to_samples};

/// Ratios at or below this are treated as "no compression".
pub const BYPASS_RATIO: f64 = 1.05;
/// Width of the soft knee in dB.
pub const KNEE_DB: f64 = 6.0;
/// Window of the moving-RMS level detector.
pub const DETECTOR_MS: u32 = 10;

/// One-pole smoothing coefficient for a time constant of `ms`.
pub fn one_pole_coef(sample_rate: u32, ms: f64) -> f64 {
    let n = sample_rate as f64 * ms / 1000.0;
    if n > 0.0 && n.is_finite() {
        (-1.0 / n).exp()
    } else {
        0.0
    }
}

/// Static gain change (dB, ≤ 0) for a detector level `x` dB.
fn gain_computer(x: f64, threshold: f64, ratio: f64) -> f64 {
    let over = x - threshold;
    let slope = 1.0 / ratio - 1.0;
    if 2.0 * over < -KNEE_DB {
        0.0
    } else if 2.0 * over.abs() <= KNEE_DB {
        slope * (over + KNEE_DB / 2.0).powi(2) / (2.0 * KNEE_DB)
    } else {
        slope * over
    }
}

/// Feed-forward compression of mono `samples` in place.
///
/// Level is a trailing 10 ms RMS in dB; the gain reduction is smoothed with
/// separate attack and release one-pole filters, then makeup gain is added.
/// Ratios `≤ 1.05` leave the signal untouched.
pub fn compress(samples: &mut [f32], sample_rate: u32, params: &CompressorParams) {
    if params.ratio <= BYPASS_RATIO || samples.is_empty() || sample_rate == 0 {
        return;
    }

    let window = ms_to_samples(DETECTOR_MS, sample_rate).max(1);
    let attack = one_pole_coef(sample_rate, params.attack_ms);
    let release = one_pole_coef(sample_rate, params.release_ms);

    let input: Vec<f64> = samples
        .iter()
        .map(|&s| if s.is_finite() { s as f64 } else { 0.0 })
        .collect();
    let mut sum_sq = 0.0_f64;
    let mut smoothed = 0.0_f64;

    for (i, s) in samples.iter_mut().enumerate() {
        let x = input[i];
        sum_sq += x * x;
        if i >= window {
            sum_sq -= input[i - window] * input[i - window];
        }
        let filled = (i + 1).min(window) as f64;
        let level_db = linear_to_db((sum_sq.max(0.0) / filled).sqrt());

        let target = gain_computer(level_db, params.threshold_db, params.ratio);
        let coef = if target < smoothed { attack } else { release };
        smoothed = coef * smoothed + (1.0 - coef) * target;

        let y = x * db_to_linear(smoothed + params.makeup_db);
        *s = if y.is_finite() { y as f32 } else { 0.0 };
    }
}

/// Clamp every sample to `±10^(ceiling_db/20)`; non-finite samples become 0.
pub fn limit(samples: &mut [f32], ceiling_db: f64) {
    let ceiling = db_to_linear(ceiling_db).min(1.0) as f32;
    for s in samples.iter_mut() {
        *s = if s.is_finite() {
            s.clamp(-ceiling, ceiling)
        } else {
            0.0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(amp: f32, secs: f32, sr: u32) -> Vec<f32> {
        let n = (secs * sr as f32) as usize;
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect()
    }

    fn params(ratio: f64) -> CompressorParams {
        CompressorParams {
            threshold_db: -18.0,
            ratio,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_db: 0.0,
        }
    }

    #[test]
    fn knee_is_continuous() {
        let (t, r) = (-20.0, 4.0);
        let below = gain_computer(t - KNEE_DB / 2.0 - 1e-9, t, r);
        let at_low = gain_computer(t - KNEE_DB / 2.0, t, r);
        let at_high = gain_computer(t + KNEE_DB / 2.0, t, r);
        let above = gain_computer(t + KNEE_DB / 2.0 + 1e-9, t, r);
        assert!((below - at_low).abs() < 1e-6);
        assert!((at_high - above).abs() < 1e-6);
        assert_eq!(gain_computer(-60.0, t, r), 0.0);
    }

    #[test]
    fn low_ratio_is_bypass() {
        let mut x = sine(0.9, 0.2, 16_000);
        let before = x.clone();
        compress(&mut x, 16_000, &params(1.05));
        assert_eq!(x, before);
    }

    #[test]
    fn loud_signal_is_reduced() {
        let sr = 16_000;
        let mut x = sine(0.9, 1.0, sr);
        compress(&mut x, sr, &params(4.0));
        let late = crate::audio::buffer::peak(&x[sr as usize / 2..]);
        assert!(late < 0.4, "peak after compression {late}");
    }

    #[test]
    fn quiet_signal_is_untouched() {
        let mut x = sine(0.01, 0.5, 16_000);
        let before = x.clone();
        compress(&mut x, 16_000, &params(4.0));
        for (a, b) in x.iter().zip(&before) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn makeup_gain_lifts_quiet_signal() {
        let mut x = vec![0.01_f32; 1_000];
        let p = CompressorParams {
            makeup_db: 6.0206,
            ..params(2.0)
        };
        compress(&mut x, 16_000, &p);
        assert!((x[999] - 0.02).abs() < 1e-4);
    }

    #[test]
    fn limiter_respects_ceiling() {
        let mut x = vec![1.0, -1.0, 0.5, f32::NAN, f32::NEG_INFINITY];
        limit(&mut x, -1.0);
        let c = 10.0_f32.powf(-1.0 / 20.0);
        assert!(x.iter().all(|s| s.abs() <= c + 1e-6));
        assert_eq!(x[3], 0.0);
        assert_eq!(x[4], 0.0);
        assert_eq!(x[2], 0.5);
    }
}
