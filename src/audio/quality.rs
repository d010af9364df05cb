//! Objective quality metrics for a rendered clip.
//!
//! [`measure_metrics`] folds the clip to mono and reports:
//!
//! | Field | Definition |
//! |-------|------------|
//! | `lufsIntegrated` | BS.1770 integrated loudness (`-99.0` when unmeasurable) |
//! | `truePeakDb` | sample peak in dBFS, floored at −120 dB |
//! | `durationSec` | `samples / rate` |
//! | `rms` | RMS level in dBFS, floored at −120 dB |
//! | `crestFactor` | `peak − rms` in dB |
//! | `snrApprox` | `rms − noise floor` in dB |
//! | `clippingCount` | samples at or above the clipping ceiling |
//! | `silenceGapsMs` | runs of quiet windows of at least `min_silence_ms` |
//! | `qualityScore` | rule-based score in `[0, 100]` |
//!
//! The noise floor is the median level of the 50 ms windows below the
//! silence threshold, or the 20th percentile of all windows when none is
//! quiet (−90 dB when the clip is shorter than one window).
//!
//! # Example
//!
//! ```rust
//! use voice_render::audio::{measure_metrics, PcmBuffer, QcConfig};
//!
//! let quiet: Vec<f32> = (0..44_100)
//!     .map(|i| 0.01 * (2.0 * std::f32::consts::PI * 300.0 * i as f32 / 22_050.0).sin())
//!     .collect();
//! let m = measure_metrics(&PcmBuffer::mono(quiet, 22_050), &QcConfig::default());
//! assert!(m.quality_score < 90);
//! assert!((m.duration_sec - 2.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};

use super::buffer::{linear_to_db, peak, rms, PcmBuffer, DB_FLOOR};
use super::loudness::integrated_loudness;

/// Noise floor reported when the clip holds no complete window.
pub const NOISE_FLOOR_NO_WINDOWS_DB: f64 = -90.0;

const SCORE_BASELINE: f64 = 95.0;
const CANONICAL_TARGETS: [f64; 4] = [-14.0, -16.0, -18.0, -23.0];
const PEAK_LIMIT_DB: f64 = -1.0;
const PEAK_HEADROOM_DB: f64 = -1.5;
const SNR_LOW_DB: f64 = 25.0;
const SNR_HIGH_DB: f64 = 35.0;
const CREST_SWEET_SPOT_DB: f64 = 12.0;
const CREST_TOLERANCE_DB: f64 = 3.0;
const CLIPPING_PENALTY: f64 = 20.0;

// ---------------------------------------------------------------------------
// QcConfig
// ---------------------------------------------------------------------------

/// Thresholds used by [`measure_metrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    /// Level (dBFS) at or above which a sample counts as clipped.
    pub clip_ceiling_db: f64,
    /// Analysis window for noise floor and silence detection.
    pub window_ms: u32,
    /// Windows at or below this RMS level (dBFS) count as silent.
    pub silence_threshold_dbfs: f64,
    /// Shortest run of silent windows reported as a gap.
    pub min_silence_ms: u32,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            clip_ceiling_db: 0.0,
            window_ms: 50,
            silence_threshold_dbfs: -50.0,
            min_silence_ms: 150,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsRecord
// ---------------------------------------------------------------------------

/// Measurements and score for one rendered clip.  Every float is finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRecord {
    pub lufs_integrated: f64,
    pub true_peak_db: f64,
    pub duration_sec: f64,
    /// RMS level in dBFS.
    pub rms: f64,
    pub crest_factor: f64,
    pub snr_approx: f64,
    pub clipping_count: usize,
    pub silence_gaps_ms: Vec<u32>,
    pub quality_score: u8,
    pub warnings: Vec<String>,
}

/// Replace a non-finite value with `fallback`.
fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

/// Measure `buffer` (folded to mono) against `config`.
pub fn measure_metrics(buffer: &PcmBuffer, config: &QcConfig) -> MetricsRecord {
    let mono = buffer.clone().into_mono();
    let x = &mono.samples;
    let sr = mono.sample_rate;

    let lufs = integrated_loudness(x, sr);
    let peak_db = linear_to_db(peak(x) as f64);
    let duration = if sr > 0 {
        x.len() as f64 / sr as f64
    } else {
        0.0
    };
    let rms_db = linear_to_db(rms(x));
    let crest = peak_db - rms_db;

    let (noise_floor, gaps) = noise_floor_and_silences(x, sr, config);
    let snr = rms_db - noise_floor;
    let clipping = count_clipping(x, config.clip_ceiling_db);

    let mut record = MetricsRecord {
        lufs_integrated: finite_or(lufs, super::loudness::UNMEASURABLE_LUFS),
        true_peak_db: finite_or(peak_db, DB_FLOOR),
        duration_sec: finite_or(duration, 0.0),
        rms: finite_or(rms_db, DB_FLOOR),
        crest_factor: finite_or(crest, 0.0),
        snr_approx: finite_or(snr, 0.0),
        clipping_count: clipping,
        silence_gaps_ms: gaps,
        quality_score: 0,
        warnings: Vec::new(),
    };
    let (score, warnings) = score(&record);
    record.quality_score = score;
    record.warnings = warnings;

    log::debug!(
        "qc: lufs={:.2} peak={:.2} rms={:.2} snr={:.2} score={}",
        record.lufs_integrated,
        record.true_peak_db,
        record.rms,
        record.snr_approx,
        record.quality_score
    );
    record
}

fn count_clipping(samples: &[f32], ceiling_db: f64) -> usize {
    let ceiling = 10.0_f64.powf(ceiling_db / 20.0) - 1e-6;
    samples
        .iter()
        .filter(|s| s.is_finite() && (s.abs() as f64) >= ceiling)
        .count()
}

/// Noise floor (dB) and the lengths of silent stretches (ms).
fn noise_floor_and_silences(samples: &[f32], sr: u32, config: &QcConfig) -> (f64, Vec<u32>) {
    if samples.is_empty() || sr == 0 {
        return (NOISE_FLOOR_NO_WINDOWS_DB, Vec::new());
    }
    let win = ((sr as u64 * config.window_ms as u64 / 1000) as usize).max(1);
    let levels: Vec<f64> = samples
        .chunks_exact(win)
        .map(|w| linear_to_db(rms(w)))
        .collect();
    if levels.is_empty() {
        return (NOISE_FLOOR_NO_WINDOWS_DB, Vec::new());
    }

    let silent: Vec<bool> = levels
        .iter()
        .map(|&db| db <= config.silence_threshold_dbfs)
        .collect();

    let mut quiet: Vec<f64> = levels
        .iter()
        .zip(&silent)
        .filter(|(_, &s)| s)
        .map(|(&db, _)| db)
        .collect();
    let floor = if quiet.is_empty() {
        let mut all = levels.clone();
        percentile(&mut all, 20.0)
    } else {
        percentile(&mut quiet, 50.0)
    };

    let mut gaps = Vec::new();
    let mut run = 0u32;
    for &s in silent.iter().chain(std::iter::once(&false)) {
        if s {
            run += 1;
        } else if run > 0 {
            let ms = run * config.window_ms;
            if ms >= config.min_silence_ms {
                gaps.push(ms);
            }
            run = 0;
        }
    }

    (floor, gaps)
}

/// Linear-interpolated percentile (`p` in 0..=100) of `values`.
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return NOISE_FLOOR_NO_WINDOWS_DB;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn score(m: &MetricsRecord) -> (u8, Vec<String>) {
    let mut score = SCORE_BASELINE;
    let mut warnings = Vec::new();

    let deviation = CANONICAL_TARGETS
        .iter()
        .map(|t| (m.lufs_integrated - t).abs())
        .fold(f64::INFINITY, f64::min);
    if deviation > 1.0 {
        score -= (3.0 * (deviation - 1.0)).min(30.0);
        warnings.push(format!(
            "Loudness {:.1} LUFS is {:.1} LU away from the nearest standard target",
            m.lufs_integrated, deviation
        ));
    }

    if m.true_peak_db > PEAK_LIMIT_DB {
        score -= (4.0 + 4.0 * (m.true_peak_db - PEAK_LIMIT_DB)).min(25.0);
        warnings.push(format!("Peak {:.1} dBFS above -1 dBFS", m.true_peak_db));
    } else if m.true_peak_db <= PEAK_HEADROOM_DB {
        score += 2.0;
    }

    if m.snr_approx < SNR_LOW_DB {
        score -= (SNR_LOW_DB - m.snr_approx).min(20.0);
        warnings.push(format!("Low SNR ({:.1} dB)", m.snr_approx));
    } else if m.snr_approx > SNR_HIGH_DB {
        score += 3.0;
    }

    let crest_off = (m.crest_factor - CREST_SWEET_SPOT_DB).abs();
    if crest_off > CREST_TOLERANCE_DB {
        score -= (1.5 * (crest_off - CREST_TOLERANCE_DB)).min(10.0);
        warnings.push(format!("Crest factor {:.1} dB outside 9-15 dB", m.crest_factor));
    }

    if m.clipping_count > 0 {
        score -= CLIPPING_PENALTY;
        warnings.push(format!("Detected clipping ({} samples)", m.clipping_count));
    }

    let score = finite_or(score, 0.0).round().clamp(0.0, 100.0) as u8;
    (score, warnings)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amp: f32, secs: f32, sr: u32) -> Vec<f32> {
        let n = (secs * sr as f32) as usize;
        (0..n)
            .map(|i| amp * (2.0 * std::f32::consts::PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    fn assert_all_finite(m: &MetricsRecord) {
        for v in [
            m.lufs_integrated,
            m.true_peak_db,
            m.duration_sec,
            m.rms,
            m.crest_factor,
            m.snr_approx,
        ] {
            assert!(v.is_finite(), "non-finite field in {m:?}");
        }
        assert!(m.quality_score <= 100);
    }

    #[test]
    fn empty_buffer_yields_sentinels() {
        let m = measure_metrics(&PcmBuffer::empty(22_050), &QcConfig::default());
        assert_all_finite(&m);
        assert_eq!(m.lufs_integrated, -99.0);
        assert_eq!(m.true_peak_db, DB_FLOOR);
        assert_eq!(m.rms, DB_FLOOR);
        assert_eq!(m.duration_sec, 0.0);
        assert!(m.silence_gaps_ms.is_empty());
    }

    #[test]
    fn all_fields_finite_for_silence_and_garbage() {
        let silent = PcmBuffer::mono(vec![0.0; 22_050], 22_050);
        assert_all_finite(&measure_metrics(&silent, &QcConfig::default()));

        let garbage = PcmBuffer::mono(vec![f32::NAN, f32::INFINITY, 0.3, -0.2], 8_000);
        assert_all_finite(&measure_metrics(&garbage, &QcConfig::default()));
    }

    #[test]
    fn duration_is_samples_over_rate() {
        let buf = PcmBuffer::mono(vec![0.1; 33_075], 22_050);
        let m = measure_metrics(&buf, &QcConfig::default());
        assert_eq!(m.duration_sec, 33_075.0 / 22_050.0);
    }

    #[test]
    fn very_quiet_input_is_penalised_with_loudness_warning() {
        let buf = PcmBuffer::mono(sine(300.0, 0.01, 2.0, 22_050), 22_050);
        let m = measure_metrics(&buf, &QcConfig::default());
        assert!(m.quality_score < 90, "score {}", m.quality_score);
        assert!(m.warnings.iter().any(|w| w.starts_with("Loudness")));
    }

    #[test]
    fn full_scale_square_counts_clipping() {
        let x: Vec<f32> = (0..8_000).map(|i| if (i / 20) % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let m = measure_metrics(&PcmBuffer::mono(x, 8_000), &QcConfig::default());
        assert_eq!(m.clipping_count, 8_000);
        assert!(m.warnings.iter().any(|w| w.contains("clipping")));
    }

    #[test]
    fn lower_ceiling_counts_more_samples() {
        let buf = PcmBuffer::mono(vec![0.95; 100], 8_000);
        let strict = QcConfig {
            clip_ceiling_db: -1.0,
            ..QcConfig::default()
        };
        assert_eq!(measure_metrics(&buf, &QcConfig::default()).clipping_count, 0);
        assert_eq!(measure_metrics(&buf, &strict).clipping_count, 100);
    }

    #[test]
    fn silence_gaps_are_detected() {
        let sr = 16_000;
        let mut x = sine(440.0, 0.3, 0.5, sr);
        x.extend(vec![0.0; 8_000]); // 500 ms
        x.extend(sine(440.0, 0.3, 0.5, sr));
        x.extend(vec![0.0; 1_600]); // 100 ms: too short
        x.extend(sine(440.0, 0.3, 0.5, sr));
        let m = measure_metrics(&PcmBuffer::mono(x, sr), &QcConfig::default());
        assert_eq!(m.silence_gaps_ms, vec![500]);
        assert!(m.snr_approx > 35.0);
    }

    #[test]
    fn trailing_silence_counts_as_gap() {
        let sr = 8_000;
        let mut x = sine(440.0, 0.3, 0.5, sr);
        x.extend(vec![0.0; 2_400]); // 300 ms
        let m = measure_metrics(&PcmBuffer::mono(x, sr), &QcConfig::default());
        assert_eq!(m.silence_gaps_ms, vec![300]);
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let m = measure_metrics(&PcmBuffer::mono(sine(440.0, 0.3, 1.0, 8_000), 8_000), &QcConfig::default());
        let json = serde_json::to_value(&m).unwrap();
        for key in [
            "lufsIntegrated",
            "truePeakDb",
            "durationSec",
            "rms",
            "crestFactor",
            "snrApprox",
            "clippingCount",
            "silenceGapsMs",
            "qualityScore",
            "warnings",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn percentile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_eq!(percentile(&mut v, 50.0), 3.0);
        assert!((percentile(&mut v, 20.0) - 1.8).abs() < 1e-9);
    }
}
