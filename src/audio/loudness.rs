//! ITU-R BS.1770 integrated loudness (mono).
//!
//! The meter K-weights the signal with the two-stage pre-filter (high shelf
//! + RLB high-pass, coefficients recomputed for any sample rate), splits it
//! into 400 ms blocks with 75 % overlap and applies the two gates:
//!
//! | Gate | Rule |
//! |------|------|
//! | Absolute | blocks below −70 LUFS are discarded |
//! | Relative | blocks more than 10 LU below the mean of the survivors are discarded |
//!
//! Signals shorter than one block are measured as a single block.  When no
//! block survives gating (digital silence, empty input, unknown rate) the
//! measurement reports [`UNMEASURABLE_LUFS`] instead of `-inf`.

use std::f64::consts::PI;

/// Sentinel returned when loudness cannot be measured.
pub const UNMEASURABLE_LUFS: f64 = -99.0;

const BLOCK_SECS: f64 = 0.400;
const STEP_SECS: f64 = 0.100;
const ABSOLUTE_GATE_LUFS: f64 = -70.0;
const RELATIVE_GATE_LU: f64 = -10.0;

// ---------------------------------------------------------------------------
// K-weighting
// ---------------------------------------------------------------------------

/// Direct-form-II transposed biquad with `a0` normalised to one.
#[derive(Debug, Clone, Copy)]
struct Section {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    z1: f64,
    z2: f64,
}

impl Section {
    fn process(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.z1;
        self.z1 = self.b1 * x - self.a1 * y + self.z2;
        self.z2 = self.b2 * x - self.a2 * y;
        y
    }
}

/// Stage 1 (high shelf, ≈ +4 dB above 1.5 kHz) and stage 2 (RLB high-pass
/// at ≈ 38 Hz) for `fs`.
fn k_weighting(fs: f64) -> (Section, Section) {
    let f0 = 1_681.974_450_955_533;
    let g = 3.999_843_853_973_347;
    let q = 0.707_175_236_955_419_6;
    let k = (PI * f0 / fs).tan();
    let vh = 10.0_f64.powf(g / 20.0);
    let vb = vh.powf(0.499_666_774_154_541_6);
    let a0 = 1.0 + k / q + k * k;
    let shelf = Section {
        b0: (vh + vb * k / q + k * k) / a0,
        b1: 2.0 * (k * k - vh) / a0,
        b2: (vh - vb * k / q + k * k) / a0,
        a1: 2.0 * (k * k - 1.0) / a0,
        a2: (1.0 - k / q + k * k) / a0,
        z1: 0.0,
        z2: 0.0,
    };

    let f0 = 38.135_470_876_024_44;
    let q = 0.500_327_037_323_877_3;
    let k = (PI * f0 / fs).tan();
    let a0 = 1.0 + k / q + k * k;
    let highpass = Section {
        b0: 1.0,
        b1: -2.0,
        b2: 1.0,
        a1: 2.0 * (k * k - 1.0) / a0,
        a2: (1.0 - k / q + k * k) / a0,
        z1: 0.0,
        z2: 0.0,
    };

    (shelf, highpass)
}

// ---------------------------------------------------------------------------
// Measurement
// ---------------------------------------------------------------------------

fn block_loudness(mean_square: f64) -> f64 {
    -0.691 + 10.0 * mean_square.log10()
}

/// Integrated loudness of mono `samples` in LUFS.
///
/// Always finite: returns [`UNMEASURABLE_LUFS`] when the signal is empty,
/// silent, or gated away entirely.
pub fn integrated_loudness(samples: &[f32], sample_rate: u32) -> f64 {
    if samples.is_empty() || sample_rate == 0 {
        return UNMEASURABLE_LUFS;
    }

    let fs = sample_rate as f64;
    let (mut shelf, mut highpass) = k_weighting(fs);
    let squared: Vec<f64> = samples
        .iter()
        .map(|&s| {
            let x = if s.is_finite() { s as f64 } else { 0.0 };
            let y = highpass.process(shelf.process(x));
            y * y
        })
        .collect();

    let block = ((BLOCK_SECS * fs).round() as usize).max(1);
    let step = ((STEP_SECS * fs).round() as usize).max(1);

    // Prefix sums make every block an O(1) lookup.
    let mut prefix = Vec::with_capacity(squared.len() + 1);
    prefix.push(0.0_f64);
    for &v in &squared {
        let last = prefix[prefix.len() - 1];
        prefix.push(last + v);
    }

    let mut powers = Vec::new();
    if squared.len() < block {
        powers.push(prefix[squared.len()] / squared.len() as f64);
    } else {
        let mut start = 0;
        while start + block <= squared.len() {
            powers.push((prefix[start + block] - prefix[start]) / block as f64);
            start += step;
        }
    }

    let above_absolute: Vec<f64> = powers
        .into_iter()
        .filter(|&z| z > 0.0 && block_loudness(z) > ABSOLUTE_GATE_LUFS)
        .collect();
    if above_absolute.is_empty() {
        return UNMEASURABLE_LUFS;
    }

    let mean_abs = above_absolute.iter().sum::<f64>() / above_absolute.len() as f64;
    let relative_gate = block_loudness(mean_abs) + RELATIVE_GATE_LU;

    let gated: Vec<f64> = above_absolute
        .into_iter()
        .filter(|&z| block_loudness(z) > relative_gate)
        .collect();
    if gated.is_empty() {
        return UNMEASURABLE_LUFS;
    }

    let lufs = block_loudness(gated.iter().sum::<f64>() / gated.len() as f64);
    if lufs.is_finite() {
        lufs
    } else {
        UNMEASURABLE_LUFS
    }
}

/// `true` when `lufs` is a real measurement rather than the sentinel.
pub fn is_measurable(lufs: f64) -> bool {
    lufs.is_finite() && lufs > UNMEASURABLE_LUFS
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Scale `samples` so their integrated loudness equals `target_lufs`.
///
/// The result is clipped to `[-1.0, 1.0]`.  Empty and unmeasurable signals
/// are left untouched.  Returns the gain that was applied, in dB.
pub fn normalize_loudness(samples: &mut [f32], sample_rate: u32, target_lufs: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let measured = integrated_loudness(samples, sample_rate);
    if !is_measurable(measured) {
        log::debug!("loudness: signal is unmeasurable, skipping normalisation");
        return 0.0;
    }

    let gain_db = target_lufs - measured;
    let gain = 10.0_f64.powf(gain_db / 20.0);
    if !gain.is_finite() {
        return 0.0;
    }
    for s in samples.iter_mut() {
        let y = (*s as f64 * gain) as f32;
        *s = if y.is_finite() { y.clamp(-1.0, 1.0) } else { 0.0 };
    }
    gain_db
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

    #[test]
    fn full_scale_1k_sine_reads_about_minus_3() {
        // BS.1770 reference: a 0 dBFS 1 kHz sine measures ≈ −3.01 LUFS.
        let x = sine(1_000.0, 1.0, 3.0, 48_000);
        let l = integrated_loudness(&x, 48_000);
        assert!((l + 3.01).abs() < 0.2, "measured {l}");
    }

    #[test]
    fn halving_amplitude_drops_six_lu() {
        let loud = integrated_loudness(&sine(1_000.0, 0.5, 2.0, 44_100), 44_100);
        let quiet = integrated_loudness(&sine(1_000.0, 0.25, 2.0, 44_100), 44_100);
        assert!((loud - quiet - 6.02).abs() < 0.1, "{loud} vs {quiet}");
    }

    #[test]
    fn silence_is_sentinel() {
        assert_eq!(integrated_loudness(&[0.0; 48_000], 48_000), UNMEASURABLE_LUFS);
        assert_eq!(integrated_loudness(&[], 48_000), UNMEASURABLE_LUFS);
        assert_eq!(integrated_loudness(&[0.1; 10], 0), UNMEASURABLE_LUFS);
    }

    #[test]
    fn short_signal_is_measured_as_one_block() {
        let l = integrated_loudness(&sine(1_000.0, 0.5, 0.1, 16_000), 16_000);
        assert!(is_measurable(l));
    }

    #[test]
    fn normalize_hits_target_within_one_lu() {
        for &(amp, target) in &[(0.5_f32, -16.0), (0.02, -16.0), (0.3, -23.0), (0.1, -14.0)] {
            let mut x = sine(440.0, amp, 2.0, 22_050);
            normalize_loudness(&mut x, 22_050, target);
            let l = integrated_loudness(&x, 22_050);
            assert!((l - target).abs() <= 1.0, "amp {amp}: {l} vs {target}");
        }
    }

    #[test]
    fn normalize_empty_and_silent_are_noops() {
        let mut empty: Vec<f32> = Vec::new();
        assert_eq!(normalize_loudness(&mut empty, 16_000, -16.0), 0.0);
        let mut silent = vec![0.0_f32; 16_000];
        assert_eq!(normalize_loudness(&mut silent, 16_000, -16.0), 0.0);
        assert!(silent.iter().all(|&s| s == 0.0));
    }
}
