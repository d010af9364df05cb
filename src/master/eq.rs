//! RBJ "cookbook" biquads and the profile equaliser built from them.

use std::f64::consts::PI;

use super::preset::EqProfile;

/// Second-order IIR section (direct form I, coefficients normalised by `a0`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    /* delay line */
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    fn from_raw(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Option<Self> {
        let coeffs = [b0 / a0, b1 / a0, b2 / a0, a1 / a0, a2 / a0];
        if !coeffs.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some(Self {
            b0: coeffs[0],
            b1: coeffs[1],
            b2: coeffs[2],
            a1: coeffs[3],
            a2: coeffs[4],
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        })
    }

    /// `(cos w0, alpha)` for a corner at `freq`, or `None` when the corner is
    /// not strictly between 0 and Nyquist.
    fn prewarp(sample_rate: u32, freq: f64, q: f64) -> Option<(f64, f64)> {
        let fs = sample_rate as f64;
        if sample_rate == 0 || !(freq > 0.0 && freq < fs / 2.0) || q <= 0.0 {
            return None;
        }
        let w0 = 2.0 * PI * freq / fs;
        let (sin, cos) = w0.sin_cos();
        Some((cos, sin / (2.0 * q)))
    }

    pub fn high_pass(sample_rate: u32, freq: f64, q: f64) -> Option<Self> {
        let (cos, alpha) = Self::prewarp(sample_rate, freq, q)?;
        Self::from_raw(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    pub fn peaking(sample_rate: u32, freq: f64, q: f64, gain_db: f64) -> Option<Self> {
        let (cos, alpha) = Self::prewarp(sample_rate, freq, q)?;
        let a = 10.0_f64.powf(gain_db / 40.0);
        Self::from_raw(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    pub fn high_shelf(sample_rate: u32, freq: f64, q: f64, gain_db: f64) -> Option<Self> {
        let (cos, alpha) = Self::prewarp(sample_rate, freq, q)?;
        let a = 10.0_f64.powf(gain_db / 40.0);
        let sq = 2.0 * a.sqrt() * alpha;
        Self::from_raw(
            a * ((a + 1.0) + (a - 1.0) * cos + sq),
            -2.0 * a * ((a - 1.0) + (a + 1.0) * cos),
            a * ((a + 1.0) + (a - 1.0) * cos - sq),
            (a + 1.0) - (a - 1.0) * cos + sq,
            2.0 * ((a - 1.0) - (a + 1.0) * cos),
            (a + 1.0) - (a - 1.0) * cos - sq,
        )
    }

    /// Filter `signal` in place.
    pub fn process(&mut self, signal: &mut [f32]) {
        for s in signal.iter_mut() {
            let x0 = if s.is_finite() { *s as f64 } else { 0.0 };
            let y0 = self.b0 * x0 + self.b1 * self.x1 + self.b2 * self.x2
                - self.a1 * self.y1
                - self.a2 * self.y2;
            self.x2 = self.x1;
            self.x1 = x0;
            self.y2 = self.y1;
            self.y1 = y0;
            *s = y0 as f32;
        }
    }
}

/// One designable filter in a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Section {
    HighPass { freq: f64 },
    Peak { freq: f64, gain_db: f64 },
    HighShelf { freq: f64, gain_db: f64 },
}

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
const PEAK_Q: f64 = 1.0;

impl Section {
    pub fn design(self, sample_rate: u32) -> Option<Biquad> {
        match self {
            Self::HighPass { freq } => Biquad::high_pass(sample_rate, freq, BUTTERWORTH_Q),
            Self::Peak { freq, gain_db } => Biquad::peaking(sample_rate, freq, PEAK_Q, gain_db),
            Self::HighShelf { freq, gain_db } => {
                Biquad::high_shelf(sample_rate, freq, BUTTERWORTH_Q, gain_db)
            }
        }
    }
}

/// The filter sections that make up `profile`.
pub fn profile_sections(profile: EqProfile) -> Vec<Section> {
    match profile {
        EqProfile::Flat => Vec::new(),
        EqProfile::VoiceClarity => vec![
            Section::HighPass { freq: 80.0 },
            Section::Peak { freq: 3_000.0, gain_db: 3.0 },
        ],
        EqProfile::Warmth => vec![
            Section::HighPass { freq: 60.0 },
            Section::Peak { freq: 200.0, gain_db: 2.5 },
            Section::HighShelf { freq: 4_000.0, gain_db: -2.0 },
        ],
        EqProfile::Brightness => vec![
            Section::HighPass { freq: 80.0 },
            Section::Peak { freq: 8_000.0, gain_db: 3.0 },
        ],
    }
}

/// Run every designable section of `profile` over `samples`.  Sections that
/// cannot be designed at `sample_rate` (corner at or above Nyquist) are
/// skipped.  Returns the number of sections applied.
pub fn apply_profile(samples: &mut [f32], sample_rate: u32, profile: EqProfile) -> usize {
    let mut applied = 0;
    for section in profile_sections(profile) {
        match section.design(sample_rate) {
            Some(mut filter) => {
                filter.process(samples);
                applied += 1;
            }
            None => log::debug!("eq: {section:?} not designable at {sample_rate} Hz, skipped"),
        }
    }
    applied
}
