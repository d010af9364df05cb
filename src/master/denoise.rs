//! Stationary spectral gating.
//!
//! ```text
//! x ──STFT(Hann 1024 / hop 256)──▶ |X| dB
//!        noise profile: quietest 20 % of frames → per-bin mean + 1.5·σ
//!        mask = |X| > threshold, smoothed over time (one pole)
//!        gain = 1 − reduction·(1 − mask)
//!   ──iSTFT + weighted overlap-add──▶ y
//! ```
//!
//! Clips shorter than one frame are returned unchanged.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::capability::NoiseReduction;
use super::preset::NrStrength;

const FRAME: usize = 1024;
const HOP: usize = 256;
const NOISE_FRACTION: f64 = 0.2;
const THRESHOLD_STD: f64 = 1.5;
const MAG_FLOOR: f64 = 1e-10;

/// Spectral-gate noise reducer backed by `rustfft`.
pub struct SpectralGate {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl Default for SpectralGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SpectralGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralGate")
            .field("frame", &FRAME)
            .field("hop", &HOP)
            .finish()
    }
}

impl SpectralGate {
    pub fn new() -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let window = (0..FRAME)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / FRAME as f32;
                0.5 - 0.5 * phase.cos()
            })
            .collect();
        Self {
            forward: planner.plan_fft_forward(FRAME),
            inverse: planner.plan_fft_inverse(FRAME),
            window,
        }
    }

    fn gate(&self, samples: &mut [f32], sample_rate: u32, strength: NrStrength) {
        let reduction = strength.reduction() as f64;
        if reduction <= 0.0 || samples.len() < FRAME || sample_rate == 0 {
            return;
        }

        let n_frames = (samples.len() - FRAME).div_ceil(HOP) + 1;
        let bins = FRAME / 2 + 1;

        // Forward STFT.
        let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(n_frames);
        for f in 0..n_frames {
            let start = f * HOP;
            let mut buf: Vec<Complex<f32>> = (0..FRAME)
                .map(|i| {
                    let x = samples.get(start + i).copied().unwrap_or(0.0);
                    let x = if x.is_finite() { x } else { 0.0 };
                    Complex::new(x * self.window[i], 0.0)
                })
                .collect();
            self.forward.process(&mut buf);
            spectra.push(buf);
        }

        let mag_db: Vec<Vec<f64>> = spectra
            .iter()
            .map(|frame| {
                frame[..bins]
                    .iter()
                    .map(|c| 20.0 * (c.norm() as f64).max(MAG_FLOOR).log10())
                    .collect()
            })
            .collect();

        let threshold = noise_threshold(&spectra, &mag_db, bins);

        // Smoothed mask → per-bin gains, applied to both halves of the spectrum.
        let smoothing_s = strength.smoothing_ms() as f64 / 1000.0;
        let hop_s = HOP as f64 / sample_rate as f64;
        let coef = if smoothing_s > 0.0 {
            (-hop_s / smoothing_s).exp()
        } else {
            0.0
        };
        let mut mask = vec![0.0_f64; bins];
        for (frame, levels) in spectra.iter_mut().zip(&mag_db) {
            for k in 0..bins {
                let hit = if levels[k] > threshold[k] { 1.0 } else { 0.0 };
                mask[k] = coef * mask[k] + (1.0 - coef) * hit;
                let gain = (1.0 - reduction * (1.0 - mask[k])) as f32;
                frame[k] *= gain;
                if k > 0 && k < FRAME - k {
                    frame[FRAME - k] *= gain;
                }
            }
        }

        // Inverse STFT with squared-window normalisation.
        let total = (n_frames - 1) * HOP + FRAME;
        let mut out = vec![0.0_f32; total];
        let mut weight = vec![0.0_f32; total];
        let scale = 1.0 / FRAME as f32;
        for (f, frame) in spectra.iter_mut().enumerate() {
            self.inverse.process(frame);
            let start = f * HOP;
            for i in 0..FRAME {
                let w = self.window[i];
                out[start + i] += frame[i].re * scale * w;
                weight[start + i] += w * w;
            }
        }

        for (i, s) in samples.iter_mut().enumerate() {
            if weight[i] > 1e-6 {
                let y = out[i] / weight[i];
                *s = if y.is_finite() { y } else { 0.0 };
            }
        }
    }
}

/// Per-bin gate threshold (dB) from the quietest frames.
fn noise_threshold(spectra: &[Vec<Complex<f32>>], mag_db: &[Vec<f64>], bins: usize) -> Vec<f64> {
    let mut energy: Vec<(usize, f64)> = spectra
        .iter()
        .enumerate()
        .map(|(i, frame)| (i, frame[..bins].iter().map(|c| c.norm_sqr() as f64).sum()))
        .collect();
    energy.sort_by(|a, b| a.1.total_cmp(&b.1));
    let take = ((energy.len() as f64 * NOISE_FRACTION).ceil() as usize).clamp(1, energy.len());
    let quiet: Vec<usize> = energy[..take].iter().map(|(i, _)| *i).collect();

    (0..bins)
        .map(|k| {
            let n = quiet.len() as f64;
            let mean = quiet.iter().map(|&f| mag_db[f][k]).sum::<f64>() / n;
            let var = quiet
                .iter()
                .map(|&f| (mag_db[f][k] - mean).powi(2))
                .sum::<f64>()
                / n;
            mean + THRESHOLD_STD * var.sqrt()
        })
        .collect()
}

impl NoiseReduction for SpectralGate {
    fn name(&self) -> &'static str {
        "spectral-gate"
    }

    fn reduce(&self, samples: &mut [f32], sample_rate: u32, strength: NrStrength) {
        self.gate(samples, sample_rate, strength);
    }
}
