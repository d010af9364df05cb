//! Owned PCM buffer passed between pipeline stages.
//!
//! A [`PcmBuffer`] carries interleaved `f32` samples together with their
//! sample rate and channel count.  Every stage takes the buffer by value and
//! hands a (possibly new) buffer to the next stage, so no two stages ever
//! alias the same samples.
//!
//! The rendering pipeline is mono end-to-end: anything that enters it with
//! more than one channel is folded down with [`PcmBuffer::into_mono`].
//!
//! # Example
//!
//! ```rust
//! use voice_render::audio::PcmBuffer;
//!
//! let stereo = PcmBuffer::new(vec![0.5, -0.5, 0.2, 0.4], 16_000, 2);
//! assert_eq!(stereo.frames(), 2);
//!
//! let mono = stereo.into_mono();
//! assert_eq!(mono.channels, 1);
//! assert!((mono.samples[1] - 0.3).abs() < 1e-6);
//! ```

use super::resample::downmix;

/// Lowest level reported by any dB conversion in the crate.
pub const DB_FLOOR: f64 = -120.0;

// ---------------------------------------------------------------------------
// dB helpers
// ---------------------------------------------------------------------------

/// Convert a gain in dB to a linear amplitude factor.
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear amplitude to dB, floored at [`DB_FLOOR`].
///
/// Zero, negative and non-finite amplitudes all map to the floor.
pub fn linear_to_db(amplitude: f64) -> f64 {
    if !amplitude.is_finite() || amplitude <= 0.0 {
        return DB_FLOOR;
    }
    (20.0 * amplitude.log10()).max(DB_FLOOR)
}

/// Replace every non-finite sample with silence and clamp to `[-1.0, 1.0]`.
pub fn sanitize(samples: &mut [f32]) {
    for s in samples.iter_mut() {
        *s = if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 };
    }
}

// ---------------------------------------------------------------------------
// PcmBuffer
// ---------------------------------------------------------------------------

/// Interleaved floating-point audio with its format.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Interleaved samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels (≥ 1).
    pub channels: u16,
}

impl PcmBuffer {
    /// Wrap interleaved samples.  A channel count of `0` is treated as mono.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Wrap mono samples.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// A zero-length mono buffer.
    pub fn empty(sample_rate: u32) -> Self {
        Self::mono(Vec::new(), sample_rate)
    }

    /// `ms` milliseconds of mono silence.
    pub fn silence(ms: u32, sample_rate: u32) -> Self {
        Self::mono(vec![0.0; ms_to_samples(ms, sample_rate)], sample_rate)
    }

    /// Number of sample frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds; `0.0` when the sample rate is unknown.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Fold all channels into one by averaging each frame.
    pub fn into_mono(self) -> Self {
        if self.channels == 1 {
            return self;
        }
        let samples = downmix(&self.samples, self.channels);
        Self::mono(samples, self.sample_rate)
    }

    /// Coerce to `channels` channels.
    ///
    /// Mono input is replicated across the new channels; wider input is
    /// truncated to its first `channels` channels.  Narrower non-mono input
    /// is padded by repeating its last channel.
    pub fn with_channels(self, channels: u16) -> Self {
        let channels = channels.max(1);
        if channels == self.channels {
            return self;
        }
        let src = self.channels as usize;
        let dst = channels as usize;
        let mut out = Vec::with_capacity(self.frames() * dst);
        for frame in self.samples.chunks_exact(src) {
            for c in 0..dst {
                out.push(frame[c.min(src - 1)]);
            }
        }
        Self::new(out, self.sample_rate, channels)
    }

    /// Multiply every sample by `10^(db/20)`.
    pub fn apply_gain_db(&mut self, db: f64) {
        if db == 0.0 {
            return;
        }
        let g = db_to_linear(db) as f32;
        for s in self.samples.iter_mut() {
            *s *= g;
        }
        sanitize(&mut self.samples);
    }

    /// Largest absolute sample value (`0.0` when empty).
    pub fn peak(&self) -> f32 {
        peak(&self.samples)
    }
}

/// Number of samples covering `ms` milliseconds at `sample_rate`.
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

/// Largest absolute sample value, ignoring non-finite samples.
pub fn peak(samples: &[f32]) -> f32 {
    samples
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s.abs())
        .fold(0.0_f32, f32::max)
}

/// Root-mean-square of `samples`, accumulated in `f64`.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / samples.len() as f64).sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
