//! Joins per-utterance buffers into one continuous stream.
//!
//! ```text
//!  buf[0] ─┬─ gap(breaks[0]) ─╳─ buf[1] ─┬─ gap(breaks[1]) ─╳─ buf[2] …
//!                             ▲                             ▲
//!                  linear crossfade of min(xfade, len(a), len(b)) samples
//! ```
//!
//! The crossfade is applied *after* the silence gap, so a pause fades the
//! silence into the next utterance rather than overlapping speech.  The
//! output length is therefore `Σ len(buf) + Σ gap − Σ overlap`.
//!
//! # Example
//!
//! ```rust
//! use voice_render::audio::{Assembler, PcmBuffer};
//!
//! let a = PcmBuffer::mono(vec![0.5; 1_000], 8_000);
//! let b = PcmBuffer::mono(vec![0.5; 1_000], 8_000);
//!
//! // 100 ms gap (800 samples), 10 ms crossfade (80 samples)
//! let out = Assembler::new(10).assemble(vec![a, b], &[100]);
//! assert_eq!(out.samples.len(), 1_000 + 800 + 1_000 - 80);
//! ```

use super::buffer::{ms_to_samples, PcmBuffer};
use super::resample::resample_nearest;

/// Sample rate reported for an empty assembly.
pub const DEFAULT_SAMPLE_RATE: u32 = 22_050;

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Crossfading concatenator.
#[derive(Debug, Clone, Copy)]
pub struct Assembler {
    crossfade_ms: u32,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new(10)
    }
}

impl Assembler {
    pub fn new(crossfade_ms: u32) -> Self {
        Self { crossfade_ms }
    }

    pub fn crossfade_ms(&self) -> u32 {
        self.crossfade_ms
    }

    /// Assemble `buffers` in order.
    ///
    /// `breaks_after_ms[i]` is the silence inserted between buffer `i` and
    /// `i + 1`; missing entries count as zero.  The first buffer fixes the
    /// sample rate and channel count of the result.
    pub fn assemble(&self, buffers: Vec<PcmBuffer>, breaks_after_ms: &[u32]) -> PcmBuffer {
        let mut iter = buffers.into_iter();
        let Some(first) = iter.next() else {
            return PcmBuffer::empty(DEFAULT_SAMPLE_RATE);
        };

        let sample_rate = first.sample_rate;
        let channels = first.channels;
        let ch = channels as usize;
        let fade_frames = ms_to_samples(self.crossfade_ms, sample_rate);
        let mut out = first.samples;

        for (idx, next) in iter.enumerate() {
            let gap_ms = breaks_after_ms.get(idx).copied().unwrap_or(0);
            if gap_ms > 0 {
                out.resize(out.len() + ms_to_samples(gap_ms, sample_rate) * ch, 0.0);
            }

            let next = next.with_channels(channels);
            let next_samples = if next.sample_rate != sample_rate {
                log::debug!(
                    "assemble: resampling utterance {} from {} Hz to {} Hz",
                    idx + 1,
                    next.sample_rate,
                    sample_rate
                );
                resample_nearest(&next.samples, channels, next.sample_rate, sample_rate)
            } else {
                next.samples
            };

            crossfade_into(&mut out, &next_samples, ch, fade_frames);
        }

        PcmBuffer::new(out, sample_rate, channels)
    }
}

/// Append `next` to `out`, blending the last `n` frames of `out` with the
/// first `n` frames of `next`, where `n = min(fade_frames, len(out), len(next))`.
///
/// The left side ramps `1 → 0`, the right side `0 → 1` (endpoint excluded, so
/// the first blended frame is pure `out`).
fn crossfade_into(out: &mut Vec<f32>, next: &[f32], ch: usize, fade_frames: usize) {
    let out_frames = out.len() / ch;
    let next_frames = next.len() / ch;
    let n = fade_frames.min(out_frames).min(next_frames);

    if n == 0 {
        out.extend_from_slice(next);
        return;
    }

    let start = (out_frames - n) * ch;
    for k in 0..n {
        let fade_in = k as f32 / n as f32;
        let fade_out = 1.0 - fade_in;
        for c in 0..ch {
            let i = start + k * ch + c;
            out[i] = out[i] * fade_out + next[k * ch + c] * fade_in;
        }
    }
    out.extend_from_slice(&next[n * ch..]);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
