//! Sample-rate conversion and channel mixing utilities.
//!
//! Three resamplers are provided, each used where its trade-off fits:
//!
//! 1. [`resample_nearest`]: nearest-neighbour index mapping.  Used by the
//!    assembler so that utterances from engines with a different native rate
//!    line up sample-exactly with the first utterance.
//! 2. [`resample_linear`]: linear interpolation, mono only.  Cheap fallback.
//! 3. [`resample_fft`]: band-limited FFT resampling through `rubato`.  Used
//!    for background beds, which are long and tonal enough for aliasing to be
//!    audible.  Falls back to [`resample_linear`] when `rubato` rejects the
//!    rate pair.
//!
//! [`downmix`] folds interleaved multi-channel audio to mono.

use rubato::{FftFixedIn, Resampler};

/// Block size fed to the FFT resampler.
const FFT_CHUNK: usize = 1024;
/// Sub-chunks per block (trades latency for CPU in rubato).
const FFT_SUB_CHUNKS: usize = 2;

// ---------------------------------------------------------------------------
// downmix
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// The output length is `samples.len() / channels`.
///
/// * If `channels == 1` the input slice is returned as an owned `Vec`.
/// * If `channels == 0` an empty vector is returned.
///
/// # Example
///
/// ```rust
/// use voice_render::audio::downmix;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, -0.2]; // L R L R
/// let mono = downmix(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// ```
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// resample_nearest
// ---------------------------------------------------------------------------

/// Resample interleaved audio from `from_rate` to `to_rate` by picking, for
/// every output frame, the input frame at `floor(i * from / to)`.
///
/// The output has `floor(frames * to / from)` frames.  Equal rates and empty
/// input return a copy of the input.
pub fn resample_nearest(samples: &[f32], channels: u16, from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    let ch = channels.max(1) as usize;
    let in_frames = samples.len() / ch;
    let ratio = to_rate as f64 / from_rate as f64;
    let out_frames = (in_frames as f64 * ratio) as usize;

    let mut out = Vec::with_capacity(out_frames * ch);
    for i in 0..out_frames {
        let src = ((i as f64 / ratio) as usize).min(in_frames - 1);
        out.extend_from_slice(&samples[src * ch..(src + 1) * ch]);
    }
    out
}

// ---------------------------------------------------------------------------
// resample_linear
// ---------------------------------------------------------------------------

/// Resample mono `samples` from `source_rate` to `target_rate` using linear
/// interpolation.
///
/// The output length is `ceil(samples.len() * target_rate / source_rate)`.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return samples.to_vec();
    }

    if samples.is_empty() {
        return Vec::new();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos as usize;
        let frac = src_pos - idx as f64;

        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac as f32) + samples[idx + 1] * frac as f32
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// resample_fft
// ---------------------------------------------------------------------------

/// Band-limited resampling of mono audio through `rubato`'s `FftFixedIn`.
///
/// The result is trimmed (or zero-padded) to exactly
/// `round(samples.len() * target_rate / source_rate)` samples and the
/// resampler's start-up delay is removed.  If `rubato` cannot be constructed
/// or fails mid-stream the linear resampler is used instead.
pub fn resample_fft(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 || samples.is_empty() {
        return samples.to_vec();
    }

    match try_resample_fft(samples, source_rate, target_rate) {
        Ok(out) => out,
        Err(e) => {
            log::warn!(
                "resample: FFT resampler unavailable ({e}); using linear interpolation \
                 {source_rate} Hz -> {target_rate} Hz"
            );
            resample_linear(samples, source_rate, target_rate)
        }
    }
}

fn try_resample_fft(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, String> {
    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        target_rate as usize,
        FFT_CHUNK,
        FFT_SUB_CHUNKS,
        1,
    )
    .map_err(|e| e.to_string())?;

    let expected = (samples.len() as f64 * target_rate as f64 / source_rate as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay + FFT_CHUNK);

    // Feed whole blocks, then zero-padded blocks until the delay line has
    // flushed everything we need.
    let mut pos = 0;
    while out.len() < expected + delay {
        let mut block = vec![0.0_f32; FFT_CHUNK];
        if pos < samples.len() {
            let end = (pos + FFT_CHUNK).min(samples.len());
            block[..end - pos].copy_from_slice(&samples[pos..end]);
        }
        pos += FFT_CHUNK;

        let frames = resampler
            .process(&[block], None)
            .map_err(|e| e.to_string())?;
        match frames.into_iter().next() {
            Some(ch) => out.extend_from_slice(&ch),
            None => return Err("resampler produced no channels".into()),
        }
    }

    let mut out: Vec<f32> = out.into_iter().skip(delay).take(expected).collect();
    out.resize(expected, 0.0);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
