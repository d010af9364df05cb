//! Background bed loading and preparation.
//!
//! A bed is either a WAV file given by path or one of the named ambience
//! kinds, looked up as `<fx_dir>/<kind>.wav`.  Anything that cannot be
//! loaded becomes one second of silence so a render never fails because of
//! a missing asset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::audio::buffer::{db_to_linear, ms_to_samples, PcmBuffer, DB_FLOOR};
use crate::audio::resample::resample_fft;
use crate::audio::wav::read_wav;

/// Named ambience beds shipped in the assets directory.
pub const AMBIENCE_KINDS: [&str; 6] = ["rain", "cafe", "forest", "ocean", "fire", "wind"];

/// Rate of the silent fallback bed.
const FALLBACK_RATE: u32 = 16_000;

/// Where the bed comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BedSource {
    /// A WAV file anywhere on disk.
    Path(PathBuf),
    /// One of [`AMBIENCE_KINDS`]; `"none"` and unknown kinds give silence.
    Kind(String),
}

impl BedSource {
    /// Resolve to a file path.  `None` for `none` and unknown kinds.
    pub fn resolve(&self, fx_dir: &Path) -> Option<PathBuf> {
        match self {
            BedSource::Path(p) => Some(p.clone()),
            BedSource::Kind(kind) => {
                let kind = kind.trim().to_ascii_lowercase();
                if AMBIENCE_KINDS.contains(&kind.as_str()) {
                    Some(fx_dir.join(format!("{kind}.wav")))
                } else {
                    if kind != "none" {
                        log::warn!("background: unknown ambience kind {kind:?}");
                    }
                    None
                }
            }
        }
    }
}

/// Load the bed as mono, falling back to one second of silence.
pub fn load_bed(source: &BedSource, fx_dir: &Path) -> PcmBuffer {
    let Some(path) = source.resolve(fx_dir) else {
        return PcmBuffer::silence(1_000, FALLBACK_RATE);
    };
    if !path.exists() {
        log::warn!("background: bed {} not found, using silence", path.display());
        return PcmBuffer::silence(1_000, FALLBACK_RATE);
    }
    match read_wav(&path) {
        Ok(buf) => {
            log::debug!(
                "background: loaded {} ({:.2}s @ {} Hz)",
                path.display(),
                buf.duration_secs(),
                buf.sample_rate
            );
            buf.into_mono()
        }
        Err(e) => {
            log::warn!("background: cannot decode {}: {e}", path.display());
            PcmBuffer::silence(1_000, FALLBACK_RATE)
        }
    }
}

/// Linear bed gain as a dB change: `≤ 0` mutes, `≥ 1` leaves the bed alone.
pub fn gain_to_db(gain: f64) -> f64 {
    if !gain.is_finite() || gain <= 0.0 {
        DB_FLOOR
    } else if gain >= 1.0 {
        0.0
    } else {
        20.0 * gain.log10()
    }
}

/// Resample `bed` to `sample_rate`, then loop and truncate it to exactly
/// `len` samples.
pub fn fit_bed(bed: &PcmBuffer, sample_rate: u32, len: usize) -> Vec<f32> {
    let mono = bed.clone().into_mono();
    let src = resample_fft(&mono.samples, mono.sample_rate, sample_rate);
    if src.is_empty() {
        return vec![0.0; len];
    }
    src.iter().copied().cycle().take(len).collect()
}

/// Scale the bed by `gain_db` and ramp its edges linearly.
pub fn shape_bed(bed: &mut [f32], sample_rate: u32, gain_db: f64, fade_in_ms: u32, fade_out_ms: u32) {
    let g = db_to_linear(gain_db) as f32;
    if gain_db != 0.0 {
        for s in bed.iter_mut() {
            *s *= g;
        }
    }

    let n = bed.len();
    let fade_in = ms_to_samples(fade_in_ms, sample_rate).min(n);
    for (i, s) in bed.iter_mut().take(fade_in).enumerate() {
        *s *= i as f32 / fade_in as f32;
    }
    let fade_out = ms_to_samples(fade_out_ms, sample_rate).min(n);
    for (i, s) in bed[n - fade_out..].iter_mut().enumerate() {
        *s *= (fade_out - i) as f32 / fade_out as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::wav::write_wav_pcm16;

    #[test]
    fn kinds_resolve_into_fx_dir() {
        let dir = Path::new("/assets/fx");
        assert_eq!(
            BedSource::Kind("Rain".into()).resolve(dir),
            Some(dir.join("rain.wav"))
        );
        assert_eq!(BedSource::Kind("none".into()).resolve(dir), None);
        assert_eq!(BedSource::Kind("thunder".into()).resolve(dir), None);
    }

    #[test]
    fn missing_bed_is_one_second_of_silence() {
        let dir = tempfile::tempdir().unwrap();
        let bed = load_bed(&BedSource::Kind("cafe".into()), dir.path());
        assert_eq!(bed.sample_rate, 16_000);
        assert_eq!(bed.samples.len(), 16_000);
        assert!(bed.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_bed_is_loaded_as_mono() {
        let dir = tempfile::tempdir().unwrap();
        write_wav_pcm16(
            &dir.path().join("ocean.wav"),
            &PcmBuffer::new([0.5_f32, 0.0].repeat(800), 8_000, 2),
        )
        .unwrap();
        let bed = load_bed(&BedSource::Kind("ocean".into()), dir.path());
        assert_eq!(bed.channels, 1);
        assert_eq!(bed.samples.len(), 800);
        assert!((bed.samples[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn undecodable_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"nope").unwrap();
        let bed = load_bed(&BedSource::Path(path), dir.path());
        assert_eq!(bed.samples.len(), 16_000);
    }

    #[test]
    fn gain_mapping() {
        assert_eq!(gain_to_db(0.0), DB_FLOOR);
        assert_eq!(gain_to_db(-1.0), DB_FLOOR);
        assert_eq!(gain_to_db(1.0), 0.0);
        assert_eq!(gain_to_db(3.0), 0.0);
        assert!((gain_to_db(0.5) + 6.0206).abs() < 1e-3);
    }

    #[test]
    fn short_bed_loops_to_length() {
        let bed = PcmBuffer::mono(vec![0.1, 0.2, 0.3], 8_000);
        assert_eq!(fit_bed(&bed, 8_000, 7), vec![0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1]);
    }

    #[test]
    fn long_bed_is_truncated() {
        let bed = PcmBuffer::mono(vec![0.1; 100], 8_000);
        assert_eq!(fit_bed(&bed, 8_000, 10).len(), 10);
    }

    #[test]
    fn fades_ramp_edges() {
        let mut bed = vec![1.0_f32; 1_000];
        shape_bed(&mut bed, 1_000, 0.0, 100, 100);
        assert_eq!(bed[0], 0.0);
        assert!((bed[50] - 0.5).abs() < 1e-6);
        assert_eq!(bed[500], 1.0);
        assert!(bed[999] <= 0.01 + 1e-6);
    }

    #[test]
    fn fade_longer_than_bed_is_clamped() {
        let mut bed = vec![1.0_f32; 10];
        shape_bed(&mut bed, 1_000, 0.0, 0, 5_000);
        assert!(bed.iter().all(|s| s.is_finite() && *s <= 1.0));
        assert_eq!(bed[0], 1.0);
    }
}
