//! The mastering chain: fixed stage order, each stage individually bypassable.
//!
//! ```text
//! noise reduction → EQ → compression → loudness normalisation → limiter
//! ```
//!
//! Level matching is a separate step ([`MasteringChain::match_levels`]) that
//! runs on the raw utterance buffers before assembly; the assembled result
//! then goes through [`MasteringChain::process`] as usual.

use super::capability::Capabilities;
use super::dynamics::{compress, limit};
use super::preset::{NrStrength, Preset};
use crate::audio::buffer::{sanitize, PcmBuffer};
use crate::audio::loudness::normalize_loudness;
use crate::config::DspConfig;

// ---------------------------------------------------------------------------
// StageSet
// ---------------------------------------------------------------------------

/// Which stages run.  A disabled stage passes its input through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSet {
    pub noise_reduction: bool,
    pub equalizer: bool,
    pub compressor: bool,
    pub normalize: bool,
    pub limiter: bool,
}

impl Default for StageSet {
    fn default() -> Self {
        Self::from(&DspConfig::default())
    }
}

impl From<&DspConfig> for StageSet {
    fn from(cfg: &DspConfig) -> Self {
        Self {
            noise_reduction: cfg.noise_reduction,
            equalizer: cfg.equalizer,
            compressor: cfg.compressor,
            normalize: cfg.loudness_normalization,
            limiter: cfg.limiter,
        }
    }
}

// ---------------------------------------------------------------------------
// MasteringChain
// ---------------------------------------------------------------------------

/// Runs the mastering stages over mono buffers.
#[derive(Debug, Clone)]
pub struct MasteringChain {
    caps: Capabilities,
    stages: StageSet,
}

impl Default for MasteringChain {
    fn default() -> Self {
        Self::from_config(&DspConfig::default())
    }
}

impl MasteringChain {
    pub fn new(caps: Capabilities, stages: StageSet) -> Self {
        Self { caps, stages }
    }

    /// Detect capabilities and stage switches from `cfg`.
    pub fn from_config(cfg: &DspConfig) -> Self {
        Self::new(Capabilities::detect(cfg), StageSet::from(cfg))
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn stages(&self) -> StageSet {
        self.stages
    }

    /// Master `buffer` with `preset`.  The result is mono, finite, and never
    /// exceeds the preset's peak ceiling when the limiter is enabled.
    pub fn process(&self, buffer: PcmBuffer, preset: &Preset) -> PcmBuffer {
        let mut buf = buffer.into_mono();
        if buf.is_empty() {
            return buf;
        }
        let sr = buf.sample_rate;
        let x = &mut buf.samples;

        if self.stages.noise_reduction && preset.noise_reduction != NrStrength::Off {
            log::debug!(
                "master: noise reduction {:?} via {}",
                preset.noise_reduction,
                self.caps.noise_reduction.name()
            );
            self.caps.noise_reduction.reduce(x, sr, preset.noise_reduction);
        }

        if self.stages.equalizer {
            log::debug!(
                "master: eq {} via {}",
                preset.eq_profile,
                self.caps.equalization.name()
            );
            self.caps.equalization.equalize(x, sr, preset.eq_profile);
        }

        if self.stages.compressor {
            compress(x, sr, &preset.compressor);
        }

        if self.stages.normalize {
            let gain = normalize_loudness(x, sr, preset.lufs_target);
            log::debug!("master: normalised to {} LUFS ({gain:+.2} dB)", preset.lufs_target);
        }

        if self.stages.limiter {
            limit(x, preset.peak_ceiling_db);
        } else {
            sanitize(x);
        }

        buf
    }

    /// Normalise each raw utterance to the preset's per-utterance target.
    /// No-op when the preset has level matching off.
    pub fn match_levels(&self, buffers: &mut [PcmBuffer], preset: &Preset) {
        let Some(target) = preset.level_match_target else {
            return;
        };
        log::debug!("master: level matching {} utterance(s) to {target} LUFS", buffers.len());
        for buf in buffers.iter_mut() {
            let sr = buf.sample_rate;
            normalize_loudness(&mut buf.samples, sr, target);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
