//! Optional DSP backends behind capability traits.
//!
//! The mastering chain never asks "is this backend available?" while it is
//! running.  Instead [`Capabilities::detect`] picks, once, either the real
//! implementation or [`Bypass`] for each optional stage.
//!
//! | Stage | Available | Fallback |
//! |-------|-----------|----------|
//! | Noise reduction | [`SpectralGate`](super::denoise::SpectralGate) (feature `spectral-denoise`) | [`Bypass`] |
//! | Equalisation | [`BiquadEqualizer`] | [`Bypass`] |

use std::sync::Arc;

use super::eq::apply_profile;
use super::preset::{EqProfile, NrStrength};
use crate::config::DspConfig;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Broadband noise removal.
pub trait NoiseReduction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reduce noise in mono `samples` in place.
    fn reduce(&self, samples: &mut [f32], sample_rate: u32, strength: NrStrength);
}

/// Tonal shaping by named profile.
pub trait Equalization: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply `profile` to mono `samples` in place.
    fn equalize(&self, samples: &mut [f32], sample_rate: u32, profile: EqProfile);
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Pass-through used when a backend is unavailable or disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bypass;

impl NoiseReduction for Bypass {
    fn name(&self) -> &'static str {
        "bypass"
    }

    fn reduce(&self, _samples: &mut [f32], _sample_rate: u32, _strength: NrStrength) {}
}

impl Equalization for Bypass {
    fn name(&self) -> &'static str {
        "bypass"
    }

    fn equalize(&self, _samples: &mut [f32], _sample_rate: u32, _profile: EqProfile) {}
}

/// RBJ biquad cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadEqualizer;

impl Equalization for BiquadEqualizer {
    fn name(&self) -> &'static str {
        "biquad"
    }

    fn equalize(&self, samples: &mut [f32], sample_rate: u32, profile: EqProfile) {
        apply_profile(samples, sample_rate, profile);
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The backends a [`MasteringChain`](super::MasteringChain) runs with.
#[derive(Clone)]
pub struct Capabilities {
    pub noise_reduction: Arc<dyn NoiseReduction>,
    pub equalization: Arc<dyn Equalization>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("noise_reduction", &self.noise_reduction.name())
            .field("equalization", &self.equalization.name())
            .finish()
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::detect(&DspConfig::default())
    }
}

impl Capabilities {
    /// Choose a backend for every optional stage from what was compiled in
    /// and what `config` enables.
    pub fn detect(config: &DspConfig) -> Self {
        let caps = Self {
            noise_reduction: noise_backend(config.noise_reduction),
            equalization: if config.equalizer {
                Arc::new(BiquadEqualizer)
            } else {
                Arc::new(Bypass)
            },
        };
        log::debug!("master: capabilities {caps:?}");
        caps
    }

    /// Every optional stage bypassed.
    pub fn bypass() -> Self {
        Self {
            noise_reduction: Arc::new(Bypass),
            equalization: Arc::new(Bypass),
        }
    }
}

#[cfg(feature = "spectral-denoise")]
fn noise_backend(enabled: bool) -> Arc<dyn NoiseReduction> {
    if enabled {
        Arc::new(super::denoise::SpectralGate::new())
    } else {
        Arc::new(Bypass)
    }
}

#[cfg(not(feature = "spectral-denoise"))]
fn noise_backend(enabled: bool) -> Arc<dyn NoiseReduction> {
    if enabled {
        log::warn!("master: built without spectral-denoise, noise reduction bypassed");
    }
    Arc::new(Bypass)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_stages_bypass() {
        let caps = Capabilities::detect(&DspConfig {
            noise_reduction: false,
            equalizer: false,
            ..DspConfig::default()
        });
        assert_eq!(caps.noise_reduction.name(), "bypass");
        assert_eq!(caps.equalization.name(), "bypass");
    }

    #[test]
    fn enabled_equalizer_is_biquad() {
        let caps = Capabilities::detect(&DspConfig::default());
        assert_eq!(caps.equalization.name(), "biquad");
    }

    #[cfg(feature = "spectral-denoise")]
    #[test]
    fn spectral_gate_when_compiled_in() {
        let caps = Capabilities::detect(&DspConfig::default());
        assert_eq!(caps.noise_reduction.name(), "spectral-gate");
    }

    #[test]
    fn bypass_leaves_samples_alone() {
        let caps = Capabilities::bypass();
        let mut x = vec![0.1, -0.2, 0.3];
        caps.noise_reduction.reduce(&mut x, 16_000, NrStrength::Strong);
        caps.equalization.equalize(&mut x, 16_000, EqProfile::Brightness);
        assert_eq!(x, vec![0.1, -0.2, 0.3]);
    }
}
