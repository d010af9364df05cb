//! Mastering: presets, optional DSP backends and the stage chain.
//!
//! # Quick Start
//!
//! ```rust
//! use voice_render::audio::PcmBuffer;
//! use voice_render::master::{MasteringChain, Preset};
//!
//! let voice: Vec<f32> = (0..22_050)
//!     .map(|i| 0.05 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22_050.0).sin())
//!     .collect();
//!
//! let chain = MasteringChain::default();
//! let preset = Preset::lookup(Some("podcast_standard"));
//! let mastered = chain.process(PcmBuffer::mono(voice, 22_050), &preset);
//! assert!(mastered.peak() <= 0.9);
//! ```

pub mod capability;
pub mod chain;
#[cfg(feature = "spectral-denoise")]
pub mod denoise;
pub mod dynamics;
pub mod eq;
pub mod preset;

pub use capability::{BiquadEqualizer, Bypass, Capabilities, Equalization, NoiseReduction};
pub use chain::{MasteringChain, StageSet};
#[cfg(feature = "spectral-denoise")]
pub use denoise::SpectralGate;
pub use dynamics::{compress, limit};
pub use preset::{CompressorParams, EqProfile, NrStrength, Preset, PresetOverrides, PRESET_KEYS};
