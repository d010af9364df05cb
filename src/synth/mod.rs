//! Speech synthesis adapters.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │             SynthesisAdapter (trait)               │
//! │                                                    │
//! │   ┌─────────────┐      ┌──────────────┐            │
//! │   │ VoiceModel  │      │ PiperEngine  │            │
//! │   │ - resolve   │─────▶│ - bin        │            │
//! │   │ - rate      │      │ - models_dir │            │
//! │   └─────────────┘      └──────┬───────┘            │
//! │                               ▼                    │
//! │                   (voice, text, speed) → PCM       │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use voice_render::synth::{PiperEngine, SynthesisAdapter};
//!
//! # async fn run() {
//! let engine = PiperEngine::new("piper", "models");
//! let pcm = engine.synthesize("en_GB-alan-medium", "Hello there.", 1.0).await.unwrap();
//! println!("{} samples @ {} Hz", pcm.samples.len(), pcm.sample_rate);
//! # }
//! ```

pub mod engine;
pub mod model;
pub mod piper;

pub use engine::{SynthError, SynthesisAdapter};
pub use model::{list_voices, read_sample_rate, VoiceModel};
pub use piper::{decode_pcm16_le, length_scale, PiperEngine};

#[cfg(test)]
pub use engine::MockSynth;
