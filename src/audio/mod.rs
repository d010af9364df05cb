//! Audio primitives: buffers, resampling, assembly, loudness and QC.
//!
//! # Pipeline
//!
//! ```text
//! per-utterance PcmBuffer → Assembler (gap + crossfade)
//!           → master::MasteringChain → background mix → measure_metrics
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use voice_render::audio::{integrated_loudness, Assembler, PcmBuffer};
//!
//! let tone: Vec<f32> = (0..8_000)
//!     .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
//!     .collect();
//! let a = PcmBuffer::mono(tone.clone(), 16_000);
//! let b = PcmBuffer::mono(tone, 16_000);
//!
//! let joined = Assembler::default().assemble(vec![a, b], &[200]);
//! println!("{:.1} LUFS", integrated_loudness(&joined.samples, joined.sample_rate));
//! ```

pub mod assemble;
pub mod buffer;
pub mod loudness;
pub mod quality;
pub mod resample;
pub mod wav;

pub use assemble::{Assembler, DEFAULT_SAMPLE_RATE};
pub use buffer::{db_to_linear, linear_to_db, ms_to_samples, sanitize, PcmBuffer, DB_FLOOR};
pub use loudness::{integrated_loudness, is_measurable, normalize_loudness, UNMEASURABLE_LUFS};
pub use quality::{measure_metrics, MetricsRecord, QcConfig};
pub use resample::{downmix, resample_fft, resample_linear, resample_nearest};
pub use wav::{encode_wav_pcm16, read_wav, read_wav_bytes, write_wav_pcm16};
