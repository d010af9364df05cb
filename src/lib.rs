//! voice-render: spoken-text rendering and mastering.
//!
//! Text, markup or an explicit timeline goes in; a mastered audio file with
//! quality metrics comes out.
//!
//! | Module | Role |
//! |--------|------|
//! | [`text`] | segmenter, markup flattener, utterance timeline |
//! | [`synth`] | synthesis adapter trait, Piper subprocess engine |
//! | [`audio`] | PCM buffers, WAV I/O, resampling, assembly, loudness, QC |
//! | [`master`] | presets and the mastering chain |
//! | [`background`] | ambience beds and ducking |
//! | [`export`] | WAV and ffmpeg-encoded output |
//! | [`pipeline`] | render jobs, progress, health probe |
//! | [`config`] | settings and platform paths |

pub mod audio;
pub mod background;
pub mod config;
pub mod export;
pub mod master;
pub mod pipeline;
pub mod synth;
pub mod text;
