//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::QcConfig;
use crate::background::DuckingConfig;
use crate::export::ExportFormat;
use crate::text::{MarkupOptions, DEFAULT_VOICE_ID};

// ---------------------------------------------------------------------------
// SynthConfig
// ---------------------------------------------------------------------------

/// Settings for the Piper speech engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Piper executable name or path.
    pub piper_bin: String,
    /// Directory holding `<voice>.onnx` + `<voice>.onnx.json`.  `None`
    /// means [`AppPaths::models_dir`].
    pub models_dir: Option<PathBuf>,
    /// Voice used when a request does not name one.
    pub default_voice: String,
    /// Upper bound for a single synthesis call.
    pub timeout_secs: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            piper_bin: "piper".into(),
            models_dir: None,
            default_voice: DEFAULT_VOICE_ID.into(),
            timeout_secs: 60,
        }
    }
}

// ---------------------------------------------------------------------------
// RenderConfig
// ---------------------------------------------------------------------------

/// Settings for assembling and writing renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Preset applied when a request names none.
    pub default_preset: Option<String>,
    /// Crossfade between consecutive utterances.
    pub crossfade_ms: u32,
    /// Where rendered files land.  `None` means [`AppPaths::outputs_dir`].
    pub output_dir: Option<PathBuf>,
    /// Write a `<file>.meta.json` sidecar next to every render.
    pub write_sidecar: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_preset: None,
            crossfade_ms: 10,
            output_dir: None,
            write_sidecar: true,
        }
    }
}

// ---------------------------------------------------------------------------
// DspConfig
// ---------------------------------------------------------------------------

/// Per-stage switches for the mastering chain.
///
/// A disabled stage is bypassed for every render regardless of preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DspConfig {
    pub noise_reduction: bool,
    pub equalizer: bool,
    pub compressor: bool,
    pub loudness_normalization: bool,
    pub limiter: bool,
}

impl Default for DspConfig {
    fn default() -> Self {
        Self {
            noise_reduction: true,
            equalizer: true,
            compressor: true,
            loudness_normalization: true,
            limiter: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ExportConfig
// ---------------------------------------------------------------------------

/// Settings for encoding the final artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// ffmpeg executable name or path (compressed formats only).
    pub ffmpeg_bin: String,
    /// Format used when a request names none.
    pub default_format: ExportFormat,
    /// MP3 bitrate passed to `libmp3lame`.
    pub mp3_bitrate: String,
    /// Vorbis quality (`-q:a`).
    pub ogg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".into(),
            default_format: ExportFormat::Wav,
            mp3_bitrate: "192k".into(),
            ogg_quality: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// BackgroundSettings
// ---------------------------------------------------------------------------

/// Defaults for background beds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundSettings {
    /// Directory with ambience files (`rain.wav`, `cafe.wav`, …).  `None`
    /// means [`AppPaths::fx_dir`].
    pub fx_dir: Option<PathBuf>,
    /// Ducking applied when a request enables it without parameters.
    pub ducking: DuckingConfig,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            fx_dir: None,
            ducking: DuckingConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use voice_render::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub synth: SynthConfig,
    pub render: RenderConfig,
    pub dsp: DspConfig,
    pub export: ExportConfig,
    pub background: BackgroundSettings,
    /// Markup flattening rules and limits.
    pub markup: MarkupOptions,
    /// Quality-control thresholds.
    pub quality: QcConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// so callers never need to special-case a missing file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Models directory, falling back to the platform default.
    pub fn models_dir(&self, paths: &AppPaths) -> PathBuf {
        self.synth
            .models_dir
            .clone()
            .unwrap_or_else(|| paths.models_dir.clone())
    }

    /// Ambience directory, falling back to the platform default.
    pub fn fx_dir(&self, paths: &AppPaths) -> PathBuf {
        self.background
            .fx_dir
            .clone()
            .unwrap_or_else(|| paths.fx_dir.clone())
    }

    /// Output directory, falling back to the platform default.
    pub fn output_dir(&self, paths: &AppPaths) -> PathBuf {
        self.render
            .output_dir
            .clone()
            .unwrap_or_else(|| paths.outputs_dir.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
