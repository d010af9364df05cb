//! Voice model resolution.
//!
//! A voice id maps to two files in the models directory:
//!
//! ```text
//! <models>/<voice_id>.onnx        the network
//! <models>/<voice_id>.onnx.json   its config (sample rate lives here)
//! ```

use std::path::{Path, PathBuf};

use super::engine::SynthError;
use crate::audio::DEFAULT_SAMPLE_RATE;

/// On-disk location and output rate of one voice.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceModel {
    pub voice_id: String,
    pub onnx_path: PathBuf,
    pub config_path: PathBuf,
    pub sample_rate: u32,
}

impl VoiceModel {
    /// Resolve `voice_id` under `models_dir`.
    ///
    /// # Errors
    ///
    /// [`SynthError::VoiceNotFound`] when the id is empty, contains a path
    /// component, or the `.onnx` file does not exist.
    pub fn resolve(models_dir: &Path, voice_id: &str) -> Result<Self, SynthError> {
        let id = voice_id.trim();
        if id.is_empty() || id.contains(&['/', '\\'][..]) || id.contains("..") {
            return Err(SynthError::VoiceNotFound(voice_id.to_string()));
        }

        let onnx_path = models_dir.join(format!("{id}.onnx"));
        if !onnx_path.is_file() {
            return Err(SynthError::VoiceNotFound(format!(
                "{id} (no model at {})",
                onnx_path.display()
            )));
        }
        let config_path = models_dir.join(format!("{id}.onnx.json"));
        let sample_rate = read_sample_rate(&config_path);

        Ok(Self {
            voice_id: id.to_string(),
            onnx_path,
            config_path,
            sample_rate,
        })
    }
}

/// Sample rate from a voice config: `audio.sample_rate`, then top-level
/// `sample_rate`, then [`DEFAULT_SAMPLE_RATE`].  Unreadable configs fall
/// back silently.
pub fn read_sample_rate(config_path: &Path) -> u32 {
    let Ok(raw) = std::fs::read_to_string(config_path) else {
        return DEFAULT_SAMPLE_RATE;
    };
    let json: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("synth: ignoring unparsable {}: {e}", config_path.display());
            return DEFAULT_SAMPLE_RATE;
        }
    };
    json.pointer("/audio/sample_rate")
        .or_else(|| json.get("sample_rate"))
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Voice ids with a model in `models_dir`, sorted.
pub fn list_voices(models_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(models_dir) else {
        return Vec::new();
    };
    let mut voices: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            name.strip_suffix(".onnx").map(str::to_string)
        })
        .collect();
    voices.sort();
    voices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn models() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("en_US-amy-low.onnx"), b"").unwrap();
        std::fs::write(
            dir.path().join("en_US-amy-low.onnx.json"),
            r#"{"audio":{"sample_rate":16000}}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("de_DE-x.onnx"), b"").unwrap();
        std::fs::write(dir.path().join("de_DE-x.onnx.json"), r#"{"sample_rate":24000}"#).unwrap();
        std::fs::write(dir.path().join("fr_FR-y.onnx"), b"").unwrap();
        dir
    }

    #[test]
    fn nested_sample_rate() {
        let dir = models();
        let m = VoiceModel::resolve(dir.path(), "en_US-amy-low").unwrap();
        assert_eq!(m.sample_rate, 16_000);
        assert!(m.onnx_path.ends_with("en_US-amy-low.onnx"));
    }

    #[test]
    fn top_level_sample_rate() {
        let dir = models();
        assert_eq!(VoiceModel::resolve(dir.path(), "de_DE-x").unwrap().sample_rate, 24_000);
    }

    #[test]
    fn missing_config_defaults() {
        let dir = models();
        assert_eq!(
            VoiceModel::resolve(dir.path(), "fr_FR-y").unwrap().sample_rate,
            DEFAULT_SAMPLE_RATE
        );
    }

    #[test]
    fn garbage_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("x.onnx.json");
        std::fs::write(&p, "{not json").unwrap();
        assert_eq!(read_sample_rate(&p), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn unknown_and_unsafe_ids_are_not_found() {
        let dir = models();
        for id in ["nope", "", "../etc/passwd", "a/b"] {
            assert!(
                matches!(VoiceModel::resolve(dir.path(), id), Err(SynthError::VoiceNotFound(_))),
                "{id:?} resolved"
            );
        }
    }

    #[test]
    fn lists_installed_voices() {
        let dir = models();
        assert_eq!(list_voices(dir.path()), vec!["de_DE-x", "en_US-amy-low", "fr_FR-y"]);
        assert!(list_voices(Path::new("/definitely/not/here")).is_empty());
    }
}
