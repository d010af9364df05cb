//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings):
//!   Windows: %APPDATA%\voice-render\
//!   macOS:   ~/Library/Application Support/voice-render/
//!   Linux:   ~/.config/voice-render/
//!
//! Data dir (voices, ambience beds, renders):
//!   Windows: %LOCALAPPDATA%\voice-render\{models,fx,outputs}
//!   macOS:   ~/Library/Application Support/voice-render/{models,fx,outputs}
//!   Linux:   ~/.local/share/voice-render/{models,fx,outputs}

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml`.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Piper voice models (`<voice>.onnx` + `<voice>.onnx.json`).
    pub models_dir: PathBuf,
    /// Named ambience beds.
    pub fx_dir: PathBuf,
    /// Rendered files and their sidecars.
    pub outputs_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "voice-render";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            config_dir,
            models_dir: data_dir.join("models"),
            fx_dir: data_dir.join("fx"),
            outputs_dir: data_dir.join("outputs"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_non_empty() {
        let paths = AppPaths::new();
        assert!(paths.config_dir.to_str().is_some_and(|s| !s.is_empty()));
        assert!(paths
            .settings_file
            .file_name()
            .is_some_and(|n| n == "settings.toml"));
        assert!(paths.models_dir.ends_with("models"));
        assert!(paths.fx_dir.ends_with("fx"));
        assert!(paths.outputs_dir.ends_with("outputs"));
    }
}
