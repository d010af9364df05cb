//! Startup probe of the external tools a render depends on.
//!
//! [`EngineHealth::probe`] runs each binary once with its version flag and
//! records what it found.  The result is a plain value: the `check` command
//! prints it, nothing in the render path reads it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;

use crate::config::{AppConfig, AppPaths};
use crate::synth::list_voices;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of running one external binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ToolStatus {
    /// Ran and exited successfully; holds the first line of its output.
    Ok(String),
    /// Could not be started.
    Missing(String),
    /// Started but failed or hung.
    Broken(String),
}

impl ToolStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, ToolStatus::Ok(_))
    }
}

/// Snapshot of the render engine's environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineHealth {
    pub piper: ToolStatus,
    pub ffmpeg: ToolStatus,
    pub models_dir: PathBuf,
    /// Voice ids found under `models_dir`.
    pub voices: Vec<String>,
}

impl EngineHealth {
    pub async fn probe(config: &AppConfig, paths: &AppPaths) -> Self {
        let models_dir = config.models_dir(paths);
        let (piper, ffmpeg) = tokio::join!(
            probe_tool(&config.synth.piper_bin, "--version"),
            probe_tool(&config.export.ffmpeg_bin, "-version"),
        );
        let voices = list_voices(&models_dir);
        log::info!(
            "health: piper {}, ffmpeg {}, {} voice(s) in {}",
            status_word(&piper),
            status_word(&ffmpeg),
            voices.len(),
            models_dir.display()
        );
        Self {
            piper,
            ffmpeg,
            models_dir,
            voices,
        }
    }

    /// Piper runs and at least one voice is installed.
    pub fn can_synthesize(&self) -> bool {
        self.piper.is_ok() && !self.voices.is_empty()
    }

    /// Only WAV export works without ffmpeg.
    pub fn can_encode(&self) -> bool {
        self.ffmpeg.is_ok()
    }
}

fn status_word(s: &ToolStatus) -> &'static str {
    match s {
        ToolStatus::Ok(_) => "ok",
        ToolStatus::Missing(_) => "missing",
        ToolStatus::Broken(_) => "broken",
    }
}

async fn probe_tool(bin: impl AsRef<Path>, flag: &str) -> ToolStatus {
    let bin = bin.as_ref();
    let child = Command::new(bin)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(PROBE_TIMEOUT, child).await {
        Err(_) => ToolStatus::Broken(format!("no answer within {}s", PROBE_TIMEOUT.as_secs())),
        Ok(Err(e)) => ToolStatus::Missing(format!("{}: {e}", bin.display())),
        Ok(Ok(out)) if out.status.success() => {
            // Some tools print their version on stderr.
            let text = if out.stdout.is_empty() { &out.stderr } else { &out.stdout };
            let first = String::from_utf8_lossy(text)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
            ToolStatus::Ok(first)
        }
        Ok(Ok(out)) => ToolStatus::Broken(format!("exited with {}", out.status)),
    }
}
