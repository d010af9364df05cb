//! Writing the final artifact.
//!
//! WAV is always written in-process as 16-bit PCM through `hound`.  The
//! compressed formats go through an external `ffmpeg`:
//!
//! | Format | ffmpeg codec args |
//! |--------|-------------------|
//! | mp3    | `-c:a libmp3lame -b:a <mp3_bitrate>` |
//! | m4a    | `-c:a aac -b:a <mp3_bitrate>` |
//! | flac   | `-c:a flac` |
//! | ogg    | `-c:a libvorbis -q:a <ogg_quality>` |
//!
//! A missing encoder is reported as [`ExportError::Unavailable`].  The
//! exporter never falls back to a different format on its own.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::audio::{encode_wav_pcm16, PcmBuffer};
use crate::config::ExportConfig;

// ---------------------------------------------------------------------------
// ExportFormat
// ---------------------------------------------------------------------------

/// Container/codec of the rendered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Wav,
    Mp3,
    Flac,
    #[serde(alias = "aac")]
    M4a,
    Ogg,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Wav,
        ExportFormat::Mp3,
        ExportFormat::Flac,
        ExportFormat::M4a,
        ExportFormat::Ogg,
    ];

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Wav => "wav",
            ExportFormat::Mp3 => "mp3",
            ExportFormat::Flac => "flac",
            ExportFormat::M4a => "m4a",
            ExportFormat::Ogg => "ogg",
        }
    }

    /// Whether writing this format needs ffmpeg.
    pub fn needs_encoder(self) -> bool {
        self != ExportFormat::Wav
    }

    /// ffmpeg codec arguments for this format.
    pub fn codec_args(self, cfg: &ExportConfig) -> Vec<String> {
        let quality = cfg.ogg_quality.to_string();
        let args: Vec<&str> = match self {
            ExportFormat::Wav => vec!["-c:a", "pcm_s16le"],
            ExportFormat::Mp3 => vec!["-c:a", "libmp3lame", "-b:a", cfg.mp3_bitrate.as_str()],
            ExportFormat::M4a => vec!["-c:a", "aac", "-b:a", cfg.mp3_bitrate.as_str()],
            ExportFormat::Flac => vec!["-c:a", "flac"],
            ExportFormat::Ogg => vec!["-c:a", "libvorbis", "-q:a", quality.as_str()],
        };
        args.into_iter().map(String::from).collect()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Ok(ExportFormat::Wav),
            "mp3" => Ok(ExportFormat::Mp3),
            "flac" => Ok(ExportFormat::Flac),
            "m4a" | "aac" => Ok(ExportFormat::M4a),
            "ogg" => Ok(ExportFormat::Ogg),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// ExportError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ExportError {
    /// The encoder needed for the format is missing or lacks the codec.
    #[error("no encoder available for {format}: {reason}")]
    Unavailable { format: ExportFormat, reason: String },

    #[error("unknown export format: {0}")]
    UnknownFormat(String),

    /// The encoder ran and failed.
    #[error("encoding to {format} failed: {reason}")]
    Encode { format: ExportFormat, reason: String },

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Exporter
// ---------------------------------------------------------------------------

/// Writes mastered buffers to disk.
#[derive(Debug, Clone)]
pub struct Exporter {
    config: ExportConfig,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(ExportConfig::default())
    }
}

impl Exporter {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Write `buffer` to `path` as `format`.  Parent directories are
    /// created.  Returns the number of bytes written.
    pub async fn export(
        &self,
        buffer: &PcmBuffer,
        format: ExportFormat,
        path: &Path,
    ) -> Result<u64, ExportError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let wav = encode_wav_pcm16(buffer)?;
        if !format.needs_encoder() {
            tokio::fs::write(path, &wav).await?;
        } else {
            self.encode_with_ffmpeg(&wav, format, path).await?;
        }

        let size = tokio::fs::metadata(path).await?.len();
        log::info!("export: wrote {} ({format}, {size} bytes)", path.display());
        Ok(size)
    }

    async fn encode_with_ffmpeg(
        &self,
        wav: &[u8],
        format: ExportFormat,
        path: &Path,
    ) -> Result<(), ExportError> {
        let scratch = tempfile::Builder::new()
            .prefix("voice-render-")
            .suffix(".wav")
            .tempfile()?;
        tokio::fs::write(scratch.path(), wav).await?;

        let output = Command::new(&self.config.ffmpeg_bin)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(scratch.path())
            .args(format.codec_args(&self.config))
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExportError::Unavailable {
                        format,
                        reason: format!("{} not found", self.config.ffmpeg_bin),
                    }
                } else {
                    ExportError::Io(e)
                }
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        // Partial output from a failed run is useless.
        let _ = tokio::fs::remove_file(path).await;
        if is_missing_codec(&stderr) {
            Err(ExportError::Unavailable {
                format,
                reason: stderr,
            })
        } else {
            Err(ExportError::Encode {
                format,
                reason: stderr,
            })
        }
    }
}

fn is_missing_codec(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("unknown encoder") || lower.contains("encoder not found")
}

/// `<dir>/<stem>.<ext>`
pub fn output_path(dir: &Path, stem: &str, format: ExportFormat) -> PathBuf {
    dir.join(format!("{stem}.{}", format.extension()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::read_wav;

    fn tone() -> PcmBuffer {
        PcmBuffer::mono(
            (0..2_205).map(|i| 0.3 * (i as f32 * 0.05).sin()).collect(),
            22_050,
        )
    }

    #[test]
    fn parse_formats() {
        assert_eq!("MP3".parse::<ExportFormat>().unwrap(), ExportFormat::Mp3);
        assert_eq!(".ogg".parse::<ExportFormat>().unwrap(), ExportFormat::Ogg);
        assert_eq!("aac".parse::<ExportFormat>().unwrap(), ExportFormat::M4a);
        assert!(matches!(
            "opus".parse::<ExportFormat>(),
            Err(ExportError::UnknownFormat(_))
        ));
    }

    #[test]
    fn serde_is_lowercase() {
        assert_eq!(serde_json::to_string(&ExportFormat::M4a).unwrap(), "\"m4a\"");
        let f: ExportFormat = serde_json::from_str("\"aac\"").unwrap();
        assert_eq!(f, ExportFormat::M4a);
    }

    #[test]
    fn codec_args_follow_config() {
        let cfg = ExportConfig {
            mp3_bitrate: "128k".into(),
            ogg_quality: 3,
            ..ExportConfig::default()
        };
        assert_eq!(
            ExportFormat::Mp3.codec_args(&cfg),
            vec!["-c:a", "libmp3lame", "-b:a", "128k"]
        );
        assert_eq!(
            ExportFormat::Ogg.codec_args(&cfg),
            vec!["-c:a", "libvorbis", "-q:a", "3"]
        );
        assert_eq!(ExportFormat::Flac.codec_args(&cfg), vec!["-c:a", "flac"]);
    }

    #[tokio::test]
    async fn wav_export_needs_no_encoder() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(&dir.path().join("nested"), "take-1", ExportFormat::Wav);
        let exporter = Exporter::new(ExportConfig {
            ffmpeg_bin: "/no/such/ffmpeg".into(),
            ..ExportConfig::default()
        });

        let size = exporter.export(&tone(), ExportFormat::Wav, &path).await.unwrap();
        assert_eq!(size, 44 + 2 * 2_205);
        let back = read_wav(&path).unwrap();
        assert_eq!(back.sample_rate, 22_050);
        assert_eq!(back.samples.len(), 2_205);
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_unavailable_not_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mp3");
        let exporter = Exporter::new(ExportConfig {
            ffmpeg_bin: "/no/such/ffmpeg".into(),
            ..ExportConfig::default()
        });

        let err = exporter
            .export(&tone(), ExportFormat::Mp3, &path)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Unavailable { format: ExportFormat::Mp3, .. }));
        assert!(!path.exists());
    }

    #[test]
    fn missing_codec_detection() {
        assert!(is_missing_codec("Unknown encoder 'libmp3lame'"));
        assert!(!is_missing_codec("Invalid argument"));
    }
}
