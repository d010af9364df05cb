//! Render runner: request → timeline → PCM → mastered artifact.
//!
//! [`Renderer`] owns the read-only pieces of a render (synthesis adapter,
//! mastering chain, exporter, settings) and can run any number of jobs
//! concurrently; each job keeps its buffers to itself.
//!
//! # Pipeline flow
//!
//! ```text
//! RenderRequest
//!   └─▶ validate + build timeline                         [Prepare 5]
//!         └─▶ synth.synthesize per utterance (timeout)    [Synthesis 10‥55]
//!               └─▶ pre-gain, level match, assemble       [Assembled 60]
//!                     └─▶ spawn_blocking(chain.process)   [Mastered 75]
//!                           └─▶ background bed + ducking  [Background 85]
//!                                 └─▶ measure_metrics     [Quality 90]
//!                                       └─▶ export + sidecar  [Export 95, Done 100]
//! ```
//!
//! CPU-bound stages run on `tokio::task::spawn_blocking` so the runtime
//! never stalls.  Dropping the render future cancels the job; an in-flight
//! Piper child process is killed with it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use super::request::RenderRequest;
use super::state::{ProgressReporter, RenderStage};
use crate::audio::{measure_metrics, Assembler, MetricsRecord, PcmBuffer};
use crate::background::mix_background;
use crate::config::{AppConfig, AppPaths};
use crate::export::{output_path, ExportError, ExportFormat, Exporter};
use crate::master::{MasteringChain, Preset};
use crate::synth::{SynthError, SynthesisAdapter};
use crate::text::{MarkupError, Utterance};

/// Timeline entries copied into the sidecar.
const SIDECAR_TIMELINE_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// RenderError
// ---------------------------------------------------------------------------

/// Why a render failed.  Each variant is a distinct kind so callers can, for
/// example, offer another format after an export failure.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The request was rejected before any synthesis.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// The synthesis adapter failed, timed out, or the voice is missing.
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthError),

    /// The artifact could not be written in the requested format.
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// Unexpected failure inside the runner (e.g. a blocking task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<MarkupError> for RenderError {
    fn from(e: MarkupError) -> Self {
        RenderError::InputValidation(e.to_string())
    }
}

impl RenderError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RenderError::InputValidation(_) => "input_validation",
            RenderError::Synthesis(_) => "synthesis_failure",
            RenderError::Export(_) => "export_failure",
            RenderError::Internal(_) => "internal",
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// A finished in-memory render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    /// Final mono audio.
    pub buffer: PcmBuffer,
    pub metrics: MetricsRecord,
    pub preset: Preset,
    pub timeline: Vec<Utterance>,
}

/// A render written to disk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub output_path: PathBuf,
    pub format: ExportFormat,
    pub metrics: MetricsRecord,
    pub sidecar_path: Option<PathBuf>,
}

/// Contents of `<file>.meta.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sidecar {
    pub engine: String,
    pub preset: String,
    pub voices: Vec<String>,
    pub timeline: Vec<Utterance>,
    /// Seconds, rounded to milliseconds.
    pub duration: f64,
    pub sample_rate: u32,
    pub metrics: MetricsRecord,
    /// Unix seconds.
    pub created_at: u64,
    pub export: ExportFormat,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Runs render jobs.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use voice_render::config::{AppConfig, AppPaths};
/// use voice_render::pipeline::{ProgressReporter, RenderRequest, Renderer};
/// use voice_render::synth::PiperEngine;
///
/// # async fn example() {
/// let config = AppConfig::load().unwrap_or_default();
/// let paths = AppPaths::new();
/// let synth = Arc::new(PiperEngine::from_config(&config, &paths));
/// let renderer = Renderer::new(synth, config, &paths);
///
/// let req = RenderRequest::from_text("Welcome to the show.");
/// let result = renderer.render_to_dir(&req, &ProgressReporter::silent()).await.unwrap();
/// println!("{} (score {})", result.output_path.display(), result.metrics.quality_score);
/// # }
/// ```
pub struct Renderer {
    synth: Arc<dyn SynthesisAdapter>,
    chain: MasteringChain,
    exporter: Exporter,
    config: AppConfig,
    fx_dir: PathBuf,
    output_dir: PathBuf,
}

impl Renderer {
    /// Build a renderer.  The mastering chain's capabilities are detected
    /// once here.
    pub fn new(synth: Arc<dyn SynthesisAdapter>, config: AppConfig, paths: &AppPaths) -> Self {
        Self {
            chain: MasteringChain::from_config(&config.dsp),
            exporter: Exporter::new(config.export.clone()),
            fx_dir: config.fx_dir(paths),
            output_dir: config.output_dir(paths),
            synth,
            config,
        }
    }

    pub fn with_fx_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fx_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // In-memory render
    // -----------------------------------------------------------------------

    /// Run every stage up to and including quality control.
    pub async fn render(
        &self,
        req: &RenderRequest,
        progress: &ProgressReporter,
    ) -> Result<RenderOutput, RenderError> {
        // ── 1. Prepare ────────────────────────────────────────────────────
        let timeline = req.build_timeline(&self.config)?;
        let preset = req.resolve_preset(&self.config);
        log::info!(
            "render: {} utterance(s), preset {}, engine {}",
            timeline.len(),
            preset.key,
            self.synth.name()
        );
        progress.stage(RenderStage::Prepare);

        // ── 2. Synthesis ──────────────────────────────────────────────────
        let buffers = self.synthesize_all(&timeline, progress).await?;

        // ── 3. Level match + assemble ─────────────────────────────────────
        let breaks: Vec<u32> = timeline.iter().map(|u| u.breaks_after_ms).collect();
        let assembler = Assembler::new(req.crossfade_ms(&self.config));
        let chain = self.chain.clone();
        let p = preset.clone();
        let assembled = blocking(move || {
            let mut buffers = buffers;
            chain.match_levels(&mut buffers, &p);
            assembler.assemble(buffers, &breaks)
        })
        .await?;
        log::debug!("render: assembled {:.2}s", assembled.duration_secs());
        progress.stage(RenderStage::Assembled);

        // ── 4. Mastering ──────────────────────────────────────────────────
        let chain = self.chain.clone();
        let p = preset.clone();
        let mastered = blocking(move || chain.process(assembled, &p)).await?;
        progress.stage(RenderStage::Mastered);

        // ── 5. Background ─────────────────────────────────────────────────
        let mixed = match req.background.clone() {
            Some(bg) => {
                let fx_dir = self.fx_dir.clone();
                let defaults = self.config.background.ducking;
                blocking(move || mix_background(mastered, &bg, &fx_dir, &defaults)).await?
            }
            None => mastered,
        };
        progress.stage(RenderStage::Background);

        // ── 6. Quality ────────────────────────────────────────────────────
        let qc = self.config.quality.clone();
        let (buffer, metrics) = blocking(move || {
            let metrics = measure_metrics(&mixed, &qc);
            (mixed, metrics)
        })
        .await?;
        log::info!(
            "render: {:.2}s, {:.1} LUFS, score {}",
            metrics.duration_sec,
            metrics.lufs_integrated,
            metrics.quality_score
        );
        progress.stage(RenderStage::Quality);

        Ok(RenderOutput {
            buffer,
            metrics,
            preset,
            timeline,
        })
    }

    async fn synthesize_all(
        &self,
        timeline: &[Utterance],
        progress: &ProgressReporter,
    ) -> Result<Vec<PcmBuffer>, RenderError> {
        let limit = Duration::from_secs(self.config.synth.timeout_secs.max(1));
        let mut buffers = Vec::with_capacity(timeline.len());
        progress.synthesized(0, timeline.len());

        for (i, u) in timeline.iter().enumerate() {
            let call = self.synth.synthesize(&u.voice_id, &u.text, u.speed);
            let mut buf = tokio::time::timeout(limit, call)
                .await
                .map_err(|_| SynthError::Timeout(limit.as_secs()))??
                .into_mono();
            buf.apply_gain_db(u.pre_gain_db);
            log::debug!(
                "render: utterance {}/{} → {:.2}s @ {} Hz",
                i + 1,
                timeline.len(),
                buf.duration_secs(),
                buf.sample_rate
            );
            buffers.push(buf);
            progress.synthesized(i + 1, timeline.len());
        }
        Ok(buffers)
    }

    // -----------------------------------------------------------------------
    // Render to disk
    // -----------------------------------------------------------------------

    /// Render, export to the output directory and write the sidecar.
    pub async fn render_to_dir(
        &self,
        req: &RenderRequest,
        progress: &ProgressReporter,
    ) -> Result<RenderResult, RenderError> {
        let output = self.render(req, progress).await?;
        let format = req.format(&self.config);
        let dir = req.output_dir.clone().unwrap_or_else(|| self.output_dir.clone());
        let stem = match req.output_name.as_deref() {
            Some(name) if !sanitize_stem(name).is_empty() => sanitize_stem(name),
            _ => unique_stem(&output.preset.key),
        };
        let path = output_path(&dir, &stem, format);

        self.exporter.export(&output.buffer, format, &path).await?;
        progress.stage(RenderStage::Export);

        let sidecar_path = if self.config.render.write_sidecar {
            let sidecar = self.sidecar(&output, format);
            match write_sidecar(&path, &sidecar).await {
                Ok(p) => Some(p),
                Err(e) => {
                    log::warn!("render: sidecar for {} not written: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };

        progress.stage(RenderStage::Done);
        Ok(RenderResult {
            output_path: path,
            format,
            metrics: output.metrics,
            sidecar_path,
        })
    }

    fn sidecar(&self, output: &RenderOutput, format: ExportFormat) -> Sidecar {
        let voices: BTreeSet<&str> = output.timeline.iter().map(|u| u.voice_id.as_str()).collect();
        Sidecar {
            engine: self.synth.name().to_string(),
            preset: output.preset.key.clone(),
            voices: voices.into_iter().map(String::from).collect(),
            timeline: output
                .timeline
                .iter()
                .take(SIDECAR_TIMELINE_LIMIT)
                .cloned()
                .collect(),
            duration: (output.buffer.duration_secs() * 1000.0).round() / 1000.0,
            sample_rate: output.buffer.sample_rate,
            metrics: output.metrics.clone(),
            created_at: unix_now(),
            export: format,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run CPU-bound work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, RenderError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RenderError::Internal(e.to_string()))
}

/// `<file>.meta.json` next to the artifact.
pub fn sidecar_path(artifact: &Path) -> PathBuf {
    let mut name = artifact.file_name().unwrap_or_default().to_os_string();
    name.push(".meta.json");
    artifact.with_file_name(name)
}

async fn write_sidecar(artifact: &Path, sidecar: &Sidecar) -> Result<PathBuf, ExportError> {
    let path = sidecar_path(artifact);
    let json = serde_json::to_vec_pretty(sidecar)
        .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;
    tokio::fs::write(&path, json).await?;
    Ok(path)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Keep ASCII alphanumerics, `-` and `_`; everything else becomes `_`.
fn sanitize_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    cleaned.trim_matches('_').to_string()
}

/// `render-<preset>-<unix secs>-<hex>`, unique within the process.
fn unique_stem(preset_key: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "render-{}-{}-{:06x}",
        sanitize_stem(preset_key),
        unix_now(),
        (nanos ^ n.wrapping_mul(0x9E37_79B9)) & 0xFF_FFFF
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
