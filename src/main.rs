//! Command-line entry point for voice-render.
//!
//! # Startup sequence
//!
//! 1. Initialise logging (`RUST_LOG`, default `info`).
//! 2. Parse the command line.
//! 3. Load [`AppConfig`] from disk (defaults on first run or a bad file).
//! 4. Run the subcommand:
//!    - `render`:  synthesise, master and export one request.
//!    - `presets`: list the built-in mastering presets.
//!    - `check`:   probe Piper, ffmpeg and the installed voices.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use voice_render::{
    background::{BackgroundConfig, BedSource, DuckingChoice},
    config::{AppConfig, AppPaths},
    export::ExportFormat,
    master::Preset,
    pipeline::{EngineHealth, Progress, ProgressReporter, RenderRequest, Renderer, ToolStatus},
    synth::PiperEngine,
};

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Render text or markup to mastered speech audio.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one request to a file
    Render(RenderArgs),

    /// List built-in mastering presets
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the synthesis engine and encoder
    Check {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Text to speak (or markup with --markup)
    input: Option<String>,

    /// Read the input from a file; `.ssml` and `.xml` files are read as markup
    #[arg(short, long, conflicts_with = "input")]
    file: Option<PathBuf>,

    /// Treat the input as markup
    #[arg(long)]
    markup: bool,

    /// Full JSON render request; other flags override its fields
    #[arg(long)]
    request: Option<PathBuf>,

    /// Voice id for unvoiced text
    #[arg(short, long)]
    voice: Option<String>,

    /// Speaking speed (0.5 to 2.0)
    #[arg(short, long)]
    speed: Option<f64>,

    /// Mastering preset key
    #[arg(short, long)]
    preset: Option<String>,

    /// Output format: wav, mp3, flac, m4a, ogg
    #[arg(short = 'F', long)]
    format: Option<String>,

    /// Ambience kind (rain, cafe, ...) or path to a bed file
    #[arg(long)]
    background: Option<String>,

    /// Linear background gain (0 to 1)
    #[arg(long, requires = "background")]
    bg_gain: Option<f64>,

    /// Duck the background under the voice
    #[arg(long, requires = "background")]
    duck: bool,

    /// Output directory
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Output file name without extension
    #[arg(short, long)]
    name: Option<String>,
}

// ---------------------------------------------------------------------------
// Request building
// ---------------------------------------------------------------------------

fn is_markup_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("ssml" | "xml")
    )
}

fn build_request(args: RenderArgs) -> Result<RenderRequest> {
    let mut req = match &args.request {
        Some(path) => {
            let raw = std::fs::read(path)
                .with_context(|| format!("reading request {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("parsing request {}", path.display()))?
        }
        None => RenderRequest::default(),
    };

    let (input, as_markup) = match (&args.file, args.input) {
        (Some(path), _) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            (Some(body), args.markup || is_markup_file(path))
        }
        (None, input) => (input, args.markup),
    };
    if let Some(body) = input {
        if as_markup {
            req.markup = Some(body);
        } else {
            req.text = Some(body);
        }
    }

    if args.voice.is_some() {
        req.voice_id = args.voice;
    }
    if args.speed.is_some() {
        req.speed = args.speed;
    }
    if args.preset.is_some() {
        req.preset = args.preset;
    }
    if let Some(format) = args.format {
        req.format = Some(format.parse::<ExportFormat>()?);
    }
    if let Some(bg) = args.background {
        let source = if Path::new(&bg).extension().is_some() {
            BedSource::Path(PathBuf::from(bg))
        } else {
            BedSource::Kind(bg)
        };
        req.background = Some(BackgroundConfig {
            gain: args.bg_gain,
            ducking: args.duck.then_some(DuckingChoice::Enabled(true)),
            ..BackgroundConfig::new(source)
        });
    }
    if args.out_dir.is_some() {
        req.output_dir = args.out_dir;
    }
    if args.name.is_some() {
        req.output_name = args.name;
    }

    if req.text.is_none() && req.markup.is_none() && req.timeline.is_none() {
        bail!("nothing to render: pass text, --file or --request");
    }
    Ok(req)
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

async fn run_render(args: RenderArgs, config: AppConfig, paths: &AppPaths) -> Result<()> {
    let req = build_request(args)?;
    let synth = Arc::new(PiperEngine::from_config(&config, paths));
    let renderer = Renderer::new(synth, config, paths);

    let (tx, mut rx) = mpsc::channel::<Progress>(32);
    let printer = tokio::spawn(async move {
        while let Some(p) = rx.recv().await {
            eprintln!("{:>3}%  {}", p.percent, p.stage.label());
        }
    });

    let result = renderer.render_to_dir(&req, &ProgressReporter::new(tx)).await;
    // The reporter (and its sender) is gone once the render returns.
    let _ = printer.await;

    match result {
        Ok(done) => {
            println!("{}", serde_json::to_string_pretty(&done)?);
            Ok(())
        }
        Err(e) => bail!("render failed ({}): {e}", e.kind()),
    }
}

fn run_presets(json: bool) -> Result<()> {
    let presets = Preset::all();
    if json {
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }
    for p in presets {
        println!(
            "{:<20} {:>6.1} LUFS  ceiling {:>5.1} dB  {}",
            p.key, p.lufs_target, p.peak_ceiling_db, p.title
        );
    }
    Ok(())
}

async fn run_check(json: bool, config: &AppConfig, paths: &AppPaths) -> Result<()> {
    let health = EngineHealth::probe(config, paths).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
    } else {
        print_tool("piper", &health.piper);
        print_tool("ffmpeg", &health.ffmpeg);
        println!("models   {}", health.models_dir.display());
        if health.voices.is_empty() {
            println!("voices   (none)");
        } else {
            println!("voices   {}", health.voices.join(", "));
        }
        if !health.can_encode() {
            println!("note     only wav export is available without ffmpeg");
        }
    }

    if !health.can_synthesize() {
        bail!("synthesis is not available");
    }
    Ok(())
}

fn print_tool(name: &str, status: &ToolStatus) {
    match status {
        ToolStatus::Ok(version) => println!("{name:<8} ok ({version})"),
        ToolStatus::Missing(why) => println!("{name:<8} missing: {why}"),
        ToolStatus::Broken(why) => println!("{name:<8} broken: {why}"),
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let paths = AppPaths::new();
    let settings = cli.config.clone().unwrap_or_else(|| paths.settings_file.clone());
    let config = AppConfig::load_from(&settings).unwrap_or_else(|e| {
        log::warn!("Failed to load config from {} ({e}); using defaults", settings.display());
        AppConfig::default()
    });

    match cli.command {
        Command::Render(args) => run_render(args, config, &paths).await,
        Command::Presets { json } => run_presets(json),
        Command::Check { json } => run_check(json, &config, &paths).await,
    }
}
