//! Render pipeline: request → timeline → audio artifact.
//!
//! # Architecture
//!
//! ```text
//! RenderRequest (text | markup | timeline)
//!        │
//!        ▼
//! Renderer::render_to_dir()  ← async tokio task
//!        │
//!        ├─ validate + build timeline          (request.rs)
//!        ├─ SynthesisAdapter per utterance     (timeout-bounded)
//!        ├─ spawn_blocking(assemble, master, background, QC)
//!        └─ Exporter + <file>.meta.json sidecar
//!
//! ProgressReporter ──try_send──▶ mpsc::Receiver<Progress>  (optional)
//! ```
//!
//! [`EngineHealth`] is a separate startup probe used by the CLI `check`
//! command; the renderer never consults it.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//! use voice_render::config::{AppConfig, AppPaths};
//! use voice_render::pipeline::{Progress, ProgressReporter, RenderRequest, Renderer};
//! use voice_render::synth::PiperEngine;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let paths = AppPaths::new();
//!     let synth = Arc::new(PiperEngine::from_config(&config, &paths));
//!     let renderer = Renderer::new(synth, config, &paths);
//!
//!     let (tx, mut rx) = mpsc::channel::<Progress>(32);
//!     tokio::spawn(async move {
//!         while let Some(p) = rx.recv().await {
//!             println!("{:>3}% {}", p.percent, p.stage.label());
//!         }
//!     });
//!
//!     let req = RenderRequest::from_markup(
//!         r#"<speak>Hello<break time="300ms"/><voice name="en_US-amy-medium">world</voice></speak>"#,
//!     );
//!     let result = renderer.render_to_dir(&req, &ProgressReporter::new(tx)).await.unwrap();
//!     println!("{}", result.output_path.display());
//! }
//! ```

pub mod health;
pub mod request;
pub mod runner;
pub mod state;

pub use health::{EngineHealth, ToolStatus};
pub use request::RenderRequest;
pub use runner::{sidecar_path, RenderError, RenderOutput, RenderResult, Renderer, Sidecar};
pub use state::{synthesis_percent, Progress, ProgressReporter, RenderStage};
