//! Render stages and best-effort progress reporting.
//!
//! [`RenderStage`] names the milestones a render passes through.  The
//! [`ProgressReporter`] pushes a [`Progress`] value onto an optional
//! `tokio::sync::mpsc` channel after each one.  Delivery is never awaited
//! and never fails the render: a full or closed channel just drops the
//! update.
//!
//! ```text
//! Prepare(5) ─▶ Synthesis(10‥55) ─▶ Assembled(60) ─▶ Mastered(75)
//!            ─▶ Background(85) ─▶ Quality(90) ─▶ Export(95) ─▶ Done(100)
//! ```

use serde::Serialize;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// RenderStage
// ---------------------------------------------------------------------------

/// Milestones of one render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStage {
    /// Request validated and timeline built.
    Prepare,
    /// Utterances being synthesised.
    Synthesis,
    /// Utterances joined into one buffer.
    Assembled,
    /// Mastering chain finished.
    Mastered,
    /// Background bed mixed (or skipped).
    Background,
    /// Metrics measured.
    Quality,
    /// Artifact written.
    Export,
    Done,
}

impl RenderStage {
    /// Percentage reported when the stage completes.  For
    /// [`Synthesis`](Self::Synthesis) this is the start of its 10–55 band.
    pub fn percent(self) -> u8 {
        match self {
            RenderStage::Prepare => 5,
            RenderStage::Synthesis => 10,
            RenderStage::Assembled => 60,
            RenderStage::Mastered => 75,
            RenderStage::Background => 85,
            RenderStage::Quality => 90,
            RenderStage::Export => 95,
            RenderStage::Done => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RenderStage::Prepare => "Preparing",
            RenderStage::Synthesis => "Synthesising",
            RenderStage::Assembled => "Assembled",
            RenderStage::Mastered => "Mastered",
            RenderStage::Background => "Background",
            RenderStage::Quality => "Quality check",
            RenderStage::Export => "Exported",
            RenderStage::Done => "Done",
        }
    }
}

/// Progress inside the synthesis band after `done` of `total` utterances.
pub fn synthesis_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 55;
    }
    let frac = done.min(total) as f64 / total as f64;
    (10.0 + 45.0 * frac).round() as u8
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// One progress update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub stage: RenderStage,
    /// 0–100.
    pub percent: u8,
}

/// Best-effort sender of [`Progress`] updates.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<Progress>>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::Sender<Progress>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that drops every update.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Report that `stage` completed.
    pub fn stage(&self, stage: RenderStage) {
        self.send(stage, stage.percent());
    }

    /// Report synthesis progress.
    pub fn synthesized(&self, done: usize, total: usize) {
        self.send(RenderStage::Synthesis, synthesis_percent(done, total));
    }

    fn send(&self, stage: RenderStage, percent: u8) {
        log::debug!("render: {} ({percent}%)", stage.label());
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(Progress { stage, percent });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn milestones_are_monotonic() {
        let order = [
            RenderStage::Prepare,
            RenderStage::Synthesis,
            RenderStage::Assembled,
            RenderStage::Mastered,
            RenderStage::Background,
            RenderStage::Quality,
            RenderStage::Export,
            RenderStage::Done,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(RenderStage::Done.percent(), 100);
    }

    #[test]
    fn synthesis_band() {
        assert_eq!(synthesis_percent(0, 4), 10);
        assert_eq!(synthesis_percent(2, 4), 33);
        assert_eq!(synthesis_percent(4, 4), 55);
        assert_eq!(synthesis_percent(9, 4), 55);
        assert_eq!(synthesis_percent(0, 0), 55);
    }

    #[test]
    fn full_channel_drops_updates() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = ProgressReporter::new(tx);
        reporter.stage(RenderStage::Prepare);
        reporter.stage(RenderStage::Assembled);
        assert_eq!(rx.try_recv().unwrap().percent, 5);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        ProgressReporter::new(tx).stage(RenderStage::Done);
        ProgressReporter::silent().synthesized(1, 2);
    }
}
