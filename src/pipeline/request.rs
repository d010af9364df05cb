//! A fully resolved render request and its conversion into a timeline.
//!
//! A request carries exactly one text source, checked in this order:
//!
//! 1. `timeline`: ready-made utterances, used as given.
//! 2. `markup`: flattened with [`flatten_markup`].
//! 3. `text`: split with [`segment_text`].
//!
//! ```rust
//! use voice_render::config::AppConfig;
//! use voice_render::pipeline::RenderRequest;
//!
//! let req: RenderRequest = serde_json::from_str(
//!     r#"{"text": "Hello there. How are you?", "voiceId": "en_US-amy-low"}"#,
//! ).unwrap();
//! let timeline = req.build_timeline(&AppConfig::default()).unwrap();
//! assert_eq!(timeline.len(), 2);
//! assert_eq!(timeline[0].voice_id, "en_US-amy-low");
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::runner::RenderError;
use crate::background::BackgroundConfig;
use crate::config::AppConfig;
use crate::export::ExportFormat;
use crate::master::{Preset, PresetOverrides};
use crate::text::{
    flatten_markup, segment_text, segments_to_timeline, MarkupOptions, SegmentationConfig,
    Utterance, UtteranceDefaults, MAX_BREAK_MS, MAX_SPEED, MIN_SPEED,
};

/// Everything one render needs.  Unset fields fall back to [`AppConfig`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderRequest {
    /// Plain text, segmented with `segmentation`.
    pub text: Option<String>,
    /// Markup document.
    pub markup: Option<String>,
    /// Pre-built utterances.
    pub timeline: Option<Vec<Utterance>>,
    /// Default voice for text and markup.
    pub voice_id: Option<String>,
    /// Default speaking rate in `[0.5, 2.0]`.
    pub speed: Option<f64>,
    pub segmentation: SegmentationConfig,
    /// Overrides `AppConfig::markup` for this request.
    pub markup_options: Option<MarkupOptions>,
    /// Preset key; unknown keys use the fallback preset.
    pub preset: Option<String>,
    pub overrides: PresetOverrides,
    pub background: Option<BackgroundConfig>,
    pub format: Option<ExportFormat>,
    /// Overrides `AppConfig::render.crossfade_ms`.
    pub crossfade_ms: Option<u32>,
    /// File stem for the artifact; generated when absent.
    pub output_name: Option<String>,
    /// Directory for the artifact; overrides `AppConfig::render.output_dir`.
    pub output_dir: Option<PathBuf>,
}

fn speed_in_range(speed: f64) -> bool {
    speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed)
}

fn non_blank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.trim().is_empty())
}

impl RenderRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn from_markup(markup: impl Into<String>) -> Self {
        Self {
            markup: Some(markup.into()),
            ..Default::default()
        }
    }

    /// Reject requests that cannot be rendered, before any synthesis.
    pub fn validate(&self) -> Result<(), RenderError> {
        if let Some(speed) = self.speed {
            if !speed_in_range(speed) {
                return Err(RenderError::InputValidation(format!(
                    "speed {speed} outside [{MIN_SPEED}, {MAX_SPEED}]"
                )));
            }
        }

        if let Some(ms) = self.segmentation.auto_break_ms.filter(|&ms| ms > MAX_BREAK_MS) {
            return Err(RenderError::InputValidation(format!(
                "autoBreakMs {ms} exceeds {MAX_BREAK_MS} ms"
            )));
        }

        if let Some(timeline) = &self.timeline {
            if timeline.is_empty() {
                return Err(RenderError::InputValidation("timeline is empty".into()));
            }
            for (i, u) in timeline.iter().enumerate() {
                if u.text.trim().is_empty() {
                    return Err(RenderError::InputValidation(format!(
                        "timeline entry {i} has no text"
                    )));
                }
                if !speed_in_range(u.speed) {
                    return Err(RenderError::InputValidation(format!(
                        "timeline entry {i}: speed {} outside [{MIN_SPEED}, {MAX_SPEED}]",
                        u.speed
                    )));
                }
                if u.breaks_after_ms > MAX_BREAK_MS {
                    return Err(RenderError::InputValidation(format!(
                        "timeline entry {i}: break {} ms exceeds {MAX_BREAK_MS} ms",
                        u.breaks_after_ms
                    )));
                }
                if u.voice_id.trim().is_empty() {
                    return Err(RenderError::InputValidation(format!(
                        "timeline entry {i} has no voice"
                    )));
                }
            }
            return Ok(());
        }

        if non_blank(&self.markup).is_none() && non_blank(&self.text).is_none() {
            return Err(RenderError::InputValidation("text is empty".into()));
        }
        Ok(())
    }

    /// Voice and speed inherited by text and markup.
    pub fn defaults(&self, config: &AppConfig) -> UtteranceDefaults {
        let voice = self
            .voice_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&config.synth.default_voice);
        UtteranceDefaults::new(voice, self.speed.unwrap_or(1.0))
    }

    /// Validate and turn the request's text source into utterances.
    pub fn build_timeline(&self, config: &AppConfig) -> Result<Vec<Utterance>, RenderError> {
        self.validate()?;

        if let Some(timeline) = &self.timeline {
            return Ok(timeline.clone());
        }

        let defaults = self.defaults(config);

        if let Some(markup) = non_blank(&self.markup) {
            if non_blank(&self.text).is_some() {
                log::debug!("render: request has both markup and text, using markup");
            }
            let opts = self.markup_options.as_ref().unwrap_or(&config.markup);
            let timeline = flatten_markup(markup, &defaults, opts)?;
            if timeline.is_empty() {
                return Err(RenderError::InputValidation(
                    "markup contains no speakable text".into(),
                ));
            }
            return Ok(timeline);
        }

        let text = non_blank(&self.text).unwrap_or_default();
        let chunks = segment_text(text, &self.segmentation);
        let timeline = if chunks.is_empty() {
            vec![defaults.fallback_utterance(text)]
        } else {
            segments_to_timeline(chunks, &defaults, self.segmentation.auto_break_ms)
        };
        Ok(timeline)
    }

    /// The preset to master with, overrides applied.
    pub fn resolve_preset(&self, config: &AppConfig) -> Preset {
        let key = self
            .preset
            .as_deref()
            .or(config.render.default_preset.as_deref());
        let preset = Preset::lookup(key);
        if self.overrides.is_empty() {
            preset
        } else {
            preset.with_overrides(&self.overrides)
        }
    }

    pub fn format(&self, config: &AppConfig) -> ExportFormat {
        self.format.unwrap_or(config.export.default_format)
    }

    pub fn crossfade_ms(&self, config: &AppConfig) -> u32 {
        self.crossfade_ms.unwrap_or(config.render.crossfade_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::{EqProfile, NrStrength};
    use crate::text::{ErrorMode, DEFAULT_VOICE_ID};

    fn config() -> AppConfig {
        AppConfig::default()
    }

    #[test]
    fn blank_text_is_rejected() {
        for req in [
            RenderRequest::default(),
            RenderRequest::from_text("   \n\t"),
            RenderRequest::from_markup(""),
        ] {
            assert!(matches!(req.validate(), Err(RenderError::InputValidation(_))));
        }
    }

    #[test]
    fn out_of_range_speed_is_rejected() {
        let req = RenderRequest {
            speed: Some(2.5),
            ..RenderRequest::from_text("hi")
        };
        assert!(matches!(req.validate(), Err(RenderError::InputValidation(_))));

        let req = RenderRequest {
            speed: Some(f64::NAN),
            ..RenderRequest::from_text("hi")
        };
        assert!(req.validate().is_err());

        let req = RenderRequest {
            speed: Some(0.5),
            ..RenderRequest::from_text("hi")
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn timeline_entries_are_checked() {
        let mut bad = Utterance::new("v", "hi", 1.0);
        bad.speed = 3.0;
        let req = RenderRequest {
            timeline: Some(vec![Utterance::new("v", "ok", 1.0), bad]),
            ..Default::default()
        };
        let err = req.validate().unwrap_err();
        assert!(err.to_string().contains("entry 1"));

        let req = RenderRequest {
            timeline: Some(vec![]),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn oversized_breaks_are_rejected() {
        let req = RenderRequest {
            timeline: Some(vec![Utterance::new("v", "hi", 1.0).with_break(u32::MAX)]),
            ..Default::default()
        };
        assert!(matches!(req.validate(), Err(RenderError::InputValidation(_))));

        let req: RenderRequest = serde_json::from_str(
            r#"{"timeline": [{"voiceId": "v", "text": "hi", "speed": 1.0, "breaksAfterMs": 4294967295}]}"#,
        )
        .unwrap();
        assert!(req.build_timeline(&config()).is_err());

        let req = RenderRequest {
            segmentation: SegmentationConfig {
                auto_break_ms: Some(MAX_BREAK_MS + 1),
                ..Default::default()
            },
            ..RenderRequest::from_text("One. Two.")
        };
        assert!(req.validate().is_err());

        let req = RenderRequest {
            timeline: Some(vec![Utterance::new("v", "hi", 1.0).with_break(MAX_BREAK_MS)]),
            ..Default::default()
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn text_is_segmented_with_defaults() {
        let req = RenderRequest {
            voice_id: Some("v2".into()),
            speed: Some(1.25),
            segmentation: SegmentationConfig {
                auto_break_ms: Some(300),
                ..Default::default()
            },
            ..RenderRequest::from_text("One. Two!")
        };
        let tl = req.build_timeline(&config()).unwrap();
        assert_eq!(tl.len(), 2);
        assert!(tl.iter().all(|u| u.voice_id == "v2" && u.speed == 1.25));
        assert!(tl.iter().all(|u| u.breaks_after_ms == 300));
    }

    #[test]
    fn default_voice_comes_from_config() {
        let tl = RenderRequest::from_text("Hello").build_timeline(&config()).unwrap();
        assert_eq!(tl[0].voice_id, DEFAULT_VOICE_ID);

        let mut cfg = config();
        cfg.synth.default_voice = "house".into();
        let tl = RenderRequest {
            voice_id: Some("  ".into()),
            ..RenderRequest::from_text("Hello")
        }
        .build_timeline(&cfg)
        .unwrap();
        assert_eq!(tl[0].voice_id, "house");
    }

    #[test]
    fn markup_wins_over_text() {
        let req = RenderRequest {
            markup: Some("<speak>Hello<break time=\"250ms\"/>world</speak>".into()),
            ..RenderRequest::from_text("ignored")
        };
        let tl = req.build_timeline(&config()).unwrap();
        assert_eq!(tl.len(), 2);
        assert_eq!(tl[0].text, "Hello");
        assert_eq!(tl[0].breaks_after_ms, 250);
    }

    #[test]
    fn malformed_markup_is_input_validation() {
        let req = RenderRequest::from_markup("<speak><voice>oops</speak>");
        assert!(matches!(
            req.build_timeline(&config()),
            Err(RenderError::InputValidation(_))
        ));
    }

    #[test]
    fn unsupported_tag_fails_in_fail_mode() {
        let req = RenderRequest {
            markup_options: Some(MarkupOptions {
                strip_unknown: false,
                error_mode: ErrorMode::Fail,
                ..Default::default()
            }),
            ..RenderRequest::from_markup("<speak><audio src=\"x\"/>Hi</speak>")
        };
        assert!(matches!(
            req.build_timeline(&config()),
            Err(RenderError::InputValidation(_))
        ));
    }

    #[test]
    fn silent_markup_is_rejected() {
        let req = RenderRequest::from_markup("<speak><break time=\"1s\"/></speak>");
        assert!(req.build_timeline(&config()).is_err());
    }

    #[test]
    fn preset_resolution() {
        let req = RenderRequest {
            preset: Some("announcement".into()),
            overrides: PresetOverrides {
                eq_profile: Some(EqProfile::Warmth),
                ..Default::default()
            },
            ..RenderRequest::from_text("x")
        };
        let p = req.resolve_preset(&config());
        assert_eq!(p.key, "announcement");
        assert_eq!(p.noise_reduction, NrStrength::Strong);
        assert_eq!(p.eq_profile, EqProfile::Warmth);

        let mut cfg = config();
        cfg.render.default_preset = Some("natural_minimal".into());
        assert_eq!(RenderRequest::from_text("x").resolve_preset(&cfg).key, "natural_minimal");
        assert_eq!(
            RenderRequest {
                preset: Some("nope".into()),
                ..Default::default()
            }
            .resolve_preset(&config())
            .key,
            "default"
        );
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let req: RenderRequest = serde_json::from_str(
            r#"{
                "markup": "<speak>Hi</speak>",
                "preset": "podcast_standard",
                "overrides": {"nr": "off", "lufsTarget": -18},
                "background": {"source": {"kind": "rain"}, "gain": 0.2, "ducking": true},
                "format": "mp3",
                "crossfadeMs": 20
            }"#,
        )
        .unwrap();
        assert_eq!(req.format(&config()), ExportFormat::Mp3);
        assert_eq!(req.crossfade_ms(&config()), 20);
        assert_eq!(req.overrides.lufs_target, Some(-18.0));
        assert!(req.background.is_some());
        assert_eq!(RenderRequest::default().format(&config()), ExportFormat::Wav);
    }
}
