//! The unit of synthesis: one voice speaking one piece of text.

use serde::{Deserialize, Serialize};

/// Slowest accepted speaking rate.
pub const MIN_SPEED: f64 = 0.5;
/// Fastest accepted speaking rate.
pub const MAX_SPEED: f64 = 2.0;

/// Voice used when neither the request nor the markup names one.
pub const DEFAULT_VOICE_ID: &str = "en_GB-alan-medium";

/// Clamp `speed` to `[MIN_SPEED, MAX_SPEED]`; non-finite values become `1.0`.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_finite() {
        speed.clamp(MIN_SPEED, MAX_SPEED)
    } else {
        1.0
    }
}

/// One entry of the render timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub voice_id: String,
    pub text: String,
    /// Speaking rate multiplier in `[0.5, 2.0]`.
    pub speed: f64,
    /// Gain applied to the synthesized buffer before assembly.
    #[serde(default)]
    pub pre_gain_db: f64,
    /// Silence inserted after this utterance.
    #[serde(default)]
    pub breaks_after_ms: u32,
}

impl Utterance {
    pub fn new(voice_id: impl Into<String>, text: impl Into<String>, speed: f64) -> Self {
        Self {
            voice_id: voice_id.into(),
            text: text.into(),
            speed: clamp_speed(speed),
            pre_gain_db: 0.0,
            breaks_after_ms: 0,
        }
    }

    pub fn with_break(mut self, ms: u32) -> Self {
        self.breaks_after_ms = ms;
        self
    }
}

/// Voice and speed inherited by every utterance unless markup overrides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtteranceDefaults {
    pub voice_id: String,
    pub speed: f64,
}

impl Default for UtteranceDefaults {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.into(),
            speed: 1.0,
        }
    }
}

impl UtteranceDefaults {
    pub fn new(voice_id: impl Into<String>, speed: f64) -> Self {
        Self {
            voice_id: voice_id.into(),
            speed,
        }
    }

    /// A single utterance holding the trimmed `text`, used when
    /// segmentation or flattening produced nothing.
    pub fn fallback_utterance(&self, text: &str) -> Utterance {
        Utterance::new(self.voice_id.clone(), text.trim(), self.speed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_clamped() {
        assert_eq!(clamp_speed(3.0), 2.0);
        assert_eq!(clamp_speed(0.1), 0.5);
        assert_eq!(clamp_speed(f64::NAN), 1.0);
        assert_eq!(Utterance::new("v", "t", 9.0).speed, 2.0);
    }

    #[test]
    fn serializes_camel_case() {
        let u = Utterance::new("v1", "hi", 1.0).with_break(250);
        let json = serde_json::to_string(&u).unwrap();
        assert!(json.contains("\"voiceId\":\"v1\""));
        assert!(json.contains("\"breaksAfterMs\":250"));
        assert!(json.contains("\"preGainDb\":0.0"));
    }

    #[test]
    fn fallback_trims() {
        let u = UtteranceDefaults::default().fallback_utterance("  hello \n");
        assert_eq!(u.text, "hello");
        assert_eq!(u.voice_id, DEFAULT_VOICE_ID);
    }
}
