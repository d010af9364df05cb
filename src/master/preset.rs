//! Mastering presets and per-request overrides.
//!
//! Presets are compiled-in, read-only values looked up by key.  A request
//! may carry a [`PresetOverrides`] record; [`Preset::with_overrides`] merges
//! it field by field, so only the fields the caller set replace the preset's
//! values.
//!
//! | Key | NR | EQ | Comp (thr/ratio/att/rel) | LUFS | Ceiling | Level match |
//! |-----|----|----|--------------------------|------|---------|-------------|
//! | `podcast_standard` | medium | voice_clarity | −18 / 3.0 / 12 / 120 | −16 | −1 | −18 |
//! | `audiobook_professional` | light | warmth | −20 / 2.5 / 20 / 200 | −18 | −1 | −19 |
//! | `announcement` | strong | brightness | −16 / 4.0 / 8 / 100 | −14 | −1 | off |
//! | `natural_minimal` | light | flat | −24 / 1.5 / 25 / 250 | −16 | −1 | off |
//!
//! Unknown or missing keys resolve to [`Preset::fallback`].
//!
//! # Example
//!
//! ```rust
//! use voice_render::master::{EqProfile, Preset, PresetOverrides};
//!
//! let preset = Preset::lookup(Some("announcement")).with_overrides(&PresetOverrides {
//!     eq_profile: Some(EqProfile::Flat),
//!     ..Default::default()
//! });
//! assert_eq!(preset.eq_profile, EqProfile::Flat);
//! assert_eq!(preset.lufs_target, -14.0);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// NrStrength
// ---------------------------------------------------------------------------

/// Noise-reduction strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NrStrength {
    /// Stage bypassed.
    Off,
    #[default]
    Light,
    Medium,
    Strong,
}

impl NrStrength {
    /// Fraction of the gated energy removed (`0.0` = none, `1.0` = all).
    pub fn reduction(self) -> f32 {
        match self {
            Self::Off => 0.0,
            Self::Light => 0.5,
            Self::Medium => 0.75,
            Self::Strong => 0.95,
        }
    }

    /// Time constant of the mask smoother, in milliseconds.
    pub fn smoothing_ms(self) -> f32 {
        match self {
            Self::Off => 0.0,
            Self::Light => 30.0,
            Self::Medium => 50.0,
            Self::Strong => 80.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EqProfile
// ---------------------------------------------------------------------------

/// Named equaliser curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqProfile {
    #[default]
    Flat,
    /// High-pass 80 Hz, presence +3 dB at 3 kHz.
    VoiceClarity,
    /// High-pass 60 Hz, +2.5 dB at 200 Hz, −2 dB shelf above 4 kHz.
    Warmth,
    /// High-pass 80 Hz, +3 dB at 8 kHz.
    Brightness,
}

impl fmt::Display for EqProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flat => "flat",
            Self::VoiceClarity => "voice_clarity",
            Self::Warmth => "warmth",
            Self::Brightness => "brightness",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// CompressorParams
// ---------------------------------------------------------------------------

/// Feed-forward compressor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorParams {
    /// Threshold in dBFS.
    pub threshold_db: f64,
    /// Compression ratio; `≤ 1.05` bypasses the compressor.
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    /// Makeup gain in dB.
    pub makeup_db: f64,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold_db: -24.0,
            ratio: 1.0,
            attack_ms: 20.0,
            release_ms: 200.0,
            makeup_db: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Preset
// ---------------------------------------------------------------------------

/// A complete, resolved mastering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub key: String,
    pub title: String,
    pub description: String,
    pub noise_reduction: NrStrength,
    pub eq_profile: EqProfile,
    pub compressor: CompressorParams,
    /// Target integrated loudness in LUFS.
    pub lufs_target: f64,
    /// Peak ceiling in dBFS.
    pub peak_ceiling_db: f64,
    /// Per-utterance loudness target; `Some` enables level matching.
    pub level_match_target: Option<f64>,
}

/// Keys of the built-in presets, in display order.
pub const PRESET_KEYS: [&str; 4] = [
    "podcast_standard",
    "audiobook_professional",
    "announcement",
    "natural_minimal",
];

impl Default for Preset {
    fn default() -> Self {
        Self::fallback()
    }
}

impl Preset {
    /// Configuration used when no (known) preset is requested: light NR,
    /// flat EQ, no compression, −16 LUFS, −1 dBFS ceiling.
    pub fn fallback() -> Self {
        Self {
            key: "default".into(),
            title: "Default".into(),
            description: "NR light, flat EQ, no compression, -16 LUFS / -1 dBFS".into(),
            noise_reduction: NrStrength::Light,
            eq_profile: EqProfile::Flat,
            compressor: CompressorParams::default(),
            lufs_target: -16.0,
            peak_ceiling_db: -1.0,
            level_match_target: None,
        }
    }

    /// Built-in preset for `key`, or `None` when the key is unknown.
    pub fn builtin(key: &str) -> Option<Self> {
        let preset = match key {
            "podcast_standard" => Self {
                key: key.into(),
                title: "Podcast Standard".into(),
                description: "NR medium, clarity EQ, comp 3:1, -16 LUFS / -1 dBFS".into(),
                noise_reduction: NrStrength::Medium,
                eq_profile: EqProfile::VoiceClarity,
                compressor: CompressorParams {
                    threshold_db: -18.0,
                    ratio: 3.0,
                    attack_ms: 12.0,
                    release_ms: 120.0,
                    makeup_db: 0.0,
                },
                lufs_target: -16.0,
                peak_ceiling_db: -1.0,
                level_match_target: Some(-18.0),
            },
            "audiobook_professional" => Self {
                key: key.into(),
                title: "Audiobook Professional".into(),
                description: "NR light, warm EQ, soft comp, -18 LUFS".into(),
                noise_reduction: NrStrength::Light,
                eq_profile: EqProfile::Warmth,
                compressor: CompressorParams {
                    threshold_db: -20.0,
                    ratio: 2.5,
                    attack_ms: 20.0,
                    release_ms: 200.0,
                    makeup_db: 0.0,
                },
                lufs_target: -18.0,
                peak_ceiling_db: -1.0,
                level_match_target: Some(-19.0),
            },
            "announcement" => Self {
                key: key.into(),
                title: "Announcement".into(),
                description: "NR strong, bright EQ, tighter comp, -14 LUFS".into(),
                noise_reduction: NrStrength::Strong,
                eq_profile: EqProfile::Brightness,
                compressor: CompressorParams {
                    threshold_db: -16.0,
                    ratio: 4.0,
                    attack_ms: 8.0,
                    release_ms: 100.0,
                    makeup_db: 0.0,
                },
                lufs_target: -14.0,
                peak_ceiling_db: -1.0,
                level_match_target: None,
            },
            "natural_minimal" => Self {
                key: key.into(),
                title: "Natural Minimal".into(),
                description: "NR light, flat EQ, minimal comp, -16 LUFS".into(),
                noise_reduction: NrStrength::Light,
                eq_profile: EqProfile::Flat,
                compressor: CompressorParams {
                    threshold_db: -24.0,
                    ratio: 1.5,
                    attack_ms: 25.0,
                    release_ms: 250.0,
                    makeup_db: 0.0,
                },
                lufs_target: -16.0,
                peak_ceiling_db: -1.0,
                level_match_target: None,
            },
            _ => return None,
        };
        Some(preset)
    }

    /// Resolve `key`, falling back to [`Preset::fallback`] for unknown or
    /// missing keys.
    pub fn lookup(key: Option<&str>) -> Self {
        match key.map(str::trim).filter(|k| !k.is_empty()) {
            Some(k) => Self::builtin(k).unwrap_or_else(|| {
                log::warn!("preset: unknown key {k:?}, using default");
                Self::fallback()
            }),
            None => Self::fallback(),
        }
    }

    /// All built-in presets in display order.
    pub fn all() -> Vec<Self> {
        PRESET_KEYS.iter().filter_map(|k| Self::builtin(k)).collect()
    }

    /// Apply `overrides`, replacing only the fields that are set.
    pub fn with_overrides(mut self, overrides: &PresetOverrides) -> Self {
        if let Some(nr) = overrides.noise_reduction {
            self.noise_reduction = nr;
        }
        if let Some(eq) = overrides.eq_profile {
            self.eq_profile = eq;
        }
        if let Some(lufs) = overrides.lufs_target {
            self.lufs_target = lufs;
        }
        if let Some(ceiling) = overrides.peak_ceiling_db {
            self.peak_ceiling_db = ceiling;
        }
        if let Some(v) = overrides.comp_threshold_db {
            self.compressor.threshold_db = v;
        }
        if let Some(v) = overrides.comp_ratio {
            self.compressor.ratio = v;
        }
        if let Some(v) = overrides.comp_attack_ms {
            self.compressor.attack_ms = v;
        }
        if let Some(v) = overrides.comp_release_ms {
            self.compressor.release_ms = v;
        }
        if let Some(v) = overrides.comp_makeup_db {
            self.compressor.makeup_db = v;
        }
        if let Some(enabled) = overrides.level_match {
            self.level_match_target = if enabled {
                Some(
                    overrides
                        .level_match_target
                        .or(self.level_match_target)
                        .unwrap_or(self.lufs_target),
                )
            } else {
                None
            };
        } else if let Some(target) = overrides.level_match_target {
            if self.level_match_target.is_some() {
                self.level_match_target = Some(target);
            }
        }
        self
    }
}

// ---------------------------------------------------------------------------
// PresetOverrides
// ---------------------------------------------------------------------------

/// Per-request patch over a [`Preset`].  Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PresetOverrides {
    #[serde(alias = "nr")]
    pub noise_reduction: Option<NrStrength>,
    #[serde(alias = "eq")]
    pub eq_profile: Option<EqProfile>,
    pub lufs_target: Option<f64>,
    #[serde(alias = "truePeakCeiling")]
    pub peak_ceiling_db: Option<f64>,
    pub comp_threshold_db: Option<f64>,
    pub comp_ratio: Option<f64>,
    pub comp_attack_ms: Option<f64>,
    pub comp_release_ms: Option<f64>,
    pub comp_makeup_db: Option<f64>,
    /// Force level matching on (`true`) or off (`false`).
    pub level_match: Option<bool>,
    pub level_match_target: Option<f64>,
}

impl PresetOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_falls_back_to_default() {
        let p = Preset::lookup(Some("does_not_exist"));
        assert_eq!(p, Preset::fallback());
        assert_eq!(p.noise_reduction, NrStrength::Light);
        assert_eq!(p.eq_profile, EqProfile::Flat);
        assert_eq!(p.compressor.ratio, 1.0);
        assert_eq!(p.lufs_target, -16.0);
        assert_eq!(p.peak_ceiling_db, -1.0);
    }

    #[test]
    fn missing_or_blank_key_falls_back() {
        assert_eq!(Preset::lookup(None), Preset::fallback());
        assert_eq!(NrStrength::default(), NrStrength::Light);
        assert_eq!(EqProfile::default(), EqProfile::Flat);
        assert_eq!(Preset::lookup(Some("  ")), Preset::fallback());
    }

    #[test]
    fn builtins_resolve() {
        let all = Preset::all();
        assert_eq!(all.len(), PRESET_KEYS.len());
        let podcast = Preset::lookup(Some("podcast_standard"));
        assert_eq!(podcast.eq_profile, EqProfile::VoiceClarity);
        assert_eq!(podcast.level_match_target, Some(-18.0));
        assert_eq!(Preset::lookup(Some("announcement")).lufs_target, -14.0);
    }

    #[test]
    fn absent_override_fields_fall_through() {
        let base = Preset::lookup(Some("audiobook_professional"));
        let merged = base.clone().with_overrides(&PresetOverrides {
            lufs_target: Some(-20.0),
            ..Default::default()
        });
        assert_eq!(merged.lufs_target, -20.0);
        assert_eq!(merged.eq_profile, base.eq_profile);
        assert_eq!(merged.compressor, base.compressor);
        assert_eq!(merged.peak_ceiling_db, base.peak_ceiling_db);
    }

    #[test]
    fn empty_overrides_are_identity() {
        let base = Preset::lookup(Some("podcast_standard"));
        assert!(PresetOverrides::default().is_empty());
        assert_eq!(base.clone().with_overrides(&PresetOverrides::default()), base);
    }

    #[test]
    fn level_match_can_be_toggled() {
        let off = Preset::lookup(Some("podcast_standard")).with_overrides(&PresetOverrides {
            level_match: Some(false),
            ..Default::default()
        });
        assert_eq!(off.level_match_target, None);

        let on = Preset::lookup(Some("announcement")).with_overrides(&PresetOverrides {
            level_match: Some(true),
            ..Default::default()
        });
        assert_eq!(on.level_match_target, Some(-14.0));
    }

    #[test]
    fn overrides_deserialize_from_camel_case_and_aliases() {
        let json = r#"{"nr":"off","eq":"warmth","lufsTarget":-18.5,"truePeakCeiling":-2.0,"compRatio":2.0}"#;
        let o: PresetOverrides = serde_json::from_str(json).unwrap();
        assert_eq!(o.noise_reduction, Some(NrStrength::Off));
        assert_eq!(o.eq_profile, Some(EqProfile::Warmth));
        assert_eq!(o.lufs_target, Some(-18.5));
        assert_eq!(o.peak_ceiling_db, Some(-2.0));
        assert_eq!(o.comp_ratio, Some(2.0));
    }
}
