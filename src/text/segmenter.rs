//! Plain-text segmentation into bounded chunks.
//!
//! Processing order:
//!
//! 1. **Split**: after `. ! ? : ;` followed by whitespace (`punctuation`)
//!    or on line breaks (`newline`).  Fragments are trimmed, empty ones
//!    dropped.
//! 2. **Merge**: consecutive fragments shorter than `mergeShortBelow`
//!    characters are joined with a space.  The merged run is flushed when a
//!    long-enough fragment arrives; the two stay separate chunks.
//! 3. **Clamp**: fragments longer than `maxChunkChars` are cut at the last
//!    interior space before the limit (hard cut when there is none) until
//!    short enough.
//!
//! Lengths are counted in `char`s.
//!
//! # Example
//!
//! ```rust
//! use voice_render::text::{segment_text, SegmentationConfig};
//!
//! let cfg = SegmentationConfig {
//!     merge_short_below: Some(4),
//!     max_chunk_chars: Some(30),
//!     ..Default::default()
//! };
//! let chunks = segment_text(
//!     "Hello world! A. B. This is a long sentence that should be split eventually.",
//!     &cfg,
//! );
//! assert!(chunks.iter().all(|c| c.chars().count() <= 30));
//! assert!(chunks.contains(&"A. B.".to_string()));
//! ```

use serde::{Deserialize, Serialize};

use super::utterance::{Utterance, UtteranceDefaults};

const SENTENCE_END: [char; 5] = ['.', '!', '?', ':', ';'];

// ---------------------------------------------------------------------------
// SegmentationConfig
// ---------------------------------------------------------------------------

/// Where fragments are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStrategy {
    #[default]
    Punctuation,
    Newline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SegmentationConfig {
    pub strategy: SegmentStrategy,
    pub max_chunk_chars: Option<usize>,
    pub merge_short_below: Option<usize>,
    /// Pause appended after every chunk when building a timeline.
    pub auto_break_ms: Option<u32>,
}

// ---------------------------------------------------------------------------
// segment_text
// ---------------------------------------------------------------------------

/// Split `text` into chunks according to `cfg`.  Empty input yields an empty
/// vector.
pub fn segment_text(text: &str, cfg: &SegmentationConfig) -> Vec<String> {
    let raw = text.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut parts = match cfg.strategy {
        SegmentStrategy::Newline => raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect(),
        SegmentStrategy::Punctuation => split_sentences(raw),
    };

    if let Some(min) = cfg.merge_short_below.filter(|&n| n > 0) {
        parts = merge_short(parts, min);
    }
    if let Some(max) = cfg.max_chunk_chars.filter(|&n| n > 0) {
        parts = parts.into_iter().flat_map(|p| clamp_chunk(&p, max)).collect();
    }
    parts
}

/// Turn chunks into utterances with the default voice, each followed by
/// `auto_break_ms` of silence.
pub fn segments_to_timeline(
    chunks: Vec<String>,
    defaults: &UtteranceDefaults,
    auto_break_ms: Option<u32>,
) -> Vec<Utterance> {
    chunks
        .into_iter()
        .map(|text| {
            Utterance::new(defaults.voice_id.clone(), text, defaults.speed)
                .with_break(auto_break_ms.unwrap_or(0))
        })
        .collect()
}

fn split_sentences(raw: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let boundary = SENTENCE_END.contains(&c) && chars.peek().is_some_and(|n| n.is_whitespace());
        if boundary {
            while chars.peek().is_some_and(|n| n.is_whitespace()) {
                chars.next();
            }
            push_trimmed(&mut parts, &current);
            current.clear();
        }
    }
    push_trimmed(&mut parts, &current);
    parts
}

fn push_trimmed(parts: &mut Vec<String>, s: &str) {
    let t = s.trim();
    if !t.is_empty() {
        parts.push(t.to_string());
    }
}

fn merge_short(parts: Vec<String>, min: usize) -> Vec<String> {
    let mut merged = Vec::with_capacity(parts.len());
    let mut buf = String::new();
    for part in parts {
        if part.chars().count() < min {
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(&part);
        } else {
            if !buf.is_empty() {
                merged.push(std::mem::take(&mut buf));
            }
            merged.push(part);
        }
    }
    if !buf.is_empty() {
        merged.push(buf);
    }
    merged
}

fn clamp_chunk(part: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut segment: Vec<char> = part.chars().collect();

    while segment.len() > max {
        let cut = segment[..max]
            .iter()
            .rposition(|&c| c == ' ')
            .filter(|&i| i > 0)
            .unwrap_or(max);
        let head: String = segment[..cut].iter().collect();
        push_trimmed(&mut out, &head);
        let tail: String = segment[cut..].iter().collect();
        segment = tail.trim().chars().collect();
    }
    if !segment.is_empty() {
        out.push(segment.into_iter().collect());
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
