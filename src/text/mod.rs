//! Text front-end: turns a script into an ordered timeline of utterances.
//!
//! Plain text goes through the [`segmenter`]; marked-up text through the
//! [`markup`] flattener.  Both produce [`Utterance`] values that the render
//! pipeline synthesizes one by one.
//!
//! ```text
//! plain text ──segment_text──▶ chunks ──segments_to_timeline──┐
//!                                                              ├─▶ Vec<Utterance>
//! markup     ──flatten_markup─────────────────────────────────┘
//! ```

pub mod markup;
pub mod segmenter;
pub mod utterance;

pub use markup::{
    flatten_markup, parse_markup, ErrorMode, MarkupError, MarkupLimits, MarkupOptions, MAX_BREAK_MS,
};
pub use segmenter::{segment_text, segments_to_timeline, SegmentStrategy, SegmentationConfig};
pub use utterance::{clamp_speed, Utterance, UtteranceDefaults, DEFAULT_VOICE_ID, MAX_SPEED, MIN_SPEED};
