//! Restricted speech-markup dialect → ordered utterance timeline.
//!
//! # Supported tags
//!
//! | Tag | Effect |
//! |-----|--------|
//! | `speak`, `p`, `s`, `lang`, `emphasis` | containers; direct text is spoken |
//! | `voice name=".."` | overrides the voice for its subtree |
//! | `prosody rate=".."` | `N%` scales the inherited speed, keywords `x-slow`..`x-fast`, bare numbers |
//! | `break time=".." strength=".."` | adds a pause after the previous utterance |
//! | `say-as interpret-as=".."` | `digits`/`characters`/`spell-out`, `date`, `time` |
//! | `sub alias=".."` | speaks the alias instead of the element text |
//!
//! Parsing is a two-step affair: `quick-xml` events are folded into a small
//! tagged AST ([`Node`]), which is then walked depth-first with an explicit
//! work list and a stack of inherited `(voice, speed)` frames.
//!
//! A break seen before any utterance is held as a pending pause and added to
//! the first utterance emitted afterwards.
//!
//! # Example
//!
//! ```rust
//! use voice_render::text::{flatten_markup, MarkupOptions, UtteranceDefaults};
//!
//! let timeline = flatten_markup(
//!     r#"<speak>Hello<break time="250ms"/>world</speak>"#,
//!     &UtteranceDefaults::default(),
//!     &MarkupOptions::default(),
//! )
//! .unwrap();
//!
//! assert_eq!(timeline[0].text, "Hello");
//! assert_eq!(timeline[0].breaks_after_ms, 250);
//! assert_eq!(timeline[1].text, "world");
//! ```

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::utterance::{clamp_speed, Utterance, UtteranceDefaults, MAX_SPEED, MIN_SPEED};

/// Nesting depth at which the parser gives up, independent of validation.
const MAX_PARSE_DEPTH: usize = 256;

// ---------------------------------------------------------------------------
// MarkupError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MarkupError {
    #[error("malformed markup: {0}")]
    Malformed(String),

    #[error("unsupported markup tag <{0}>")]
    UnsupportedTag(String),

    #[error("markup has {count} elements (limit {limit})")]
    TooManyNodes { count: usize, limit: usize },

    #[error("markup nesting depth {depth} exceeds {limit}")]
    TooDeep { depth: usize, limit: usize },

    #[error("markup text has {chars} characters (limit {limit})")]
    TextTooLong { chars: usize, limit: usize },
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What happens when a rule is violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Log and continue.
    #[default]
    Warn,
    /// Reject the input.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkupLimits {
    pub max_nodes: usize,
    pub max_depth: usize,
    pub max_text_chars: usize,
}

impl Default for MarkupLimits {
    fn default() -> Self {
        Self {
            max_nodes: 2_000,
            max_depth: 12,
            max_text_chars: 20_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkupOptions {
    /// Check [`MarkupLimits`] before flattening.
    pub validate: bool,
    /// Unwrap unknown tags, keeping their content.
    pub strip_unknown: bool,
    pub error_mode: ErrorMode,
    pub limits: MarkupLimits,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            validate: true,
            strip_unknown: true,
            error_mode: ErrorMode::Warn,
            limits: MarkupLimits::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Speak,
    Voice,
    Prosody,
    Break,
    Emphasis,
    SayAs,
    Sub,
    P,
    S,
    Lang,
    Unknown(String),
}

impl Tag {
    fn from_name(name: &str) -> Self {
        match name {
            "speak" => Self::Speak,
            "voice" => Self::Voice,
            "prosody" => Self::Prosody,
            "break" => Self::Break,
            "emphasis" => Self::Emphasis,
            "say-as" => Self::SayAs,
            "sub" => Self::Sub,
            "p" => Self::P,
            "s" => Self::S,
            "lang" => Self::Lang,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: Tag,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    fn new(tag: Tag, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag,
            attrs,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All descendant text, concatenated in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
        }
    }
}

/// Append text to `children`, merging with a preceding text node.
fn push_text(children: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(last)) = children.last_mut() {
        last.push_str(text);
    } else {
        children.push(Node::Text(text.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

fn malformed(e: impl std::fmt::Display) -> MarkupError {
    MarkupError::Malformed(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str, MarkupError> {
    std::str::from_utf8(bytes).map_err(malformed)
}

fn open_element(start: &BytesStart<'_>) -> Result<Element, MarkupError> {
    let name = utf8(start.local_name().as_ref())?.to_string();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(malformed)?;
        let key = utf8(attr.key.local_name().as_ref())?.to_string();
        let raw = utf8(&attr.value)?;
        let value = quick_xml::escape::unescape(raw).map_err(malformed)?;
        attrs.push((key, value.into_owned()));
    }
    Ok(Element::new(Tag::from_name(&name), attrs))
}

/// Resolve the body of an `&...;` reference.
fn resolve_reference(name: &str) -> Result<Cow<'static, str>, MarkupError> {
    let named = match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    };
    if let Some(s) = named {
        return Ok(Cow::Borrowed(s));
    }
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32)
        .map(|c| Cow::Owned(c.to_string()))
        .ok_or_else(|| MarkupError::Malformed(format!("unknown entity &{name};")))
}

/// Parse `markup` into a single `speak` root, wrapping the input when it
/// does not already consist of exactly one `speak` element.
pub fn parse_markup(markup: &str) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(markup);
    // Index 0 is a synthetic document node holding the top-level content.
    let mut stack: Vec<Element> = vec![Element::new(Tag::Speak, Vec::new())];

    loop {
        match reader.read_event().map_err(malformed)? {
            Event::Start(start) => {
                if stack.len() > MAX_PARSE_DEPTH {
                    return Err(MarkupError::Malformed(format!(
                        "nesting deeper than {MAX_PARSE_DEPTH} levels"
                    )));
                }
                stack.push(open_element(&start)?);
            }
            Event::Empty(start) => {
                let el = open_element(&start)?;
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(el));
                }
            }
            Event::End(end) => {
                let name = utf8(end.local_name().as_ref())?.to_string();
                if stack.len() < 2 {
                    return Err(MarkupError::Malformed(format!("unexpected </{name}>")));
                }
                let Some(done) = stack.pop() else {
                    return Err(MarkupError::Malformed(format!("unexpected </{name}>")));
                };
                if done.tag != Tag::from_name(&name) {
                    return Err(MarkupError::Malformed(format!("mismatched </{name}>")));
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(done));
                }
            }
            Event::Text(text) => {
                let s = utf8(&text)?;
                if let Some(parent) = stack.last_mut() {
                    push_text(&mut parent.children, s);
                }
            }
            Event::CData(data) => {
                let s = utf8(&data)?;
                if let Some(parent) = stack.last_mut() {
                    push_text(&mut parent.children, s);
                }
            }
            Event::GeneralRef(reference) => {
                let resolved = resolve_reference(utf8(&reference)?)?;
                if let Some(parent) = stack.last_mut() {
                    push_text(&mut parent.children, &resolved);
                }
            }
            Event::Eof => break,
            // Declarations, comments, processing instructions, doctype.
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(MarkupError::Malformed("unclosed element at end of input".into()));
    }
    let document = stack.pop().unwrap_or_else(|| Element::new(Tag::Speak, Vec::new()));

    let mut significant = document
        .children
        .iter()
        .filter(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
    let single_speak = matches!(
        (significant.next(), significant.next()),
        (Some(Node::Element(e)), None) if e.tag == Tag::Speak
    );

    if single_speak {
        if let Some(Node::Element(root)) = document
            .children
            .iter()
            .find(|n| matches!(n, Node::Element(_)))
        {
            return Ok(root.clone());
        }
    }
    Ok(document)
}

/// Replace every unknown element by its (recursively unwrapped) children.
fn unwrap_unknown(nodes: Vec<Node>) -> Vec<Node> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        match node {
            Node::Text(t) => push_text(&mut out, &t),
            Node::Element(mut e) => {
                let children = unwrap_unknown(std::mem::take(&mut e.children));
                if matches!(e.tag, Tag::Unknown(_)) {
                    for child in children {
                        match child {
                            Node::Text(t) => push_text(&mut out, &t),
                            el => out.push(el),
                        }
                    }
                } else {
                    e.children = children;
                    out.push(Node::Element(e));
                }
            }
        }
    }
    out
}

fn first_unknown(el: &Element) -> Option<&str> {
    if let Tag::Unknown(name) = &el.tag {
        return Some(name);
    }
    el.children.iter().find_map(|n| match n {
        Node::Element(e) => first_unknown(e),
        Node::Text(_) => None,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct TreeStats {
    nodes: usize,
    depth: usize,
    text_chars: usize,
}

fn tree_stats(el: &Element, depth: usize, stats: &mut TreeStats) {
    stats.nodes += 1;
    stats.depth = stats.depth.max(depth);
    for child in &el.children {
        match child {
            Node::Text(t) => stats.text_chars += t.chars().count(),
            Node::Element(e) => tree_stats(e, depth + 1, stats),
        }
    }
}

fn check_limits(root: &Element, opts: &MarkupOptions) -> Result<(), MarkupError> {
    let mut stats = TreeStats::default();
    tree_stats(root, 1, &mut stats);
    let limits = &opts.limits;

    let violations = [
        (stats.nodes > limits.max_nodes).then_some(MarkupError::TooManyNodes {
            count: stats.nodes,
            limit: limits.max_nodes,
        }),
        (stats.depth > limits.max_depth).then_some(MarkupError::TooDeep {
            depth: stats.depth,
            limit: limits.max_depth,
        }),
        (stats.text_chars > limits.max_text_chars).then_some(MarkupError::TextTooLong {
            chars: stats.text_chars,
            limit: limits.max_text_chars,
        }),
    ];

    for violation in violations.into_iter().flatten() {
        match opts.error_mode {
            ErrorMode::Fail => return Err(violation),
            ErrorMode::Warn => log::warn!("markup: {violation}, continuing"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Attribute interpretation
// ---------------------------------------------------------------------------

/// Speed for a `prosody rate` value relative to the inherited `base`.
pub fn parse_rate(value: Option<&str>, base: f64) -> f64 {
    let Some(v) = value.map(|v| v.trim().to_ascii_lowercase()).filter(|v| !v.is_empty()) else {
        return base;
    };
    if let Some(pct) = v.strip_suffix('%') {
        return match pct.trim().parse::<f64>() {
            Ok(p) if p.is_finite() => (base * (1.0 + p / 100.0)).clamp(MIN_SPEED, MAX_SPEED),
            _ => base,
        };
    }
    match v.as_str() {
        "x-slow" => 0.7,
        "slow" => 0.85,
        "medium" => 1.0,
        "fast" => 1.25,
        "x-fast" => 1.5,
        other => match other.parse::<f64>() {
            Ok(f) if f.is_finite() => clamp_speed(f),
            _ => base,
        },
    }
}

/// Longest pause a single `break` (or an utterance's trailing gap) may ask for.
pub const MAX_BREAK_MS: u32 = 10_000;

/// Pause length for a `break` element, capped at [`MAX_BREAK_MS`].
pub fn parse_break(time: Option<&str>, strength: Option<&str>) -> u32 {
    let time = time.map(|t| t.trim().to_ascii_lowercase()).unwrap_or_default();
    let parsed = if let Some(ms) = time.strip_suffix("ms") {
        Some(ms.trim().parse::<f64>().unwrap_or(0.0))
    } else if let Some(s) = time.strip_suffix('s') {
        Some(s.trim().parse::<f64>().map(|v| v * 1000.0).unwrap_or(0.0))
    } else {
        None
    };
    if let Some(ms) = parsed {
        return if ms.is_finite() && ms > 0.0 {
            ms.min(MAX_BREAK_MS as f64) as u32
        } else {
            0
        };
    }

    match strength
        .map(|s| s.trim().to_ascii_lowercase())
        .as_deref()
        .unwrap_or("medium")
    {
        "none" => 0,
        "x-weak" => 80,
        "weak" => 160,
        "strong" => 360,
        "x-strong" => 500,
        _ => 240,
    }
}

/// Text transformation for `say-as`.
pub fn say_as(kind: Option<&str>, raw: &str) -> String {
    let s = raw.trim();
    match kind.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
        Some("digits" | "characters" | "spell-out") => s
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" "),
        Some("date") => {
            let parts: Vec<&str> = s.split('-').collect();
            let shape = [4_usize, 2, 2];
            if parts.len() == 3 && parts.iter().zip(shape).all(|(p, n)| all_digits(p, n, n)) {
                parts.join(" ")
            } else {
                s.to_string()
            }
        }
        Some("time") => match s.split_once(':') {
            Some((h, m)) if all_digits(h, 1, 2) && all_digits(m, 2, 2) => format!("{h} {m}"),
            _ => s.to_string(),
        },
        _ => s.to_string(),
    }
}

fn all_digits(s: &str, min: usize, max: usize) -> bool {
    (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

/// Inherited state for one subtree.
#[derive(Debug, Clone)]
struct Frame {
    voice_id: String,
    speed: f64,
}

enum Step<'a> {
    Visit(&'a Node),
    Leave,
}

struct Flattener {
    frames: Vec<Frame>,
    timeline: Vec<Utterance>,
    pending_break_ms: u32,
}

impl Flattener {
    fn new(defaults: &UtteranceDefaults) -> Self {
        Self {
            frames: vec![Frame {
                voice_id: defaults.voice_id.clone(),
                speed: clamp_speed(defaults.speed),
            }],
            timeline: Vec::new(),
            pending_break_ms: 0,
        }
    }

    fn current(&self) -> Frame {
        self.frames.last().cloned().unwrap_or(Frame {
            voice_id: super::utterance::DEFAULT_VOICE_ID.into(),
            speed: 1.0,
        })
    }

    fn emit(&mut self, text: &str) {
        let content = text.trim();
        if content.is_empty() {
            return;
        }
        let frame = self.current();
        let mut utt = Utterance::new(frame.voice_id, content, frame.speed);
        utt.breaks_after_ms = std::mem::take(&mut self.pending_break_ms);
        self.timeline.push(utt);
    }

    fn add_break(&mut self, ms: u32) {
        match self.timeline.last_mut() {
            Some(last) => {
                last.breaks_after_ms = last.breaks_after_ms.saturating_add(ms).min(MAX_BREAK_MS)
            }
            None => {
                self.pending_break_ms = self.pending_break_ms.saturating_add(ms).min(MAX_BREAK_MS)
            }
        }
    }

    fn run(mut self, root: &Node) -> Vec<Utterance> {
        let mut work = vec![Step::Visit(root)];

        while let Some(step) = work.pop() {
            let node = match step {
                Step::Leave => {
                    self.frames.pop();
                    continue;
                }
                Step::Visit(node) => node,
            };
            let el = match node {
                Node::Text(t) => {
                    self.emit(t);
                    continue;
                }
                Node::Element(el) => el,
            };

            match &el.tag {
                Tag::Break => {
                    self.add_break(parse_break(el.attr("time"), el.attr("strength")));
                    continue;
                }
                Tag::SayAs => {
                    let text = say_as(el.attr("interpret-as"), &el.text_content());
                    self.emit(&text);
                    continue;
                }
                Tag::Sub => {
                    let text = match el.attr("alias").filter(|a| !a.trim().is_empty()) {
                        Some(alias) => alias.to_string(),
                        None => el.text_content(),
                    };
                    self.emit(&text);
                    continue;
                }
                Tag::Voice => {
                    let mut frame = self.current();
                    if let Some(name) = el.attr("name").filter(|n| !n.trim().is_empty()) {
                        frame.voice_id = name.trim().to_string();
                    }
                    self.frames.push(frame);
                    work.push(Step::Leave);
                }
                Tag::Prosody => {
                    let mut frame = self.current();
                    frame.speed = parse_rate(el.attr("rate"), frame.speed);
                    self.frames.push(frame);
                    work.push(Step::Leave);
                }
                Tag::Speak | Tag::Emphasis | Tag::P | Tag::S | Tag::Lang | Tag::Unknown(_) => {}
            }
            work.extend(el.children.iter().rev().map(Step::Visit));
        }

        if self.pending_break_ms > 0 {
            log::debug!(
                "markup: dropping {} ms of pause with no utterance to attach to",
                self.pending_break_ms
            );
        }
        self.timeline
    }
}

/// Parse, validate and flatten `markup` into a timeline.
pub fn flatten_markup(
    markup: &str,
    defaults: &UtteranceDefaults,
    opts: &MarkupOptions,
) -> Result<Vec<Utterance>, MarkupError> {
    let mut root = parse_markup(markup)?;

    if opts.strip_unknown {
        root.children = unwrap_unknown(std::mem::take(&mut root.children));
    } else if let Some(name) = first_unknown(&root) {
        match opts.error_mode {
            ErrorMode::Fail => return Err(MarkupError::UnsupportedTag(name.to_string())),
            ErrorMode::Warn => log::warn!("markup: treating unsupported <{name}> as a container"),
        }
    }

    if opts.validate {
        check_limits(&root, opts)?;
    }

    let root = Node::Element(root);
    let timeline = Flattener::new(defaults).run(&root);
    log::debug!("markup: flattened into {} utterance(s)", timeline.len());
    Ok(timeline)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(markup: &str) -> Vec<Utterance> {
        flatten_markup(markup, &UtteranceDefaults::new("v1", 1.0), &MarkupOptions::default())
            .unwrap()
    }

    fn texts(tl: &[Utterance]) -> Vec<&str> {
        tl.iter().map(|u| u.text.as_str()).collect()
    }

    #[test]
    fn break_attaches_to_previous_utterance() {
        let tl = flatten(r#"<speak>Hello<break time="250ms"/>world</speak>"#);
        assert_eq!(texts(&tl), vec!["Hello", "world"]);
        assert_eq!(tl[0].breaks_after_ms, 250);
        assert_eq!(tl[1].breaks_after_ms, 0);
    }

    #[test]
    fn fragment_with_voice_and_prosody() {
        let tl = flatten(r#"<voice name="v2">Hi</voice><prosody rate="120%">there</prosody>"#);
        assert_eq!(texts(&tl), vec!["Hi", "there"]);
        assert_eq!(tl[0].voice_id, "v2");
        assert_eq!(tl[1].voice_id, "v1");
        assert!(tl[1].speed > 1.19);
    }

    #[test]
    fn surrounding_whitespace_keeps_single_speak_root() {
        let root = parse_markup("\n  <speak>Hi <s>there</s></speak>\n\t").unwrap();
        assert_eq!(root.tag, Tag::Speak);
        assert!(!root
            .children
            .iter()
            .any(|n| matches!(n, Node::Element(e) if e.tag == Tag::Speak)));
        assert_eq!(texts(&flatten("  <speak>Hi</speak>  ")), vec!["Hi"]);
    }

    #[test]
    fn stacked_breaks_are_capped() {
        let tl = flatten(
            r#"<speak>Hi<break time="9s"/><break time="9s"/>there</speak>"#,
        );
        assert_eq!(tl[0].breaks_after_ms, MAX_BREAK_MS);
        let tl = flatten(r#"<speak><break time="9s"/><break time="9s"/>Hi</speak>"#);
        assert_eq!(tl[0].breaks_after_ms, MAX_BREAK_MS);
    }

    #[test]
    fn plain_text_is_wrapped() {
        let tl = flatten("  just words  ");
        assert_eq!(texts(&tl), vec!["just words"]);
    }

    #[test]
    fn leading_break_is_folded_into_first_utterance() {
        let tl = flatten(r#"<speak><break time="1s"/><break strength="weak"/>Start</speak>"#);
        assert_eq!(tl.len(), 1);
        assert_eq!(tl[0].breaks_after_ms, 1_160);
    }

    #[test]
    fn breaks_accumulate() {
        let tl = flatten(r#"<speak>A<break time="100ms"/><break strength="x-strong"/>B</speak>"#);
        assert_eq!(tl[0].breaks_after_ms, 600);
    }

    #[test]
    fn nested_state_is_restored() {
        let tl = flatten(
            r#"<speak><voice name="a"><prosody rate="slow">one<voice name="b">two</voice>three</prosody>four</voice>five</speak>"#,
        );
        let got: Vec<(&str, &str, f64)> = tl
            .iter()
            .map(|u| (u.text.as_str(), u.voice_id.as_str(), u.speed))
            .collect();
        assert_eq!(
            got,
            vec![
                ("one", "a", 0.85),
                ("two", "b", 0.85),
                ("three", "a", 0.85),
                ("four", "a", 1.0),
                ("five", "v1", 1.0),
            ]
        );
    }

    #[test]
    fn rate_parsing() {
        assert_eq!(parse_rate(Some("x-fast"), 1.0), 1.5);
        assert_eq!(parse_rate(Some("-80%"), 1.0), 0.5);
        assert_eq!(parse_rate(Some("300%"), 1.0), 2.0);
        assert_eq!(parse_rate(Some("1.3"), 1.0), 1.3);
        assert_eq!(parse_rate(Some("5"), 1.0), 2.0);
        assert_eq!(parse_rate(Some("quick"), 1.2), 1.2);
        assert_eq!(parse_rate(None, 0.9), 0.9);
        assert!((parse_rate(Some("50%"), 1.2) - 1.8).abs() < 1e-9);
    }

    #[test]
    fn break_parsing() {
        assert_eq!(parse_break(Some("250ms"), None), 250);
        assert_eq!(parse_break(Some("1.5s"), None), 1_500);
        assert_eq!(parse_break(Some("oops ms"), None), 0);
        assert_eq!(parse_break(None, Some("none")), 0);
        assert_eq!(parse_break(None, Some("strong")), 360);
        assert_eq!(parse_break(None, Some("bogus")), 240);
        assert_eq!(parse_break(None, None), 240);
        assert_eq!(parse_break(Some("-5ms"), None), 0);
        assert_eq!(parse_break(Some("4294967s"), None), MAX_BREAK_MS);
        assert_eq!(parse_break(Some("1e30ms"), None), MAX_BREAK_MS);
    }

    #[test]
    fn say_as_variants() {
        assert_eq!(say_as(Some("digits"), "1234"), "1 2 3 4");
        assert_eq!(say_as(Some("spell-out"), " ab c "), "a b c");
        assert_eq!(say_as(Some("date"), "2024-05-17"), "2024 05 17");
        assert_eq!(say_as(Some("date"), "17/05/2024"), "17/05/2024");
        assert_eq!(say_as(Some("time"), "9:05"), "9 05");
        assert_eq!(say_as(Some("time"), "109:05"), "109:05");
        assert_eq!(say_as(Some("cardinal"), " 42 "), "42");
    }

    #[test]
    fn say_as_and_sub_in_context() {
        let tl = flatten(
            r#"<speak>Call <say-as interpret-as="digits">911</say-as> about <sub alias="World Wide Web">WWW</sub><sub alias="">kept</sub></speak>"#,
        );
        assert_eq!(texts(&tl), vec!["Call", "9 1 1", "about", "World Wide Web", "kept"]);
    }

    #[test]
    fn emphasis_and_paragraphs_emit_direct_text() {
        let tl = flatten("<speak><p><s>First.</s><s>Second <emphasis>loud</emphasis> end</s></p></speak>");
        assert_eq!(texts(&tl), vec!["First.", "Second", "loud", "end"]);
    }

    #[test]
    fn entities_are_resolved() {
        let tl = flatten("<speak>Tom &amp; Jerry &#65;&#x42;</speak>");
        assert_eq!(texts(&tl), vec!["Tom & Jerry AB"]);
    }

    #[test]
    fn unknown_tags_are_unwrapped_by_default() {
        let tl = flatten(r#"<speak>Hello <mark name="x"/><foo>big <bar>wide</bar></foo> world</speak>"#);
        assert_eq!(texts(&tl), vec!["Hello big wide world"]);
    }

    #[test]
    fn unknown_tags_fail_without_stripping() {
        let opts = MarkupOptions {
            strip_unknown: false,
            error_mode: ErrorMode::Fail,
            ..Default::default()
        };
        let err = flatten_markup("<speak>a<foo>b</foo></speak>", &UtteranceDefaults::default(), &opts)
            .unwrap_err();
        assert_eq!(err, MarkupError::UnsupportedTag("foo".into()));
    }

    #[test]
    fn unknown_tags_are_containers_in_warn_mode() {
        let opts = MarkupOptions {
            strip_unknown: false,
            ..Default::default()
        };
        let tl = flatten_markup("<speak>a<foo>b</foo></speak>", &UtteranceDefaults::default(), &opts)
            .unwrap();
        assert_eq!(texts(&tl), vec!["a", "b"]);
    }

    #[test]
    fn malformed_markup_is_rejected() {
        let d = UtteranceDefaults::default();
        let o = MarkupOptions::default();
        assert!(matches!(flatten_markup("<speak>oops", &d, &o), Err(MarkupError::Malformed(_))));
        assert!(matches!(
            flatten_markup("<speak><p>x</s></speak>", &d, &o),
            Err(MarkupError::Malformed(_))
        ));
        assert!(matches!(flatten_markup("<speak>&bogus;</speak>", &d, &o), Err(MarkupError::Malformed(_))));
    }

    #[test]
    fn limits_fail_or_warn() {
        let deep = format!("{}x{}", "<p>".repeat(14), "</p>".repeat(14));
        let d = UtteranceDefaults::default();

        let fail = MarkupOptions {
            error_mode: ErrorMode::Fail,
            ..Default::default()
        };
        assert!(matches!(
            flatten_markup(&deep, &d, &fail),
            Err(MarkupError::TooDeep { depth: 15, limit: 12 })
        ));

        let warn = MarkupOptions::default();
        assert_eq!(texts(&flatten_markup(&deep, &d, &warn).unwrap()), vec!["x"]);

        let off = MarkupOptions {
            validate: false,
            error_mode: ErrorMode::Fail,
            ..Default::default()
        };
        assert!(flatten_markup(&deep, &d, &off).is_ok());
    }

    #[test]
    fn text_limit_counts_chars() {
        let opts = MarkupOptions {
            error_mode: ErrorMode::Fail,
            limits: MarkupLimits {
                max_text_chars: 5,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = flatten_markup("<speak>abcdef</speak>", &UtteranceDefaults::default(), &opts)
            .unwrap_err();
        assert!(matches!(err, MarkupError::TextTooLong { chars: 6, limit: 5 }));
    }

    #[test]
    fn empty_markup_yields_empty_timeline() {
        assert!(flatten("<speak>   </speak>").is_empty());
        assert!(flatten("").is_empty());
    }

    #[test]
    fn declaration_and_comments_are_ignored() {
        let tl = flatten(r#"<?xml version="1.0"?><!-- note --><speak>Hi</speak>"#);
        assert_eq!(texts(&tl), vec!["Hi"]);
    }
}
