//! Timed-text transcripts to SRT cues.
//!
//! A transcript is a list of [`TimedSegment`]s, each holding word-level
//! timings. [`segment`] splits every segment into roughly equal-length cues
//! no longer than `max_len` characters, numbering cues globally across the
//! whole transcript.
//!
//! ```
//! use reclip::captions::{segment, TimedSegment, TimedWord};
//!
//! let transcript = vec![TimedSegment::new(0, 1500, vec![
//!     TimedWord::new(0, 500, "hello "),
//!     TimedWord::new(500, 500, "there"),
//! ])];
//! let cues = segment(&transcript, 200).unwrap();
//! assert_eq!(cues.len(), 1);
//! assert_eq!(cues[0].to_string(), "1\n0:00:00,000 --> 0:00:01,500\nhello there\n\n");
//! ```

use std::fmt;

/// Word start attribute.
const START: &str = "t";
/// Segment duration attribute.
const SEGMENT_DURATION: &str = "d";
/// Word duration attribute.
const WORD_DURATION: &str = "ac";

/// Default maximum cue length in characters.
pub const DEFAULT_MAX_LEN: usize = 200;

/// Errors raised while reading or segmenting a transcript.
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("transcript is not valid XML: {0}")]
    MalformedXml(String),

    #[error("transcript has no body element")]
    MissingBody,

    /// A timing attribute is missing or not an integer. `word` is `None` for
    /// segment-level attributes.
    #[error("malformed transcript at {}: {reason}", position(.segment, .word))]
    MalformedTranscript {
        segment: usize,
        word: Option<usize>,
        reason: String,
    },

    #[error("max cue length must be positive, got {0}")]
    InvalidMaxLen(usize),
}

pub type CaptionResult<T> = Result<T, CaptionError>;

fn position(segment: &usize, word: &Option<usize>) -> String {
    match word {
        Some(word) => format!("segment {}, word {}", segment, word),
        None => format!("segment {}", segment),
    }
}

/// A single timed word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedWord {
    pub start_ms: u64,
    pub duration_ms: u64,
    /// Unescaped text, including any surrounding whitespace.
    pub text: String,
}

impl TimedWord {
    pub fn new(start_ms: u64, duration_ms: u64, text: impl Into<String>) -> Self {
        Self {
            start_ms,
            duration_ms,
            text: text.into(),
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }
}

/// An ordered group of words with segment-level fallback timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedSegment {
    pub start_ms: u64,
    pub duration_ms: u64,
    pub words: Vec<TimedWord>,
}

impl TimedSegment {
    pub fn new(start_ms: u64, duration_ms: u64, words: Vec<TimedWord>) -> Self {
        Self {
            start_ms,
            duration_ms,
            words,
        }
    }

    pub fn end_ms(&self) -> u64 {
        self.start_ms.saturating_add(self.duration_ms)
    }

    /// Concatenated text of every word.
    pub fn full_text(&self) -> String {
        self.words.iter().map(|w| w.text.as_str()).collect()
    }

    /// Length of [`full_text`](Self::full_text) in characters.
    pub fn text_len(&self) -> usize {
        self.words.iter().map(|w| w.text.chars().count()).sum()
    }
}

/// One subtitle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cue {
    /// 1-based position in the output of one [`segment`] call.
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

impl fmt::Display for Cue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{} --> {}\n{}\n\n",
            self.index,
            format_timestamp(self.start_ms),
            format_timestamp(self.end_ms),
            self.text
        )
    }
}

/// Formats milliseconds as `H:MM:SS,mmm`. Hours are not wrapped.
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = ms / 60_000 % 60;
    let seconds = ms / 1_000 % 60;
    let millis = ms % 1_000;
    format!("{}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Target characters per cue for a segment of `text_len` characters.
///
/// The text is split into `text_len / max_len + 1` frames of equal length so
/// that the last cue of a segment is not a short leftover.
pub fn frame_len(text_len: usize, max_len: usize) -> usize {
    let frames = text_len / max_len + 1;
    text_len / frames
}

/// Running state of the walk over one segment's words.
struct CueAccumulator {
    buffer: String,
    buffer_len: usize,
    buffer_start: Option<u64>,
    flush_count: usize,
    /// Characters already emitted from this segment.
    emitted_len: usize,
    frame_len: usize,
}

impl CueAccumulator {
    fn new(segment_start: u64, frame_len: usize) -> Self {
        Self {
            buffer: String::new(),
            buffer_len: 0,
            buffer_start: Some(segment_start),
            flush_count: 0,
            emitted_len: 0,
            frame_len,
        }
    }

    /// Adds a word and returns `(start, text)` when the segment has passed
    /// the next frame boundary.
    fn push(&mut self, word: &TimedWord) -> Option<(u64, String)> {
        self.buffer.push_str(&word.text);
        self.buffer_len += word.text.chars().count();
        let start = *self.buffer_start.get_or_insert(word.start_ms);

        let threshold = self.frame_len * (self.flush_count + 1);
        if self.buffer_len > 0 && self.emitted_len + self.buffer_len > threshold {
            Some((start, self.flush()))
        } else {
            None
        }
    }

    /// Drains whatever text is left once the segment's words are exhausted.
    fn finish(mut self, segment_start: u64) -> Option<(u64, String)> {
        if self.buffer.is_empty() {
            return None;
        }
        let start = self.buffer_start.unwrap_or(segment_start);
        Some((start, self.flush()))
    }

    fn flush(&mut self) -> String {
        self.emitted_len += self.buffer_len;
        self.flush_count += 1;
        self.buffer_len = 0;
        self.buffer_start = None;
        std::mem::take(&mut self.buffer)
    }
}

/// Splits a transcript into cues of at most roughly `max_len` characters.
///
/// Within a segment a cue is cut as soon as the text consumed so far passes
/// the next multiple of the segment's [`frame_len`]. A cut cue ends where the
/// word that triggered it ends; the last cue of a segment ends at the
/// segment's own end. Segments without text produce no cue and consume no
/// index.
pub fn segment(transcript: &[TimedSegment], max_len: usize) -> CaptionResult<Vec<Cue>> {
    if max_len == 0 {
        return Err(CaptionError::InvalidMaxLen(max_len));
    }

    let mut cues: Vec<Cue> = Vec::new();

    for seg in transcript {
        let text_len = seg.text_len();
        if text_len == 0 {
            continue;
        }

        let mut acc = CueAccumulator::new(seg.start_ms, frame_len(text_len, max_len));
        for word in &seg.words {
            if let Some((start, text)) = acc.push(word) {
                push_cue(&mut cues, start, word.end_ms(), text);
            }
        }
        if let Some((start, text)) = acc.finish(seg.start_ms) {
            push_cue(&mut cues, start, seg.end_ms(), text);
        }
    }

    Ok(cues)
}

fn push_cue(cues: &mut Vec<Cue>, start_ms: u64, end_ms: u64, text: String) {
    cues.push(Cue {
        index: cues.len() + 1,
        start_ms,
        end_ms: end_ms.max(start_ms),
        text,
    });
}

/// Renders cues as an SRT document.
pub fn render_srt(cues: &[Cue]) -> String {
    cues.iter().map(Cue::to_string).collect()
}

/// Parses a timed-text (format 3) document into segments.
///
/// The second element under the root is the body. Each body element is a
/// segment carrying `t`, plus `d` unless it has no text; each of its
/// elements is a word carrying `t` and `ac`. A segment with text but no word elements becomes a
/// single word spanning the segment.
pub fn parse_transcript(xml: &str) -> CaptionResult<Vec<TimedSegment>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| CaptionError::MalformedXml(e.to_string()))?;

    let body = doc
        .root_element()
        .children()
        .filter(|n| n.is_element())
        .nth(1)
        .ok_or(CaptionError::MissingBody)?;

    body.children()
        .filter(|n| n.is_element())
        .enumerate()
        .map(|(seg_idx, node)| parse_segment(seg_idx, &node))
        .collect()
}

fn parse_segment(seg_idx: usize, node: &roxmltree::Node) -> CaptionResult<TimedSegment> {
    let start_ms = required_attr(node, START, seg_idx, None)?;

    let elements: Vec<roxmltree::Node> = node.children().filter(|n| n.is_element()).collect();
    if elements.is_empty() {
        let text = node.text().map(unescape_html).unwrap_or_default();
        let duration_ms = segment_duration(node, seg_idx, !text.is_empty())?;
        checked_end(start_ms, duration_ms, seg_idx, None)?;
        let words = if text.is_empty() {
            Vec::new()
        } else {
            vec![TimedWord::new(start_ms, duration_ms, text)]
        };
        return Ok(TimedSegment::new(start_ms, duration_ms, words));
    }

    let words = elements
        .iter()
        .enumerate()
        .map(|(word_idx, word)| {
            let start_ms = required_attr(word, START, seg_idx, Some(word_idx))?;
            let duration_ms = required_attr(word, WORD_DURATION, seg_idx, Some(word_idx))?;
            checked_end(start_ms, duration_ms, seg_idx, Some(word_idx))?;
            Ok(TimedWord {
                start_ms,
                duration_ms,
                text: word.text().map(unescape_html).unwrap_or_default(),
            })
        })
        .collect::<CaptionResult<Vec<_>>>()?;

    let has_text = words.iter().any(|w| !w.text.is_empty());
    let duration_ms = segment_duration(node, seg_idx, has_text)?;
    checked_end(start_ms, duration_ms, seg_idx, None)?;
    Ok(TimedSegment::new(start_ms, duration_ms, words))
}

/// Segment `d`. It bounds the last cue, so a segment with text must carry it.
fn segment_duration(node: &roxmltree::Node, segment: usize, has_text: bool) -> CaptionResult<u64> {
    match node.attribute(SEGMENT_DURATION) {
        Some(raw) => parse_ms(raw, SEGMENT_DURATION, segment, None),
        None if has_text => required_attr(node, SEGMENT_DURATION, segment, None),
        None => Ok(0),
    }
}

fn checked_end(start_ms: u64, duration_ms: u64, segment: usize, word: Option<usize>) -> CaptionResult<u64> {
    start_ms.checked_add(duration_ms).ok_or_else(|| CaptionError::MalformedTranscript {
        segment,
        word,
        reason: format!("end of {} + {} ms is out of range", start_ms, duration_ms),
    })
}

fn required_attr(node: &roxmltree::Node, name: &str, segment: usize, word: Option<usize>) -> CaptionResult<u64> {
    let raw = node.attribute(name).ok_or_else(|| CaptionError::MalformedTranscript {
        segment,
        word,
        reason: format!("missing attribute '{}'", name),
    })?;
    parse_ms(raw, name, segment, word)
}

fn parse_ms(raw: &str, name: &str, segment: usize, word: Option<usize>) -> CaptionResult<u64> {
    raw.trim().parse().map_err(|_| CaptionError::MalformedTranscript {
        segment,
        word,
        reason: format!("attribute '{}' is not a millisecond count: {:?}", name, raw),
    })
}

/// Decodes HTML entities (named, decimal and hex) that caption endpoints
/// leave in word text.
pub fn unescape_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Parses, segments and renders a transcript in one step.
pub fn xml_to_srt(xml: &str, max_len: usize) -> CaptionResult<String> {
    let transcript = parse_transcript(xml)?;
    Ok(render_srt(&segment(&transcript, max_len)?))
}
