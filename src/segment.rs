//! Math-text segmentation: split mixed prose/LaTeX into typed segments.
//!
//! Text fields produced by the structuring model mix plain prose with
//! display math (`\[ ... \]`) and inline math (`$ ... $`). Renderers need
//! those pieces separated so each can be typeset on its own.
//!
//! ## Algorithm
//!
//! 1. Trim the input; `None` or blank input yields no segments.
//! 2. Scan for block regions with a non-greedy pattern that may span lines.
//! 3. Scan each gap between block regions for inline regions with a
//!    non-greedy pattern that stops at line breaks.
//! 4. Whatever is left becomes [`Segment::Plain`], trimmed; blank leftovers
//!    are dropped.
//!
//! Block extraction always runs first, so a `$` inside `\[ ... \]` is never
//! read as an inline delimiter. Delimiters that never close stay in the plain
//! text. Nesting is not supported: the first closing delimiter wins, whatever
//! that does to the surrounding text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `\[ ... \]`, non-greedy, `.` matches newlines.
static RE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\\\[(.+?)\\\]").unwrap());

/// `$ ... $`, non-greedy, never crosses a line terminator.
static RE_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$([^\r\n\x{2028}\x{2029}]+?)\$").unwrap());

/// One contiguous, typed piece of a segmented string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum Segment {
    /// Prose, shown verbatim.
    #[serde(rename = "plain")]
    Plain(String),
    /// Math typeset within the line.
    #[serde(rename = "inline")]
    InlineMath(String),
    /// Math typeset on its own line.
    #[serde(rename = "block")]
    BlockMath(String),
}

impl Segment {
    /// The payload without delimiters.
    pub fn content(&self) -> &str {
        match self {
            Segment::Plain(s) | Segment::InlineMath(s) | Segment::BlockMath(s) => s,
        }
    }

    pub fn is_math(&self) -> bool {
        !matches!(self, Segment::Plain(_))
    }

    /// Source text for this segment with its delimiters re-inserted.
    ///
    /// Empty math payloads are written with a space between the delimiters
    /// (`$ $`, `\[ \]`); both patterns need at least one character inside.
    pub fn to_source(&self) -> String {
        match self {
            Segment::Plain(s) => s.clone(),
            Segment::InlineMath(m) if m.is_empty() => "$ $".to_string(),
            Segment::InlineMath(m) => format!("${m}$"),
            Segment::BlockMath(m) if m.is_empty() => "\\[ \\]".to_string(),
            Segment::BlockMath(m) => format!("\\[{m}\\]"),
        }
    }
}

/// Split `input` into plain, inline-math and block-math segments in reading
/// order.
///
/// ```rust
/// use pdf_exam_ocr::{segment, Segment};
///
/// let parts = segment("The answer is $x^2$.");
/// assert_eq!(
///     parts,
///     vec![
///         Segment::Plain("The answer is".into()),
///         Segment::InlineMath("x^2".into()),
///         Segment::Plain(".".into()),
///     ]
/// );
/// assert!(segment(None::<&str>).is_empty());
/// ```
pub fn segment<'a>(input: impl Into<Option<&'a str>>) -> Vec<Segment> {
    let Some(text) = input.into() else {
        return Vec::new();
    };
    let text = text.trim();
    let mut segments = Vec::new();
    if text.is_empty() {
        return segments;
    }

    let mut last = 0;
    for caps in RE_BLOCK.captures_iter(text) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_inline_segments(&text[last..whole.start()], &mut segments);
        segments.push(Segment::BlockMath(body.as_str().trim().to_string()));
        last = whole.end();
    }
    push_inline_segments(&text[last..], &mut segments);

    segments
}

/// Segment a span that contains no block math.
fn push_inline_segments(span: &str, out: &mut Vec<Segment>) {
    let span = span.trim();
    if span.is_empty() {
        return;
    }

    let mut last = 0;
    for caps in RE_INLINE.captures_iter(span) {
        let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        push_plain(&span[last..whole.start()], out);
        out.push(Segment::InlineMath(body.as_str().trim().to_string()));
        last = whole.end();
    }
    push_plain(&span[last..], out);
}

fn push_plain(span: &str, out: &mut Vec<Segment>) {
    let plain = span.trim();
    if !plain.is_empty() {
        out.push(Segment::Plain(plain.to_string()));
    }
}

/// Rebuild source text from segments, one space between each.
///
/// Feeding the result back through [`segment`] reproduces `segments` as long
/// as no plain segment carries a dangling delimiter next to a math segment.
pub fn to_source(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(Segment::to_source)
        .collect::<Vec<_>>()
        .join(" ")
}
