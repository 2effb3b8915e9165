//! Post-processing: turn the model's reply into a clean [`StructuredExam`].
//!
//! The structuring prompt asks for a bare JSON object, but models still wrap
//! it in ` ```json ` fences, prepend a sentence, emit a BOM, or write the
//! diagram URL as Markdown. These deterministic rules fix those quirks
//! without touching the question text itself.
//!
//! ## Rule Order
//!
//! Text rules run before parsing (invisible characters, fences, then
//! locating the outer object). Field rules run on the parsed value: trim,
//! drop empty options, normalise `image`, then blank `hint` → `None`.

use crate::error::ExamOcrError;
use crate::exam::{Question, StructuredExam};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

/// Parse a raw model reply into a normalised exam.
///
/// Fails with [`ExamOcrError::StructuringFailed`] when the reply holds no
/// JSON object or the object does not match the exam shape.
pub fn parse_exam_response(raw: &str) -> Result<StructuredExam, ExamOcrError> {
    let text = remove_invisible_chars(raw);
    let text = strip_code_fences(&text);
    let json = extract_json_object(&text).ok_or_else(|| ExamOcrError::StructuringFailed {
        detail: format!("reply contains no JSON object ({} chars)", raw.len()),
    })?;

    let exam: StructuredExam =
        serde_json::from_str(json).map_err(|e| ExamOcrError::StructuringFailed {
            detail: e.to_string(),
        })?;
    Ok(normalize_exam(exam))
}

/// Apply the field rules to every question.
pub fn normalize_exam(exam: StructuredExam) -> StructuredExam {
    let questions = exam
        .questions
        .into_iter()
        .map(normalize_question)
        .collect::<Vec<_>>();
    debug!("Normalised {} questions", questions.len());

    StructuredExam {
        subject: exam.subject.trim().to_string(),
        topic: exam.topic.trim().to_string(),
        sub_topic: exam.sub_topic.trim().to_string(),
        questions,
    }
}

fn normalize_question(q: Question) -> Question {
    Question {
        question: q.question.trim().to_string(),
        options: q
            .options
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect(),
        image: q.image.as_deref().and_then(normalize_image_url),
        hint: q
            .hint
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty()),
    }
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        ['\u{200B}', '\u{FEFF}', '\u{200C}', '\u{200D}', '\u{2060}'],
        "",
    )
}

// ── Rule 2: Strip code fences ────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove one pair of outer ```` ``` ```` fences, with or without a language tag.
pub fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

// ── Rule 3: Locate the outer object ──────────────────────────────────────────

/// Slice from the first `{` to the last `}`, dropping any prose around it.
pub fn extract_json_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

// ── Rule 4: Normalise diagram URLs ───────────────────────────────────────────
//
// The OCR output references diagrams as Markdown images on the OCR CDN. The
// prompt asks for the bare URL, but models regularly copy the Markdown form
// or invent a placeholder for a figure they cannot see.

static RE_MARKDOWN_IMAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!\[[^\]]*\]\(\s*([^)\s]+)(?:\s+[^)]*)?\)$").unwrap());

/// Return a usable absolute image URL, or `None` to drop the field.
///
/// Accepts a bare URL or a Markdown image `![alt](url)`. Anything that is
/// not `http(s)` or points at a known placeholder host is dropped.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("null") {
        return None;
    }

    let url = match RE_MARKDOWN_IMAGE.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    };

    if is_placeholder_url(&url) {
        warn!("Dropping unusable image reference: {}", trimmed);
        return None;
    }
    Some(url)
}

fn is_placeholder_url(url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return true;
    }
    let fake_domains = [
        "example.com",
        "placeholder.com",
        "via.placeholder.com",
        "dummyimage.com",
        "lorempixel.com",
        "picsum.photos",
        "placehold.it",
    ];
    fake_domains.iter().any(|d| url.contains(d))
}

// ── Tests ────────────────────────────────────────────────────────────────────
