//! HTML rendering of a [`StructuredExam`].
//!
//! Every text field goes through [`crate::segment`]. Plain segments are
//! HTML-escaped; math segments are written as KaTeX targets
//! (`span.math.math-inline`, `div.math.math-display`) holding the escaped
//! LaTeX source, and a small script typesets them in the browser. Nothing
//! here can fail.

use crate::exam::{Question, StructuredExam};
use crate::segment::{segment, Segment};
use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write;

const KATEX_VERSION: &str = "0.16.11";

/// Text shown when the exam holds no questions.
pub const EMPTY_PLACEHOLDER: &str = "Upload a PDF to see questions here.";

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; line-height: 1.5; }
header h1 { margin-bottom: 0.25rem; }
header p { color: #555; margin-top: 0; }
.question { border-bottom: 1px solid #ddd; padding: 1rem 0; }
.question img { max-width: 100%; margin: 0.5rem 0; }
.hint { color: #2d6a4f; font-style: italic; }
.math-display { margin: 0.5rem 0; text-align: center; }
.placeholder { color: #888; }
"#;

const TYPESET_SCRIPT: &str = r#"
document.addEventListener("DOMContentLoaded", function () {
  document.querySelectorAll(".math").forEach(function (el) {
    katex.render(el.textContent, el, {
      displayMode: el.classList.contains("math-display"),
      throwOnError: false
    });
  });
});
"#;

/// Render one text field as HTML.
///
/// Adjacent segments are separated by a single space, matching
/// [`crate::segment::to_source`].
pub fn render_segments(text: &str) -> String {
    segment(text)
        .iter()
        .map(render_segment)
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_segment(seg: &Segment) -> String {
    match seg {
        Segment::Plain(s) => encode_text(s).into_owned(),
        Segment::InlineMath(m) => {
            format!(r#"<span class="math math-inline">{}</span>"#, encode_text(m))
        }
        Segment::BlockMath(m) => {
            format!(r#"<div class="math math-display">{}</div>"#, encode_text(m))
        }
    }
}

fn render_question(out: &mut String, number: usize, q: &Question) {
    out.push_str("<section class=\"question\">\n");
    let _ = writeln!(
        out,
        "<div class=\"question-text\"><strong>Q{}:</strong> {}</div>",
        number,
        render_segments(&q.question)
    );

    if !q.options.is_empty() {
        out.push_str("<ol type=\"1\">\n");
        for option in &q.options {
            let _ = writeln!(out, "<li>{}</li>", render_segments(option));
        }
        out.push_str("</ol>\n");
    }

    if let Some(ref url) = q.image {
        let _ = writeln!(
            out,
            "<img src=\"{}\" alt=\"Question {}\" loading=\"lazy\">",
            encode_double_quoted_attribute(url),
            number
        );
    }

    if let Some(ref hint) = q.hint {
        let _ = writeln!(
            out,
            "<div class=\"hint\">Hint: {}</div>",
            render_segments(hint)
        );
    }
    out.push_str("</section>\n");
}

/// Render the exam header and questions as an HTML fragment.
pub fn render_exam(exam: &StructuredExam) -> String {
    let mut out = String::with_capacity(256 + exam.questions.len() * 512);

    let heading = [&exam.subject, &exam.topic, &exam.sub_topic]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .map(|s| encode_text(s.as_str()).into_owned())
        .collect::<Vec<_>>();
    if !heading.is_empty() {
        out.push_str("<header>\n");
        let _ = writeln!(out, "<h1>{}</h1>", heading[0]);
        if heading.len() > 1 {
            let _ = writeln!(out, "<p>{}</p>", heading[1..].join(" · "));
        }
        out.push_str("</header>\n");
    }

    if exam.questions.is_empty() {
        let _ = writeln!(out, "<p class=\"placeholder\">{}</p>", EMPTY_PLACEHOLDER);
        return out;
    }

    for (idx, q) in exam.questions.iter().enumerate() {
        render_question(&mut out, idx + 1, q);
    }
    out
}

/// Wrap `body` in a complete HTML document that loads KaTeX.
fn page_shell(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/katex@{v}/dist/katex.min.css">
<script defer src="https://cdn.jsdelivr.net/npm/katex@{v}/dist/katex.min.js"></script>
<style>{STYLE}</style>
</head>
<body>
{body}<script>{TYPESET_SCRIPT}</script>
</body>
</html>
"#,
        title = encode_text(title),
        v = KATEX_VERSION,
    )
}

/// Render a standalone HTML page for `exam`.
pub fn render_page(exam: &StructuredExam) -> String {
    let title = if exam.subject.trim().is_empty() {
        "PDF OCR Viewer"
    } else {
        exam.subject.trim()
    };
    page_shell(title, &render_exam(exam))
}

/// The upload form served at `/`.
pub fn upload_page() -> String {
    let body = r#"<header><h1>PDF OCR Viewer</h1></header>
<form action="/view" method="post" enctype="multipart/form-data">
  <input type="file" name="pdf" accept="application/pdf" required>
  <button type="submit">Upload PDF</button>
</form>
<p><a href="/test">Test structuring with an empty payload</a></p>
<p class="placeholder">Upload a PDF to see questions here.</p>
"#;
    page_shell("PDF OCR Viewer", body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_exam() -> StructuredExam {
        StructuredExam {
            subject: "Physics".into(),
            topic: "Mechanics".into(),
            sub_topic: "Work & Energy".into(),
            questions: vec![
                Question {
                    question: "A block of mass $m$ slides. Find \\[v = \\sqrt{2gh}\\]".into(),
                    options: vec!["$1$ m/s".into(), "2 < 3 m/s".into()],
                    image: Some("https://cdn.mathpix.com/a.jpg?height=1&width=2".into()),
                    hint: Some("Use $E_k = \\frac{1}{2}mv^2$".into()),
                },
                Question {
                    question: "Define power.".into(),
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn segments_become_katex_targets() {
        let html = render_segments("Let $x<1$ and \\[y\\]");
        assert_eq!(
            html,
            "Let <span class=\"math math-inline\">x&lt;1</span> and \
             <div class=\"math math-display\">y</div>"
        );
    }

    #[test]
    fn plain_text_is_escaped() {
        assert_eq!(render_segments("<script>alert(1)</script>"), "&lt;script&gt;alert(1)&lt;/script&gt;");
    }

    #[test]
    fn questions_are_numbered_with_options_image_and_hint() {
        let html = render_exam(&sample_exam());
        assert!(html.contains("<strong>Q1:</strong>"));
        assert!(html.contains("<strong>Q2:</strong>"));
        assert!(html.contains("<ol type=\"1\">"));
        assert!(html.contains("<li>2 &lt; 3 m/s</li>"));
        assert!(html.contains("alt=\"Question 1\""));
        assert!(html.contains("src=\"https://cdn.mathpix.com/a.jpg?height=1&amp;width=2\""));
        assert!(html.contains("Hint: Use <span class=\"math math-inline\">"));
        assert!(html.contains("Work &amp; Energy"));
        // Q2 has no options, image or hint
        assert_eq!(html.matches("<ol").count(), 1);
        assert_eq!(html.matches("<img").count(), 1);
    }

    #[test]
    fn hint_with_display_math_is_not_in_a_paragraph() {
        let exam = StructuredExam {
            questions: vec![Question {
                question: "Find the root.".into(),
                hint: Some("Complete the square: \\[(x-1)^2 = 0\\]".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let html = render_exam(&exam);
        assert!(html.contains(
            "<div class=\"hint\">Hint: Complete the square: \
             <div class=\"math math-display\">(x-1)^2 = 0</div></div>"
        ));
        assert!(!html.contains("<p class=\"hint\">"));
    }

    #[test]
    fn empty_exam_shows_placeholder() {
        let html = render_exam(&StructuredExam::default());
        assert!(html.contains(EMPTY_PLACEHOLDER));
        assert!(!html.contains("<header>"));
    }

    #[test]
    fn page_loads_katex_and_typesets() {
        let page = render_page(&sample_exam());
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("katex.min.js"));
        assert!(page.contains("katex.render"));
        assert!(page.contains("<title>Physics</title>"));
    }

    #[test]
    fn upload_form_posts_pdf_field() {
        let page = upload_page();
        assert!(page.contains("name=\"pdf\""));
        assert!(page.contains("action=\"/view\""));
        assert!(page.contains("href=\"/test\""));
    }
}
