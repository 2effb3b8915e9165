//! # pdf-exam-ocr
//!
//! Turn scanned or typeset exam papers (PDF) into structured question data
//! and render it, LaTeX included, as HTML.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Stage      validate %PDF magic, write upload to a temp file
//!  ├─ 2. OCR        submit to Mathpix, poll every 2 s, fetch lines JSON
//!  ├─ 3. Structure  LLM (gemini-2.5-flash by default) → StructuredExam JSON
//!  ├─ 4. Clean      strip fences, trim fields, normalise diagram URLs
//!  └─ 5. Render     segment $…$ / \[…\] math, emit HTML for KaTeX
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_exam_ocr::{extract, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Structuring provider auto-detected from GEMINI_API_KEY and friends
//!     let config = ExtractionConfig::builder()
//!         .mathpix_credentials(std::env::var("MATHPIX_APP_ID")?, std::env::var("MATHPIX_APP_KEY")?)
//!         .build()?;
//!     let output = extract("paper.pdf", &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.exam)?);
//!     eprintln!("{} questions, {} polls", output.stats.questions, output.stats.poll_attempts);
//!     Ok(())
//! }
//! ```
//!
//! The segmenter is usable on its own:
//!
//! ```rust
//! use pdf_exam_ocr::{segment, Segment};
//!
//! let parts = segment("\\[E=mc^2\\]");
//! assert_eq!(parts, vec![Segment::BlockMath("E=mc^2".into())]);
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP server ([`server`]) |
//! | `cli`    | on      | `exam-ocr` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable both when using only the library:
//! ```toml
//! pdf-exam-ocr = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod exam;
pub mod extract;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod render;
pub mod segment;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ExtractionConfig, ExtractionConfigBuilder, OcrOptions, PollPolicy, ServerConfig, DEFAULT_MODEL,
    DEFAULT_OCR_BASE_URL,
};
pub use error::ExamOcrError;
pub use exam::{ExtractionOutput, ExtractionStats, Question, StructuredExam};
pub use extract::{extract, extract_from_bytes, extract_sync, resolve_provider, structure_payload, ExamPipeline};
pub use pipeline::llm::{ExamStructurer, StructuringClient, StructuringOutput};
pub use pipeline::ocr::{poll_until_complete, JobState, MathpixClient, OcrJobStatus, OcrService, PollOutcome};
pub use pipeline::upload::PdfSource;
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use render::{render_exam, render_page, render_segments, upload_page};
pub use segment::{segment, to_source, Segment};
