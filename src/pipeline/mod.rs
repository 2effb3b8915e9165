//! Pipeline stages for PDF-to-exam extraction.
//!
//! Each submodule implements exactly one step:
//!
//! ```text
//! upload ──▶ ocr ──────────────▶ llm ──────────▶ postprocess
//! (stage)    (submit/poll/fetch)  (structuring)   (JSON cleanup)
//! ```
//!
//! 1. [`upload`] stages uploaded bytes or validates a local path
//! 2. [`ocr`] submits the PDF and polls the OCR job until it finishes; the
//!    only stage that sleeps
//! 3. [`llm`] sends the lines JSON to the model
//! 4. [`postprocess`] parses and normalises the model reply

pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod upload;
