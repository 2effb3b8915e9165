//! Error types for the pdf-exam-ocr library.
//!
//! A single fatal error type, [`ExamOcrError`], covers every stage of the
//! pipeline: staging the upload, the OCR job, the structuring call and the
//! configuration. The segmenter and the renderer cannot fail and have no
//! error type of their own.
//!
//! The HTTP layer deliberately collapses these kinds into a generic response
//! body; [`ExamOcrError::status_code`] only picks the status line. The full
//! message is logged server-side.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the pdf-exam-ocr library.
#[derive(Debug, Error)]
pub enum ExamOcrError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The multipart request carried no `pdf` file field.
    #[error("No file uploaded")]
    NoFileProvided,

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// The multipart body could not be read.
    #[error("Invalid upload: {detail}")]
    InvalidUpload { detail: String },

    /// The bytes were read, but they are not a PDF.
    #[error("Upload '{name}' is not a valid PDF\nFirst bytes: {magic:?}")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// Writing the upload to its temporary staging file failed.
    #[error("Failed to stage upload '{name}': {source}")]
    Staging {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// Mathpix credentials are missing.
    #[error("OCR service is not configured: {hint}")]
    OcrNotConfigured { hint: String },

    /// The HTTP request to the OCR service failed at the transport level.
    #[error("OCR request to '{endpoint}' failed: {source}")]
    OcrRequest {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The OCR service answered with a non-success HTTP status.
    #[error("OCR service returned HTTP {status}: {body}")]
    OcrApi { status: u16, body: String },

    /// The OCR job reached the terminal `error` state.
    #[error("OCR job '{job_id}' failed: {detail}")]
    OcrJobFailed { job_id: String, detail: String },

    /// The OCR job was still running after the configured number of polls.
    #[error("OCR job '{job_id}' did not complete after {attempts} polls ({waited:?})")]
    OcrTimeout {
        job_id: String,
        attempts: u32,
        waited: Duration,
    },

    /// The wait for the OCR job was cancelled (shutdown or Ctrl-C).
    #[error("Waiting for OCR job '{job_id}' was cancelled")]
    Cancelled { job_id: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The structuring call exceeded `api_timeout_secs`.
    #[error("LLM call timed out after {secs}s")]
    LlmTimeout { secs: u64 },

    /// The model reply was empty, not JSON, or did not match the exam schema.
    #[error("Failed to structure exam data: {detail}")]
    StructuringFailed { detail: String },

    // ── Config / IO errors ────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading or writing a local file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener could not be bound.
    #[error("Failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExamOcrError {
    /// HTTP status code used when this error ends a request.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoFileProvided | Self::InvalidUpload { .. } | Self::NotAPdf { .. } => 400,
            Self::OcrTimeout { .. } | Self::LlmTimeout { .. } => 504,
            _ => 500,
        }
    }

    /// True when the failure came from the caller's input rather than a
    /// downstream service.
    pub fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }
}
