//! Progress-callback trait for extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to observe
//! an extraction as it moves through upload, OCR polling and structuring.
//! The CLI uses it to drive a spinner; the server leaves it unset and relies
//! on `tracing` output instead.
//!
//! # Example
//!
//! ```rust
//! use pdf_exam_ocr::{ExtractionConfig, ExtractionProgressCallback, OcrJobStatus};
//! use std::sync::{Arc, atomic::{AtomicU32, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicU32,
//! }
//!
//! impl ExtractionProgressCallback for PollCounter {
//!     fn on_poll(&self, _job_id: &str, attempt: u32, status: &OcrJobStatus) {
//!         self.polls.store(attempt, Ordering::SeqCst);
//!         eprintln!("poll {attempt}: {}", status.status);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(PollCounter { polls: AtomicU32::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::pipeline::ocr::OcrJobStatus;
use std::sync::Arc;

/// Called by the extraction pipeline at each stage boundary.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: the server
/// may run many extractions at once on different worker threads.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called before the PDF is sent to the OCR service.
    fn on_upload_start(&self, file_name: &str, size_bytes: usize) {
        let _ = (file_name, size_bytes);
    }

    /// Called once the OCR service has accepted the job.
    fn on_job_submitted(&self, job_id: &str) {
        let _ = job_id;
    }

    /// Called after every status poll (1-indexed `attempt`).
    fn on_poll(&self, job_id: &str, attempt: u32, status: &OcrJobStatus) {
        let _ = (job_id, attempt, status);
    }

    /// Called after the OCR result payload has been fetched.
    fn on_ocr_complete(&self, job_id: &str, payload_bytes: usize) {
        let _ = (job_id, payload_bytes);
    }

    /// Called just before the structuring request is sent.
    fn on_structuring_start(&self) {}

    /// Called once with the number of questions extracted.
    fn on_extraction_complete(&self, question_count: usize) {
        let _ = question_count;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
