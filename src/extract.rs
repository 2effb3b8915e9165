//! Extraction entry points: PDF in, [`StructuredExam`] out.
//!
//! [`ExamPipeline`] owns the two remote services (OCR and structuring) and
//! runs a [`PdfSource`] through them. It is built once and shared; the HTTP
//! server keeps one in its state and the CLI builds one per invocation.
//!
//! The free functions ([`extract`], [`extract_from_bytes`], [`extract_sync`],
//! [`structure_payload`]) are thin wrappers for callers that only have an
//! [`ExtractionConfig`].

use crate::config::{ExtractionConfig, PollPolicy};
use crate::error::ExamOcrError;
use crate::exam::{ExtractionOutput, ExtractionStats, StructuredExam};
use crate::pipeline::llm::{ExamStructurer, StructuringClient, StructuringOutput};
use crate::pipeline::ocr::{poll_until_complete, MathpixClient, OcrService};
use crate::pipeline::upload::PdfSource;
use crate::progress::ProgressCallback;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info};

/// OCR service + structurer + polling policy, ready to process PDFs.
pub struct ExamPipeline {
    ocr: Arc<dyn OcrService>,
    structurer: Arc<dyn ExamStructurer>,
    policy: PollPolicy,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for ExamPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamPipeline")
            .field("policy", &self.policy)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

impl ExamPipeline {
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        ocr: Arc<dyn OcrService>,
        structurer: Arc<dyn ExamStructurer>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            ocr,
            structurer,
            policy,
            progress: None,
        }
    }

    /// Attach a progress observer.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build the production pipeline: Mathpix for OCR and the resolved LLM
    /// provider for structuring.
    pub async fn from_config(config: &ExtractionConfig) -> Result<Self, ExamOcrError> {
        let ocr = MathpixClient::from_config(config)?;
        let provider = resolve_provider(config).await?;
        let structurer = StructuringClient::new(provider, config);

        let mut pipeline = Self::new(Arc::new(ocr), Arc::new(structurer), config.poll_policy());
        pipeline.progress = config.progress_callback.clone();
        Ok(pipeline)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    /// Run one PDF through OCR and structuring.
    ///
    /// `cancel` aborts the OCR wait when it turns `true`; the structuring
    /// call itself is not interrupted.
    pub async fn run(
        &self,
        pdf: &PdfSource,
        cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ExtractionOutput, ExamOcrError> {
        let total_start = Instant::now();
        info!("Processing PDF '{}'", pdf.file_name());

        // ── Step 1: Submit ───────────────────────────────────────────────
        let ocr_start = Instant::now();
        if let Some(ref cb) = self.progress {
            let size = tokio::fs::metadata(pdf.path())
                .await
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            cb.on_upload_start(pdf.file_name(), size);
        }
        let job_id = self.ocr.submit(pdf).await?;
        if let Some(ref cb) = self.progress {
            cb.on_job_submitted(&job_id);
        }

        // ── Step 2: Poll until the job finishes ──────────────────────────
        let outcome = poll_until_complete(
            self.ocr.as_ref(),
            &job_id,
            self.policy,
            cancel,
            self.progress.as_ref(),
        )
        .await?;
        let ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
        let payload_bytes = serde_json::to_vec(&outcome.payload)
            .map(|v| v.len())
            .unwrap_or(0);
        info!(
            "OCR job {} completed: {} pages, {} polls, {} bytes",
            job_id, outcome.pages, outcome.attempts, payload_bytes
        );
        if let Some(ref cb) = self.progress {
            cb.on_ocr_complete(&job_id, payload_bytes);
        }

        // ── Step 3: Structure ────────────────────────────────────────────
        let structured = self.structure(&outcome.payload).await?;

        let stats = ExtractionStats {
            pages: outcome.pages,
            poll_attempts: outcome.attempts,
            ocr_payload_bytes: payload_bytes,
            questions: structured.exam.questions.len(),
            input_tokens: structured.input_tokens,
            output_tokens: structured.output_tokens,
            ocr_duration_ms,
            llm_duration_ms: structured.duration_ms,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        info!(
            "Extracted {} questions from '{}' in {}ms",
            stats.questions,
            pdf.file_name(),
            stats.total_duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_extraction_complete(stats.questions);
        }

        Ok(ExtractionOutput {
            exam: structured.exam,
            job_id,
            stats,
        })
    }

    /// Structure an OCR payload that is already in hand.
    pub async fn structure(
        &self,
        raw: &serde_json::Value,
    ) -> Result<StructuringOutput, ExamOcrError> {
        if let Some(ref cb) = self.progress {
            cb.on_structuring_start();
        }
        let out = self.structurer.structure(raw).await?;
        debug!(
            "Structured {} questions ({} in / {} out tokens)",
            out.exam.questions.len(),
            out.input_tokens,
            out.output_tokens
        );
        Ok(out)
    }
}

/// Extract a structured exam from a local PDF.
///
/// # Errors
/// - [`ExamOcrError::FileNotFound`] / [`ExamOcrError::NotAPdf`] for bad input
/// - [`ExamOcrError::OcrNotConfigured`] without Mathpix credentials
/// - [`ExamOcrError::OcrTimeout`] when the job outlives the poll budget
/// - [`ExamOcrError::StructuringFailed`] when the model reply is unusable
pub async fn extract(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExamOcrError> {
    let pdf = PdfSource::from_path(path)?;
    let pipeline = ExamPipeline::from_config(config).await?;
    pipeline.run(&pdf, None).await
}

/// Extract a structured exam from PDF bytes held in memory.
///
/// The bytes are staged to a temp file that is removed on return, success
/// or not.
pub async fn extract_from_bytes(
    bytes: &[u8],
    file_name: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExamOcrError> {
    let pdf = PdfSource::from_bytes(file_name, bytes)?;
    let pipeline = ExamPipeline::from_config(config).await?;
    pipeline.run(&pdf, None).await
}

/// Synchronous wrapper around [`extract`].
///
/// Creates a Tokio runtime internally. Do not call from inside an existing
/// async runtime.
pub fn extract_sync(
    path: impl AsRef<Path>,
    config: &ExtractionConfig,
) -> Result<ExtractionOutput, ExamOcrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ExamOcrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(extract(path, config))
}

/// Structure a raw OCR payload without running OCR.
///
/// Needs an LLM provider but no Mathpix credentials.
pub async fn structure_payload(
    raw: &serde_json::Value,
    config: &ExtractionConfig,
) -> Result<StructuredExam, ExamOcrError> {
    let provider = resolve_provider(config).await?;
    let client = StructuringClient::new(provider, config);
    Ok(client.structure(raw).await?.exam)
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ExamOcrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExamOcrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    the default model.
/// 3. **Environment pair** `EXAM_OCR_LLM_PROVIDER` + `EXAM_OCR_MODEL`, when
///    both are set.
/// 4. **Gemini** when `GEMINI_API_KEY` is present.
/// 5. **Full auto-detection** via `ProviderFactory::from_env`.
pub async fn resolve_provider(
    config: &ExtractionConfig,
) -> Result<Arc<dyn LLMProvider>, ExamOcrError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        return create_provider(name, config.model_or_default());
    }

    // 3) Environment pair
    if let (Some(prov), Some(model)) = (
        env_non_empty("EXAM_OCR_LLM_PROVIDER"),
        env_non_empty("EXAM_OCR_MODEL"),
    ) {
        return create_provider(&prov, &model);
    }

    // 4) Gemini is the default structuring backend
    if env_non_empty("GEMINI_API_KEY").is_some() {
        return create_provider("gemini", config.model_or_default());
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExamOcrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, or EXAM_OCR_LLM_PROVIDER and EXAM_OCR_MODEL.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
