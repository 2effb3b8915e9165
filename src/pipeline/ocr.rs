//! OCR stage: submit the PDF, wait for the job, fetch the lines JSON.
//!
//! The OCR service processes PDFs asynchronously. A submit returns a job id;
//! the job then moves through `received → loaded → split → completed` (or
//! `error`). [`poll_until_complete`] waits for a terminal state with a fixed
//! delay before every status request and gives up after
//! [`PollPolicy::max_attempts`] polls. The wait can be cancelled through a
//! `watch` channel, which the server flips on shutdown and the CLI on Ctrl-C.
//!
//! [`OcrService`] is the seam between the polling loop and the HTTP client;
//! [`MathpixClient`] is the production implementation.

use crate::config::{ExtractionConfig, OcrOptions, PollPolicy};
use crate::error::ExamOcrError;
use crate::pipeline::upload::PdfSource;
use crate::progress::ProgressCallback;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep_until;
use tracing::{debug, info};

/// Lifecycle state of an OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Received,
    Loaded,
    Split,
    Completed,
    Error,
    /// Any state this crate does not know about; treated as still running.
    #[serde(other)]
    Unknown,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Received => "received",
            JobState::Loaded => "loaded",
            JobState::Split => "split",
            JobState::Completed => "completed",
            JobState::Error => "error",
            JobState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One status response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrJobStatus {
    pub status: JobState,
    #[serde(default)]
    pub num_pages: Option<u32>,
    #[serde(default)]
    pub num_pages_completed: Option<u32>,
    #[serde(default)]
    pub percent_done: Option<f64>,
    /// Error description; a string or an object depending on the failure.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl OcrJobStatus {
    pub fn new(status: JobState) -> Self {
        Self {
            status,
            num_pages: None,
            num_pages_completed: None,
            percent_done: None,
            error: None,
        }
    }

    /// Human-readable error text for a failed job.
    pub fn error_detail(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "no error detail reported".to_string(),
        }
    }
}

/// What a successful wait produced.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    /// Raw lines JSON of the finished job.
    pub payload: serde_json::Value,
    /// Status requests made, including the one that saw `completed`.
    pub attempts: u32,
    /// Page count from the final status (0 if never reported).
    pub pages: u32,
}

/// Remote OCR job API.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Upload the PDF and return the job id.
    async fn submit(&self, pdf: &PdfSource) -> Result<String, ExamOcrError>;

    /// Query the job's current state.
    async fn status(&self, job_id: &str) -> Result<OcrJobStatus, ExamOcrError>;

    /// Fetch the result payload of a completed job.
    async fn fetch_result(&self, job_id: &str) -> Result<serde_json::Value, ExamOcrError>;
}

/// Wait for `job_id` to finish and return its result payload.
///
/// Every iteration sleeps `policy.interval` first, then asks for the status:
///
/// * `completed` → fetch and return the payload
/// * `error` → [`ExamOcrError::OcrJobFailed`]
/// * anything else → poll again, up to `policy.max_attempts` polls, then
///   [`ExamOcrError::OcrTimeout`]
///
/// If `cancel` turns `true` during a wait the call returns
/// [`ExamOcrError::Cancelled`] without another request. Errors from the
/// service are returned unchanged.
pub async fn poll_until_complete<S>(
    service: &S,
    job_id: &str,
    policy: PollPolicy,
    mut cancel: Option<watch::Receiver<bool>>,
    progress: Option<&ProgressCallback>,
) -> Result<PollOutcome, ExamOcrError>
where
    S: OcrService + ?Sized,
{
    let started = Instant::now();

    for attempt in 1..=policy.max_attempts {
        if wait_or_cancel(policy.interval, cancel.as_mut()).await {
            info!("OCR job {}: wait cancelled after {} polls", job_id, attempt - 1);
            return Err(ExamOcrError::Cancelled {
                job_id: job_id.to_string(),
            });
        }

        let status = service.status(job_id).await?;
        info!(
            "PDF status: {} ({}/{})",
            status.status,
            status.num_pages_completed.unwrap_or(0),
            status.num_pages.unwrap_or(0)
        );
        if let Some(cb) = progress {
            cb.on_poll(job_id, attempt, &status);
        }

        match status.status {
            JobState::Completed => {
                let payload = service.fetch_result(job_id).await?;
                return Ok(PollOutcome {
                    payload,
                    attempts: attempt,
                    pages: status.num_pages.unwrap_or(0),
                });
            }
            JobState::Error => {
                return Err(ExamOcrError::OcrJobFailed {
                    job_id: job_id.to_string(),
                    detail: status.error_detail(),
                });
            }
            _ => {}
        }
    }

    Err(ExamOcrError::OcrTimeout {
        job_id: job_id.to_string(),
        attempts: policy.max_attempts,
        waited: started.elapsed(),
    })
}

/// Sleep for `delay`; returns `true` if cancelled first.
///
/// A dropped sender means nobody can cancel any more; the sleep then simply
/// runs to its deadline.
async fn wait_or_cancel(delay: Duration, cancel: Option<&mut watch::Receiver<bool>>) -> bool {
    let deadline = tokio::time::Instant::now() + delay;
    let Some(rx) = cancel else {
        sleep_until(deadline).await;
        return false;
    };
    if *rx.borrow_and_update() {
        return true;
    }

    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return false,
            changed = rx.changed() => {
                if changed.is_err() {
                    sleep_until(deadline).await;
                    return false;
                }
                if *rx.borrow_and_update() {
                    return true;
                }
            }
        }
    }
}

// ── Mathpix client ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    pdf_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// [`OcrService`] backed by the Mathpix v3 PDF API.
///
/// Built once from [`ExtractionConfig`] and shared; the inner
/// `reqwest::Client` pools connections across requests.
#[derive(Clone)]
pub struct MathpixClient {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_key: String,
    options: OcrOptions,
}

impl fmt::Debug for MathpixClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MathpixClient")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl MathpixClient {
    /// Build a client from the credentials and endpoint in `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExamOcrError> {
        let (Some(app_id), Some(app_key)) = (
            config.mathpix_app_id.as_deref().filter(|s| !s.is_empty()),
            config.mathpix_app_key.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(ExamOcrError::OcrNotConfigured {
                hint: "Set MATHPIX_APP_ID and MATHPIX_APP_KEY.".to_string(),
            });
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.ocr_request_timeout_secs))
            .build()
            .map_err(|source| ExamOcrError::OcrRequest {
                endpoint: config.ocr_base_url.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: config.ocr_base_url.trim_end_matches('/').to_string(),
            app_id: app_id.to_string(),
            app_key: app_key.to_string(),
            options: config.ocr_options.clone(),
        })
    }

    fn pdf_url(&self, suffix: &str) -> String {
        format!("{}/v3/pdf{}", self.base_url, suffix)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("app_id", &self.app_id).header("app_key", &self.app_key)
    }

    /// Send `req`, require a 2xx status and decode the JSON body.
    async fn send_json<T>(&self, endpoint: &str, req: reqwest::RequestBuilder) -> Result<T, ExamOcrError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self
            .authorized(req)
            .send()
            .await
            .map_err(|source| ExamOcrError::OcrRequest {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExamOcrError::OcrApi {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ExamOcrError::OcrRequest {
                endpoint: endpoint.to_string(),
                source,
            })
    }
}

#[async_trait]
impl OcrService for MathpixClient {
    async fn submit(&self, pdf: &PdfSource) -> Result<String, ExamOcrError> {
        let endpoint = self.pdf_url("");
        let bytes = pdf.read_bytes().await?;
        let options_json = serde_json::to_string(&self.options)
            .map_err(|e| ExamOcrError::Internal(format!("options_json: {e}")))?;

        let part = Part::bytes(bytes)
            .file_name(pdf.file_name().to_string())
            .mime_str("application/pdf")
            .map_err(|source| ExamOcrError::OcrRequest {
                endpoint: endpoint.clone(),
                source,
            })?;
        let form = Form::new().part("file", part).text("options_json", options_json);

        let reply: SubmitResponse = self
            .send_json(&endpoint, self.http.post(&endpoint).multipart(form))
            .await?;

        match reply.pdf_id {
            Some(id) if !id.is_empty() => {
                info!("PDF uploaded. ID: {}", id);
                Ok(id)
            }
            _ => Err(ExamOcrError::OcrApi {
                status: 200,
                body: reply
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "response carried no pdf_id".to_string()),
            }),
        }
    }

    async fn status(&self, job_id: &str) -> Result<OcrJobStatus, ExamOcrError> {
        let endpoint = self.pdf_url(&format!("/{job_id}"));
        self.send_json(&endpoint, self.http.get(&endpoint)).await
    }

    async fn fetch_result(&self, job_id: &str) -> Result<serde_json::Value, ExamOcrError> {
        let endpoint = self.pdf_url(&format!("/{job_id}.lines.json"));
        let payload: serde_json::Value = self.send_json(&endpoint, self.http.get(&endpoint)).await?;
        debug!("Fetched lines JSON for {}", job_id);
        Ok(payload)
    }
}
