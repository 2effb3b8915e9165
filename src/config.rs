//! Configuration types for exam extraction and the HTTP server.
//!
//! Every knob of the OCR → structuring pipeline lives in [`ExtractionConfig`],
//! built via [`ExtractionConfigBuilder`]. The config is constructed once at
//! process start and shared by reference with every request handler; nothing
//! in the library reads API credentials from globals after that point.
//!
//! [`ServerConfig`] holds the listener and CORS settings of the `serve`
//! command.

use crate::error::ExamOcrError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default Mathpix API origin.
pub const DEFAULT_OCR_BASE_URL: &str = "https://api.mathpix.com";

/// Default structuring model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Configuration for one PDF → `StructuredExam` extraction.
///
/// # Example
/// ```rust
/// use pdf_exam_ocr::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .mathpix_credentials("my-app", "my-key")
///     .poll_interval_ms(1000)
///     .max_poll_attempts(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.poll_policy().max_attempts, 60);
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Mathpix `app_id` header value.
    pub mathpix_app_id: Option<String>,

    /// Mathpix `app_key` header value.
    pub mathpix_app_key: Option<String>,

    /// OCR API origin. Default: [`DEFAULT_OCR_BASE_URL`].
    ///
    /// Overridable so tests and self-hosted proxies can stand in for the
    /// real service.
    pub ocr_base_url: String,

    /// Conversion options forwarded as `options_json` on submit.
    pub ocr_options: OcrOptions,

    /// Fixed delay before each status poll, in milliseconds. Default: 2000.
    pub poll_interval_ms: u64,

    /// Maximum number of status polls before giving up with
    /// [`ExamOcrError::OcrTimeout`]. Default: 150 (five minutes at 2 s).
    pub max_poll_attempts: u32,

    /// Per-request timeout for OCR HTTP calls, in seconds. Default: 60.
    pub ocr_request_timeout_secs: u64,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the structuring call. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 16384.
    ///
    /// A forty-question paper with options and hints routinely needs more
    /// than 8k output tokens; truncation produces unparseable JSON.
    pub max_tokens: usize,

    /// Custom structuring instruction. If None, uses the built-in prompt.
    pub system_prompt: Option<String>,

    /// Timeout for the structuring call in seconds. Default: 180.
    pub api_timeout_secs: u64,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            mathpix_app_id: None,
            mathpix_app_key: None,
            ocr_base_url: DEFAULT_OCR_BASE_URL.to_string(),
            ocr_options: OcrOptions::default(),
            poll_interval_ms: 2000,
            max_poll_attempts: 150,
            ocr_request_timeout_secs: 60,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 16384,
            system_prompt: None,
            api_timeout_secs: 180,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("mathpix_app_id", &self.mathpix_app_id)
            .field("mathpix_app_key", &self.mathpix_app_key.as_ref().map(|_| "<redacted>"))
            .field("ocr_base_url", &self.ocr_base_url)
            .field("ocr_options", &self.ocr_options)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_poll_attempts", &self.max_poll_attempts)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Polling bounds derived from this config.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    /// Model used for structuring, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`ExtractionConfig`].
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl fmt::Debug for ExtractionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ExtractionConfigBuilder {
    pub fn mathpix_credentials(mut self, app_id: impl Into<String>, app_key: impl Into<String>) -> Self {
        self.config.mathpix_app_id = Some(app_id.into());
        self.config.mathpix_app_key = Some(app_key.into());
        self
    }

    pub fn ocr_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn ocr_options(mut self, options: OcrOptions) -> Self {
        self.config.ocr_options = options;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn max_poll_attempts(mut self, n: u32) -> Self {
        self.config.max_poll_attempts = n.max(1);
        self
    }

    pub fn ocr_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_request_timeout_secs = secs.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExamOcrError> {
        let c = &self.config;
        if !c.ocr_base_url.starts_with("http://") && !c.ocr_base_url.starts_with("https://") {
            return Err(ExamOcrError::InvalidConfig(format!(
                "OCR base URL must be http(s), got '{}'",
                c.ocr_base_url
            )));
        }
        if c.max_tokens == 0 {
            return Err(ExamOcrError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ExamOcrError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Bounds for the OCR status-polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before every status request.
    pub interval: Duration,
    /// Number of status requests after which the wait fails.
    pub max_attempts: u32,
}

impl PollPolicy {
    /// Upper bound on the time spent sleeping between polls.
    pub fn max_wait(&self) -> Duration {
        self.interval.saturating_mul(self.max_attempts)
    }
}

/// Mathpix conversion options, serialised verbatim as `options_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOptions {
    pub conversion_formats: ConversionFormats,
    /// Opening and closing delimiter for inline math in the OCR output.
    ///
    /// The segmenter recognises `$`; changing this breaks inline rendering.
    pub math_inline_delimiters: [String; 2],
    pub rm_spaces: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            conversion_formats: ConversionFormats { docx: true },
            math_inline_delimiters: ["$".to_string(), "$".to_string()],
            rm_spaces: true,
        }
    }
}

/// Extra output formats requested from the OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionFormats {
    pub docx: bool,
}

/// Listener, CORS and upload limits for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind. Default: "0.0.0.0".
    pub host: String,
    /// TCP port. Default: 3000.
    pub port: u16,
    /// Single allowed CORS origin; `None` disables the CORS layer.
    pub cors_origin: Option<String>,
    /// Request body limit for uploads. Default: 50 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origin: Some("http://localhost:5173".to_string()),
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// `host:port` string suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.poll_interval_ms, 2000);
        assert_eq!(c.max_poll_attempts, 150);
        assert_eq!(c.model_or_default(), "gemini-2.5-flash");
        assert_eq!(c.ocr_base_url, "https://api.mathpix.com");
    }

    #[test]
    fn poll_policy_max_wait() {
        let c = ExtractionConfig::builder()
            .poll_interval_ms(500)
            .max_poll_attempts(4)
            .build()
            .unwrap();
        assert_eq!(c.poll_policy().max_wait(), Duration::from_secs(2));
    }

    #[test]
    fn max_poll_attempts_is_at_least_one() {
        let c = ExtractionConfig::builder().max_poll_attempts(0).build().unwrap();
        assert_eq!(c.max_poll_attempts, 1);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let c = ExtractionConfig::builder()
            .ocr_base_url("http://127.0.0.1:9000/")
            .build()
            .unwrap();
        assert_eq!(c.ocr_base_url, "http://127.0.0.1:9000");
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let err = ExtractionConfig::builder()
            .ocr_base_url("ftp://mathpix")
            .build()
            .unwrap_err();
        assert!(matches!(err, ExamOcrError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_app_key() {
        let c = ExtractionConfig::builder()
            .mathpix_credentials("id", "super-secret")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn ocr_options_serialise_like_the_api_expects() {
        let json = serde_json::to_value(OcrOptions::default()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "conversion_formats": { "docx": true },
                "math_inline_delimiters": ["$", "$"],
                "rm_spaces": true
            })
        );
    }

    #[test]
    fn server_bind_addr() {
        let s = ServerConfig {
            port: 8080,
            ..ServerConfig::default()
        };
        assert_eq!(s.bind_addr(), "0.0.0.0:8080");
    }
}
