//! LLM interaction: send the OCR payload and parse the structured reply.
//!
//! This module is intentionally thin. Prompt text lives in
//! [`crate::prompts`] and reply cleanup in
//! [`crate::pipeline::postprocess`], so this file only builds the messages,
//! enforces the timeout and records token usage.
//!
//! There is no retry loop: a failed structuring call fails the request and
//! the caller may resubmit.

use crate::config::ExtractionConfig;
use crate::error::ExamOcrError;
use crate::exam::StructuredExam;
use crate::pipeline::postprocess::parse_exam_response;
use crate::prompts::{structuring_prompt, system_message, DEFAULT_STRUCTURING_INSTRUCTIONS};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const JSON_RESPONSE_FORMAT: &str = "json_object";

/// A structured exam plus the cost of producing it.
#[derive(Debug, Clone)]
pub struct StructuringOutput {
    pub exam: StructuredExam,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Turns a raw OCR payload into a [`StructuredExam`].
#[async_trait]
pub trait ExamStructurer: Send + Sync {
    async fn structure(&self, raw: &serde_json::Value) -> Result<StructuringOutput, ExamOcrError>;
}

/// [`ExamStructurer`] backed by an `edgequake-llm` provider.
pub struct StructuringClient {
    provider: Arc<dyn LLMProvider>,
    instructions: String,
    options: CompletionOptions,
    timeout: Duration,
}

impl fmt::Debug for StructuringClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuringClient")
            .field("provider", &"<dyn LLMProvider>")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StructuringClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            instructions: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_STRUCTURING_INSTRUCTIONS.to_string()),
            options: build_options(config),
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    fn messages(&self, raw: &serde_json::Value) -> Result<Vec<ChatMessage>, ExamOcrError> {
        build_messages(&self.instructions, raw)
    }
}

#[async_trait]
impl ExamStructurer for StructuringClient {
    async fn structure(&self, raw: &serde_json::Value) -> Result<StructuringOutput, ExamOcrError> {
        let start = Instant::now();
        let messages = self.messages(raw)?;

        let response = call_with_timeout(
            self.timeout,
            self.provider.chat(&messages, Some(&self.options)),
        )
        .await?;

        let duration = start.elapsed();
        debug!(
            "Structuring: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens, response.completion_tokens, duration
        );

        let exam = parse_reply(&response.content)?;
        Ok(StructuringOutput {
            exam,
            input_tokens: response.prompt_tokens as u64,
            output_tokens: response.completion_tokens as u64,
            duration_ms: duration.as_millis() as u64,
        })
    }
}

/// Messages for one structuring call: JSON contract, then instructions with
/// the payload.
fn build_messages(
    instructions: &str,
    raw: &serde_json::Value,
) -> Result<Vec<ChatMessage>, ExamOcrError> {
    let payload = serde_json::to_string(raw)
        .map_err(|e| ExamOcrError::Internal(format!("serialise OCR payload: {e}")))?;
    Ok(vec![
        ChatMessage::system(system_message()),
        ChatMessage::user(structuring_prompt(instructions, &payload)),
    ])
}

/// Await a provider call, mapping an elapsed deadline to `LlmTimeout` and a
/// provider error to `LlmApiError`.
async fn call_with_timeout<F, T, E>(timeout: Duration, call: F) -> Result<T, ExamOcrError>
where
    F: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ExamOcrError::LlmTimeout {
            secs: timeout.as_secs(),
        })?
        .map_err(|e| ExamOcrError::LlmApiError {
            message: e.to_string(),
        })
}

fn parse_reply(content: &str) -> Result<StructuredExam, ExamOcrError> {
    if content.trim().is_empty() {
        warn!("Structuring call returned an empty reply");
        return Err(ExamOcrError::StructuringFailed {
            detail: "model returned an empty reply".to_string(),
        });
    }
    parse_exam_response(content)
}

/// Build `CompletionOptions` from the extraction config.
///
/// JSON output mode is always on; providers that support it (Gemini's
/// `responseMimeType`, OpenAI's `json_object`) then reply with bare JSON.
fn build_options(config: &ExtractionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        response_format: Some(JSON_RESPONSE_FORMAT.to_string()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&ExtractionConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(16384));
        assert_eq!(opts.response_format.as_deref(), Some("json_object"));
    }

    #[test]
    fn build_options_follow_builder() {
        let config = ExtractionConfig::builder()
            .temperature(5.0)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(2.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn ocr_payload_lands_in_user_message() {
        let raw = serde_json::json!({ "pages": [{ "lines": [{ "text": "Find $x$ if \\[x^2=4\\]" }] }] });
        let messages = build_messages("Extract every question.", &raw).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, system_message());
        let user = &messages[1].content;
        assert!(user.contains("Extract every question."));
        assert!(user.contains(&serde_json::to_string(&raw).unwrap()));
    }

    #[test]
    fn empty_reply_is_structuring_failure() {
        for reply in ["", "  \n\t "] {
            let err = parse_reply(reply).unwrap_err();
            assert!(
                matches!(err, ExamOcrError::StructuringFailed { ref detail } if detail.contains("empty")),
                "got: {err}"
            );
        }
    }

    #[test]
    fn reply_is_parsed_into_exam() {
        let exam = parse_reply(r#"{"subject":"Chemistry","questions":[{"question":"Balance $H_2 + O_2$."}]}"#)
            .unwrap();
        assert_eq!(exam.subject, "Chemistry");
        assert_eq!(exam.questions.len(), 1);
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let never = std::future::pending::<Result<String, String>>();
        let err = call_with_timeout(Duration::from_millis(10), never)
            .await
            .unwrap_err();
        assert!(matches!(err, ExamOcrError::LlmTimeout { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn provider_error_is_api_error() {
        let failing = async { Err::<String, _>("429 quota exhausted") };
        let err = call_with_timeout(Duration::from_secs(5), failing)
            .await
            .unwrap_err();
        match err {
            ExamOcrError::LlmApiError { message } => assert_eq!(message, "429 quota exhausted"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn provider_success_passes_through() {
        let ok = async { Ok::<_, String>("reply".to_string()) };
        let reply = call_with_timeout(Duration::from_secs(5), ok).await.unwrap();
        assert_eq!(reply, "reply");
    }
}
