//! Output types: the structured exam and per-run statistics.
//!
//! [`StructuredExam`] is the JSON shape the structuring model is asked to
//! produce and the `/upload` endpoint returns. Field names follow that wire
//! format (`subTopic`), so the struct round-trips through `serde_json`
//! without a mapping layer.

use serde::{Deserialize, Deserializer, Serialize};

/// A structured exam paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredExam {
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub topic: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sub_topic: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub questions: Vec<Question>,
}

impl StructuredExam {
    /// True when the model found no questions at all.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// One question with its options and optional diagram and hint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default, deserialize_with = "null_as_default")]
    pub question: String,
    #[serde(default, deserialize_with = "options_skipping_nulls")]
    pub options: Vec<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Models write `null` for a header or option list they could not find.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `null` list → empty; `null` entries are dropped.
fn options_skipping_nulls<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let options = Option::<Vec<Option<String>>>::deserialize(deserializer)?;
    Ok(options.unwrap_or_default().into_iter().flatten().collect())
}

/// Statistics for one extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Page count reported by the OCR service (0 if never reported).
    pub pages: u32,
    /// Number of status polls until the job completed.
    pub poll_attempts: u32,
    /// Size of the raw OCR payload in bytes.
    pub ocr_payload_bytes: usize,
    pub questions: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Upload + polling + result fetch.
    pub ocr_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a full extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub exam: StructuredExam,
    /// OCR job identifier, useful for re-fetching the raw result.
    pub job_id: String,
    pub stats: ExtractionStats,
}
