//! Prompts for turning raw OCR output into a [`crate::StructuredExam`].
//!
//! Every prompt lives here so the structuring client stays free of prompt
//! text and tests can inspect the prompts without a live model.
//!
//! Callers can replace [`DEFAULT_STRUCTURING_INSTRUCTIONS`] through
//! [`crate::config::ExtractionConfig::system_prompt`]; the JSON contract in
//! [`JSON_CONTRACT_PROMPT`] is always sent, because the parser depends on it.

/// Default instructions for reformatting an OCR'd exam paper.
pub const DEFAULT_STRUCTURING_INSTRUCTIONS: &str = r#"You format educational content, including physics and mathematics, for display. The input is the OCR output of an exam paper as JSON: pages, lines, text blocks and diagrams. The text is noisy and mixes raw prose, LaTeX math and question/answer markers.

Follow these rules:

1. CONTENT
   - Produce clean, human-readable text for every question
   - Keep reading order as printed on the paper

2. MATH
   - Keep every equation exactly as given, in LaTeX
   - Inline math uses $...$; display math uses \[...\]

3. MULTIPLE CHOICE
   - Put each option in its own entry of "options", in printed order
   - Drop the option labels such as (1), (A), a)

4. HEADERS
   - Fill subject, topic and subTopic from the paper's headers when present, else ""

5. DIAGRAMS
   - If a question has a diagram, put only its URL in "image"
   - Write the bare URL with its query parameters, for example
     https://cdn.mathpix.com/cropped/2025_09_21_9b49-1.jpg?height=320&width=347
     and never Markdown like ![](...)
   - Use null when there is no diagram

6. CLEANUP
   - Remove stray markers like \####, \#* and \# and escape characters unless
     they are part of LaTeX
   - Keep tabular data readable inside the question text

7. HINTS
   - Put any hint, solution sketch or answer key entry in "hint", else null"#;

/// Shape of the expected reply, embedded in the system message.
pub const EXAM_JSON_SHAPE: &str = r#"{
  "subject": "string",
  "topic": "string",
  "subTopic": "string",
  "questions": [
    {
      "question": "string",
      "options": ["string"],
      "image": "string or null",
      "hint": "string or null"
    }
  ]
}"#;

/// System message pinning the reply to a single JSON object.
pub const JSON_CONTRACT_PROMPT: &str = r#"Respond with exactly one JSON object and nothing else: no Markdown fences, no commentary. The object must have this shape, with keys in this order:"#;

/// Build the system message: the JSON contract followed by the shape.
pub fn system_message() -> String {
    format!("{JSON_CONTRACT_PROMPT}\n\n{EXAM_JSON_SHAPE}")
}

/// Build the user message: instructions followed by the serialised OCR payload.
pub fn structuring_prompt(instructions: &str, payload_json: &str) -> String {
    format!("{instructions}\n\nInput JSON:\n{payload_json}\n")
}
