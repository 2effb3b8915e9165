//! HTTP routes driven through `tower::ServiceExt::oneshot`, with fake OCR
//! and structuring services behind the pipeline.

#![cfg(feature = "server")]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use pdf_exam_ocr::server::{router, AppState};
use pdf_exam_ocr::{
    ExamOcrError, ExamPipeline, ExamStructurer, JobState, OcrJobStatus, OcrService, PdfSource,
    PollPolicy, Question, ServerConfig, StructuredExam, StructuringOutput,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

const TINY_PDF: &[u8] = b"%PDF-1.4\n%%EOF\n";
const BOUNDARY: &str = "exam-ocr-test-boundary";

// ── Fakes ────────────────────────────────────────────────────────────────────

struct FakeOcr {
    final_state: JobState,
    submits: AtomicUsize,
}

#[async_trait]
impl OcrService for FakeOcr {
    async fn submit(&self, pdf: &PdfSource) -> Result<String, ExamOcrError> {
        assert!(pdf.path().exists(), "upload must be staged before submit");
        self.submits.fetch_add(1, Ordering::SeqCst);
        Ok("job-1".into())
    }

    async fn status(&self, _job_id: &str) -> Result<OcrJobStatus, ExamOcrError> {
        Ok(OcrJobStatus::new(self.final_state))
    }

    async fn fetch_result(&self, _job_id: &str) -> Result<serde_json::Value, ExamOcrError> {
        Ok(serde_json::json!({ "pages": [] }))
    }
}

struct FakeStructurer {
    fail: bool,
}

#[async_trait]
impl ExamStructurer for FakeStructurer {
    async fn structure(&self, _raw: &serde_json::Value) -> Result<StructuringOutput, ExamOcrError> {
        if self.fail {
            return Err(ExamOcrError::StructuringFailed {
                detail: "model returned an empty reply".into(),
            });
        }
        Ok(StructuringOutput {
            exam: sample_exam(),
            input_tokens: 10,
            output_tokens: 5,
            duration_ms: 1,
        })
    }
}

fn sample_exam() -> StructuredExam {
    StructuredExam {
        subject: "Mathematics".into(),
        topic: "Algebra".into(),
        sub_topic: "Quadratics".into(),
        questions: vec![Question {
            question: "Solve $x^2 = 4$.".into(),
            options: vec!["$2$".into(), "$-2$".into(), "$\\pm 2$".into()],
            image: None,
            hint: Some("Take square roots.".into()),
        }],
    }
}

struct Harness {
    app: Router,
    ocr: Arc<FakeOcr>,
    _shutdown: watch::Sender<bool>,
}

fn harness(final_state: JobState, structurer_fails: bool) -> Harness {
    let ocr = Arc::new(FakeOcr {
        final_state,
        submits: AtomicUsize::new(0),
    });
    let policy = PollPolicy {
        interval: Duration::from_millis(1),
        max_attempts: 2,
    };
    let pipeline = ExamPipeline::new(
        ocr.clone(),
        Arc::new(FakeStructurer {
            fail: structurer_fails,
        }),
        policy,
    );
    let (tx, rx) = watch::channel(false);
    let app = router(AppState::new(Arc::new(pipeline), rx), &ServerConfig::default()).unwrap();
    Harness {
        app,
        ocr,
        _shutdown: tx,
    }
}

fn multipart_request(uri: &str, field: &str, file_name: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, json: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = tokio_test::assert_ok!(app.clone().oneshot(req).await);
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_index() {
    let h = harness(JobState::Completed, false);

    let (status, body) = send(&h.app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = send(&h.app, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("name=\"pdf\""));
}

#[tokio::test]
async fn upload_returns_structured_exam() {
    let h = harness(JobState::Completed, false);
    let (status, body) = send(&h.app, multipart_request("/upload", "pdf", "exam.pdf", TINY_PDF)).await;

    assert_eq!(status, StatusCode::OK);
    let exam: StructuredExam = serde_json::from_str(&body).unwrap();
    assert_eq!(exam, sample_exam());
    let raw: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(raw["subTopic"], "Quadratics");
    assert_eq!(h.ocr.submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_without_pdf_field_is_rejected() {
    let h = harness(JobState::Completed, false);
    let (status, body) = send(&h.app, multipart_request("/upload", "document", "exam.pdf", TINY_PDF)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "No file uploaded");
    assert_eq!(h.ocr.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_of_non_pdf_never_reaches_ocr() {
    let h = harness(JobState::Completed, false);
    let (status, body) = send(&h.app, multipart_request("/upload", "pdf", "notes.txt", b"just text")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid upload");
    assert_eq!(h.ocr.submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ocr_timeout_is_gateway_timeout_with_generic_body() {
    let h = harness(JobState::Split, false);
    let (status, body) = send(&h.app, multipart_request("/upload", "pdf", "exam.pdf", TINY_PDF)).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body, "Error processing PDF");
}

#[tokio::test]
async fn structuring_failure_is_server_error() {
    let h = harness(JobState::Completed, true);
    let (status, body) = send(&h.app, multipart_request("/upload", "pdf", "exam.pdf", TINY_PDF)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error processing PDF");
}

#[tokio::test]
async fn view_renders_html() {
    let h = harness(JobState::Completed, false);
    let (status, body) = send(&h.app, multipart_request("/view", "pdf", "exam.pdf", TINY_PDF)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<strong>Q1:</strong>"));
    assert!(body.contains("<span class=\"math math-inline\">x^2 = 4</span>"));
    assert!(body.contains("Hint: Take square roots."));
}

#[tokio::test]
async fn test_route_reports_structuring_outcome() {
    let ok = harness(JobState::Completed, false);
    let (status, body) = send(&ok.app, Request::get("/test").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"subject\":\"Mathematics\""));

    let failing = harness(JobState::Completed, true);
    let (status, body) = send(&failing.app, Request::get("/test").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, serde_json::json!({ "error": "Failed to structure data" }));
}

#[tokio::test]
async fn segment_route_returns_tagged_segments() {
    let h = harness(JobState::Completed, false);
    let (status, body) = send(
        &h.app,
        json_request("/segment", serde_json::json!({ "text": "Let $x$ be \\[x=1\\]" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            { "type": "plain", "content": "Let" },
            { "type": "inline", "content": "x" },
            { "type": "plain", "content": "be" },
            { "type": "block", "content": "x=1" }
        ])
    );

    let (_, body) = send(&h.app, json_request("/segment", serde_json::json!({}))).await;
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn render_route_accepts_exam_json() {
    let h = harness(JobState::Completed, false);
    let exam = serde_json::to_value(sample_exam()).unwrap();
    let (status, body) = send(&h.app, json_request("/render", exam)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("<!DOCTYPE html>"));
    assert!(body.contains("<ol type=\"1\">"));
}

#[tokio::test]
async fn cors_preflight_allows_configured_origin() {
    let h = harness(JobState::Completed, false);
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/upload")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .body(Body::empty())
        .unwrap();
    let resp = h.app.clone().oneshot(req).await.unwrap();

    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
}

#[tokio::test]
async fn shutdown_cancels_pending_ocr_wait() {
    let ocr = Arc::new(FakeOcr {
        final_state: JobState::Split,
        submits: AtomicUsize::new(0),
    });
    let pipeline = ExamPipeline::new(
        ocr,
        Arc::new(FakeStructurer { fail: false }),
        PollPolicy {
            interval: Duration::from_secs(3600),
            max_attempts: 3,
        },
    );
    let (tx, rx) = watch::channel(false);
    let app = router(AppState::new(Arc::new(pipeline), rx), &ServerConfig::default()).unwrap();

    let pending = tokio::spawn(async move {
        send(&app, multipart_request("/upload", "pdf", "exam.pdf", TINY_PDF)).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    tx.send(true).unwrap();

    let (status, body) = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("cancel should end the request promptly")
        .unwrap();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, "Error processing PDF");
}
