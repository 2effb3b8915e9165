//! HTTP surface: upload, view, structuring test and helper routes.
//!
//! | Route | Input | Output |
//! |-------|-------|--------|
//! | `GET /` | | upload form (HTML) |
//! | `POST /upload` | multipart field `pdf` | [`StructuredExam`] JSON |
//! | `POST /view` | multipart field `pdf` | rendered exam (HTML) |
//! | `GET /test` | | structuring of `{}` (JSON) |
//! | `POST /segment` | `{"text": "..."}` | segment list (JSON) |
//! | `POST /render` | [`StructuredExam`] JSON | rendered exam (HTML) |
//! | `GET /health` | | `ok` |
//!
//! Failures carry a generic body; the detailed error only goes to the log.

use crate::config::ServerConfig;
use crate::error::ExamOcrError;
use crate::exam::{ExtractionOutput, StructuredExam};
use crate::extract::ExamPipeline;
use crate::pipeline::upload::PdfSource;
use crate::render::{render_page, upload_page};
use crate::segment::{segment, Segment};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Multipart field carrying the PDF.
pub const UPLOAD_FIELD: &str = "pdf";

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ExamPipeline>,
    /// Turns `true` on shutdown; pending OCR waits observe it.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(pipeline: Arc<ExamPipeline>, shutdown: watch::Receiver<bool>) -> Self {
        Self { pipeline, shutdown }
    }
}

/// Build the application router.
///
/// Fails only when `config.cors_origin` is not a valid header value.
pub fn router(state: AppState, config: &ServerConfig) -> Result<Router, ExamOcrError> {
    let mut app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/upload", post(upload))
        .route("/view", post(view))
        .route("/test", get(test_structuring))
        .route("/segment", post(segment_text))
        .route("/render", post(render_exam))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if let Some(ref origin) = config.cors_origin {
        let origin = HeaderValue::from_str(origin).map_err(|e| {
            ExamOcrError::InvalidConfig(format!("invalid CORS origin '{origin}': {e}"))
        })?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        );
    }
    Ok(app)
}

/// Serve until Ctrl-C.
pub async fn serve(pipeline: Arc<ExamPipeline>, config: &ServerConfig) -> Result<(), ExamOcrError> {
    serve_with_shutdown(pipeline, config, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Serve until `signal` resolves.
///
/// On shutdown the listener stops accepting, pending OCR waits are
/// cancelled, and in-flight requests are allowed to finish.
pub async fn serve_with_shutdown<F>(
    pipeline: Arc<ExamPipeline>,
    config: &ServerConfig,
    signal: F,
) -> Result<(), ExamOcrError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = router(AppState::new(pipeline, shutdown_rx), config)?;

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ExamOcrError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutting down; cancelling pending OCR jobs");
            let _ = shutdown_tx.send(true);
        })
        .await
        .map_err(|e| ExamOcrError::Internal(format!("server error: {e}")))
}

// ── Error responses ──────────────────────────────────────────────────────

/// Maps an [`ExamOcrError`] to a status line and a generic body.
#[derive(Debug)]
pub struct ApiError(pub ExamOcrError);

impl From<ExamOcrError> for ApiError {
    fn from(e: ExamOcrError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn body(&self) -> &'static str {
        match self.0 {
            ExamOcrError::NoFileProvided => "No file uploaded",
            ExamOcrError::InvalidUpload { .. } | ExamOcrError::NotAPdf { .. } => "Invalid upload",
            _ => "Error processing PDF",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.0.is_client_error() {
            warn!("Rejected upload: {}", self.0);
        } else {
            error!("Error processing PDF: {}", self.0);
        }
        (status, self.body()).into_response()
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index() -> Html<String> {
    Html(upload_page())
}

async fn health() -> &'static str {
    "ok"
}

/// Stage the `pdf` field and run it through the pipeline.
async fn process_upload(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<ExtractionOutput, ExamOcrError> {
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ExamOcrError::InvalidUpload {
            detail: e.to_string(),
        })?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let name = field.file_name().map(str::to_string);
        let data = field.bytes().await.map_err(|e| ExamOcrError::InvalidUpload {
            detail: e.to_string(),
        })?;
        upload = Some((name, data.to_vec()));
        break;
    }

    let (name, bytes) = upload.ok_or(ExamOcrError::NoFileProvided)?;
    let pdf = PdfSource::from_bytes(name.as_deref(), &bytes)?;
    state.pipeline.run(&pdf, Some(state.shutdown.clone())).await
}

async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<StructuredExam>, ApiError> {
    let out = process_upload(&state, multipart).await?;
    Ok(Json(out.exam))
}

async fn view(State(state): State<AppState>, multipart: Multipart) -> Result<Html<String>, ApiError> {
    let out = process_upload(&state, multipart).await?;
    Ok(Html(render_page(&out.exam)))
}

async fn test_structuring(State(state): State<AppState>) -> Response {
    match state.pipeline.structure(&serde_json::json!({})).await {
        Ok(out) => Json(out.exam).into_response(),
        Err(e) => {
            error!("Structuring test failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "Failed to structure data" })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
struct SegmentRequest {
    #[serde(default)]
    text: Option<String>,
}

async fn segment_text(Json(req): Json<SegmentRequest>) -> Json<Vec<Segment>> {
    Json(segment(req.text.as_deref()))
}

async fn render_exam(Json(exam): Json<StructuredExam>) -> Html<String> {
    Html(render_page(&exam))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn api_error_bodies_stay_generic() {
        let no_file = ApiError(ExamOcrError::NoFileProvided);
        assert_eq!(no_file.body(), "No file uploaded");

        let not_pdf = ApiError(ExamOcrError::NotAPdf {
            name: "a.txt".into(),
            magic: vec![],
        });
        assert_eq!(not_pdf.body(), "Invalid upload");

        let failed = ApiError(ExamOcrError::OcrJobFailed {
            job_id: "secret-job".into(),
            detail: "internal detail".into(),
        });
        assert_eq!(failed.body(), "Error processing PDF");
    }

    #[test]
    fn api_error_status_codes() {
        let timeout = ApiError(ExamOcrError::OcrTimeout {
            job_id: "j".into(),
            attempts: 1,
            waited: Duration::from_secs(2),
        })
        .into_response();
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);

        let bad = ApiError(ExamOcrError::NoFileProvided).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
