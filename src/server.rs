use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;

use crate::{
    engine::{AnalysisEngine, AnalysisOutcome, InferenceResult, Submission},
    error::AnalyzerBusy,
    model::VisionModel,
    normalizer::UploadedImage,
    render::{Notice, NoticeLevel, PageView, Preview, render_page},
};

/// Largest request body accepted by the upload routes.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const IMAGE_FIELD: &str = "image";
const QUESTION_FIELD: &str = "question";

/// Body of every `/api/analyze` reply.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApiResponse {
    Success { response: String },
    Blocked { reason: String, message: String },
    Error { kind: String, message: String },
    Warning { message: String },
}

impl ApiResponse {
    fn error(kind: &str, message: impl Into<String>) -> Self {
        ApiResponse::Error {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    fn from_outcome(outcome: &AnalysisOutcome) -> (StatusCode, Self) {
        match outcome {
            AnalysisOutcome::Warning(warning) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::Warning {
                    message: warning.to_string(),
                },
            ),
            AnalysisOutcome::DecodeFailed(_) => (
                StatusCode::BAD_REQUEST,
                ApiResponse::error("decode", Notice::from(outcome).message),
            ),
            AnalysisOutcome::Completed(InferenceResult::Success(text)) => (
                StatusCode::OK,
                ApiResponse::Success {
                    response: text.clone(),
                },
            ),
            AnalysisOutcome::Completed(result @ InferenceResult::Blocked(reason)) => (
                StatusCode::OK,
                ApiResponse::Blocked {
                    reason: reason.clone(),
                    message: result.to_string(),
                },
            ),
            AnalysisOutcome::Completed(result @ InferenceResult::Failed { kind, .. }) => (
                StatusCode::BAD_GATEWAY,
                ApiResponse::error(kind.as_str(), result.to_string()),
            ),
        }
    }
}

/// Builds the application router around a shared engine.
pub fn router<M>(engine: Arc<AnalysisEngine<M>>, max_upload_bytes: usize) -> Router
where
    M: VisionModel + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze_page::<M>))
        .route("/api/analyze", post(analyze_api::<M>))
        .route("/status", get(status::<M>))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(engine)
}

async fn index() -> Html<String> {
    Html(render_page(&PageView::empty()))
}

async fn status<M>(State(engine): State<Arc<AnalysisEngine<M>>>) -> impl IntoResponse
where
    M: VisionModel + Send + Sync + 'static,
{
    Json(json!({ "status": engine.state().as_str() }))
}

async fn analyze_page<M>(
    State(engine): State<Arc<AnalysisEngine<M>>>,
    multipart: Multipart,
) -> Response
where
    M: VisionModel + Send + Sync + 'static,
{
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(e) => {
            log::warn!("Could not read the submitted form: {e}");
            let view = error_view(format!("Could not read the submitted form: {e}"));
            return (e.status(), Html(render_page(&view))).into_response();
        }
    };

    let rendered = engine
        .handle(submission, |submission, outcome| {
            render_page(&PageView::for_outcome(submission, outcome))
        })
        .await;

    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(AnalyzerBusy) => {
            let view = PageView {
                notice: Some(Notice::busy()),
                ..PageView::empty()
            };
            (StatusCode::CONFLICT, Html(render_page(&view))).into_response()
        }
    }
}

async fn analyze_api<M>(
    State(engine): State<Arc<AnalysisEngine<M>>>,
    multipart: Multipart,
) -> Response
where
    M: VisionModel + Send + Sync + 'static,
{
    let submission = match read_submission(multipart).await {
        Ok(submission) => submission,
        Err(e) => {
            log::warn!("Could not read the submitted form: {e}");
            return (e.status(), Json(ApiResponse::error("bad_request", e.body_text())))
                .into_response();
        }
    };

    match engine
        .handle(submission, |_, outcome| ApiResponse::from_outcome(outcome))
        .await
    {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(busy) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("busy", busy.to_string())),
        )
            .into_response(),
    }
}

fn error_view(message: String) -> PageView<'static> {
    PageView {
        question: "",
        notice: Some(Notice {
            level: NoticeLevel::Error,
            message,
        }),
        preview: Preview::Empty,
    }
}

/// Collects the `image` and `question` fields. A file field with no name and
/// no content is what browsers send when nothing was chosen, and counts as
/// no image.
async fn read_submission(mut multipart: Multipart) -> Result<Submission, MultipartError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(IMAGE_FIELD) => {
                let file_name = field.file_name().filter(|n| !n.is_empty()).map(str::to_string);
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;

                if bytes.is_empty() && file_name.is_none() {
                    continue;
                }
                let mut upload = UploadedImage::new(bytes.to_vec(), mime_type);
                if let Some(file_name) = file_name {
                    upload = upload.with_file_name(file_name);
                }
                submission.image = Some(upload);
            }
            Some(QUESTION_FIELD) => submission.question = field.text().await?,
            other => log::debug!("Ignoring form field {other:?}"),
        }
    }

    Ok(submission)
}
