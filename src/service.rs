use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::classifier::{DiseaseClassifier, decode_image};
use crate::diagnosis::{ClassScore, Diagnosis, Status};
use crate::error::DiagnosisError;
use crate::helpers::{data_uri, png_data_uri, sniff_mime};
use crate::mapping::ClassLabels;
use crate::page::{self, ResultView, UNCERTAIN_HINT};
use crate::treatments::TreatmentBook;

/// Multipart field carrying the leaf photo.
pub const IMAGE_FIELD: &str = "image";

pub struct AppState {
    classifier: Arc<Mutex<DiseaseClassifier>>,
    labels: ClassLabels,
    treatments: TreatmentBook,
    model_name: String,
    max_upload_bytes: usize,
    started_at: Instant,
}

impl AppState {
    pub fn new(
        classifier: DiseaseClassifier,
        treatments: TreatmentBook,
        model_name: impl Into<String>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            labels: classifier.labels().clone(),
            classifier: Arc::new(Mutex::new(classifier)),
            treatments,
            model_name: model_name.into(),
            max_upload_bytes,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(index))
        .route("/detect", post(detect_page))
        .route("/api/v1/predict", post(predict))
        .route("/api/v1/labels", get(list_labels))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Keeps the status an extractor chose, with our error body.
    fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(message),
            StatusCode::UNSUPPORTED_MEDIA_TYPE => AppError::UnsupportedMediaType(message),
            s if s.is_server_error() => AppError::Internal(message),
            _ => AppError::BadRequest(message),
        }
    }

    /// Message safe to show to the client; internal details are only logged.
    fn public_message(&self) -> String {
        match self {
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<DiagnosisError> for AppError {
    fn from(err: DiagnosisError) -> Self {
        match err {
            DiagnosisError::Decode(_) | DiagnosisError::EmptyImage => AppError::BadRequest(err.to_string()),
            DiagnosisError::UnsupportedFormat(_) => AppError::UnsupportedMediaType(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::from_status(err.status(), err.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::from_status(rejection.status(), rejection.body_text())
    }
}

impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        AppError::from_status(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.public_message(),
            "status": status.as_u16()
        }));
        (status, body).into_response()
    }
}

/// Same failures as [`AppError`], rendered as a page for the browser form.
#[derive(Debug)]
pub struct HtmlError(pub AppError);

impl From<AppError> for HtmlError {
    fn from(err: AppError) -> Self {
        HtmlError(err)
    }
}

impl From<DiagnosisError> for HtmlError {
    fn from(err: DiagnosisError) -> Self {
        HtmlError(err.into())
    }
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        (status, Html(page::render_error(status.as_u16(), &self.0.public_message()))).into_response()
    }
}

/// Decodes and classifies off the async executor; inference runs one at a time.
async fn run_diagnosis(state: &SharedState, bytes: Bytes) -> Result<Diagnosis, AppError> {
    let classifier = state.classifier.clone();
    tokio::task::spawn_blocking(move || {
        let image = decode_image(&bytes)?;
        let mut classifier = classifier.blocking_lock();
        classifier.diagnose(&image)
    })
    .await
    .map_err(|e| AppError::Internal(format!("inference task failed: {}", e)))?
    .map_err(AppError::from)
}

async fn read_image_field(multipart: &mut Multipart) -> Result<Bytes, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await?;
        if !bytes.is_empty() {
            return Ok(bytes);
        }
    }
    Err(AppError::BadRequest("No image uploaded".to_string()))
}

/// GET / - upload or capture page
pub async fn index() -> Html<String> {
    Html(page::render_index())
}

/// POST /detect - classify the submitted photo and render the result page
pub async fn detect_page(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, HtmlError> {
    let mut multipart = multipart.map_err(AppError::from)?;
    let bytes = read_image_field(&mut multipart).await?;
    let diagnosis = run_diagnosis(&state, bytes.clone()).await?;

    let image_uri = data_uri(sniff_mime(&bytes), &bytes);
    let gradcam_uri = diagnosis.gradcam.as_ref().map(png_data_uri).transpose()?;
    let tips = diagnosis
        .prediction
        .as_deref()
        .map(|label| state.treatments.tips(label))
        .unwrap_or(&[]);

    Ok(Html(page::render_result(&ResultView {
        image_uri: &image_uri,
        diagnosis: &diagnosis,
        gradcam_uri: gradcam_uri.as_deref(),
        tips,
    })))
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_index: Option<usize>,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scores: Vec<ClassScore>,
    /// PNG overlay as a `data:` URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gradcam: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub treatments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub analyzed_at: DateTime<Utc>,
}

/// POST /api/v1/predict - raw JPEG/PNG body in, JSON diagnosis out
pub async fn predict(
    State(state): State<SharedState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<PredictResponse>, AppError> {
    let body = body?;
    if body.is_empty() {
        return Err(AppError::BadRequest("Request body is empty".to_string()));
    }
    let diagnosis = run_diagnosis(&state, body).await?;

    let gradcam = diagnosis.gradcam.as_ref().map(png_data_uri).transpose()?;
    let treatments = diagnosis
        .prediction
        .as_deref()
        .map(|label| state.treatments.tips(label).to_vec())
        .unwrap_or_default();
    let message = (!diagnosis.is_confident()).then(|| UNCERTAIN_HINT.to_string());

    Ok(Json(PredictResponse {
        status: diagnosis.status,
        prediction: diagnosis.prediction,
        class_index: diagnosis.class_index,
        confidence: diagnosis.confidence,
        scores: diagnosis.scores,
        gradcam,
        treatments,
        message,
        analyzed_at: Utc::now(),
    }))
}

#[derive(Debug, Serialize)]
pub struct LabelInfo {
    pub index: usize,
    pub label: String,
    pub treatments: Vec<String>,
}

/// GET /api/v1/labels - label set in model output order
pub async fn list_labels(State(state): State<SharedState>) -> Json<Vec<LabelInfo>> {
    Json(
        state
            .labels
            .iter()
            .enumerate()
            .map(|(index, label)| LabelInfo {
                index,
                label: label.to_string(),
                treatments: state.treatments.tips(label).to_vec(),
            })
            .collect(),
    )
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: String,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        model: state.model_name.clone(),
    })
}
