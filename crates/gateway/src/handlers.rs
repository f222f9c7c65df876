use crate::errors::ApiError;
use crate::state::{AppState, SharedService};
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
};
use inference::{PredictionReport, PredictionService};
use serde::Serialize;
use std::io::Write;

const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let content_type = content_type.trim().to_ascii_lowercase();
        if content_type.starts_with("image/") {
            Some(Self::Image)
        } else if content_type.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub models_loaded: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        models_loaded: state.models_loaded().await,
    })
}

/// `POST /predict`: multipart upload of one image or video in field `file`.
pub async fn predict(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictionReport>, ApiError> {
    let service = state.service().await.ok_or(ApiError::ModelsLoading)?;

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        tracing::info!(
            content_type = %content_type,
            file_name = field.file_name().unwrap_or_default(),
            "Prediction request"
        );

        let report = match MediaKind::from_content_type(&content_type) {
            Some(MediaKind::Image) => {
                let bytes = field.bytes().await?;
                run_blocking(service, move |s| {
                    s.process_image(&bytes).map(PredictionReport::Image)
                })
                .await?
            }
            Some(MediaKind::Video) => {
                let upload = save_upload(&mut field).await?;
                run_blocking(service, move |s| {
                    s.process_video(upload.path()).map(PredictionReport::Video)
                })
                .await?
            }
            None => return Err(ApiError::UnsupportedMedia(content_type)),
        };

        return Ok(Json(report));
    }

    Err(ApiError::MissingFile)
}

/// Stream a multipart field to a temp `.mp4`, removed when the handle drops.
async fn save_upload(field: &mut Field<'_>) -> Result<tempfile::NamedTempFile, ApiError> {
    let mut upload = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| ApiError::Internal(format!("Failed to create temp file: {}", e)))?;

    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await? {
        upload
            .write_all(&chunk)
            .map_err(|e| ApiError::Internal(format!("Failed to buffer upload: {}", e)))?;
        written += chunk.len();
    }
    upload
        .flush()
        .map_err(|e| ApiError::Internal(format!("Failed to buffer upload: {}", e)))?;

    if written == 0 {
        return Err(ApiError::BadInput("Uploaded video is empty".into()));
    }

    tracing::debug!(bytes = written, path = %upload.path().display(), "Video upload buffered");
    Ok(upload)
}

/// Run a prediction on the blocking pool while holding the service lock.
async fn run_blocking<F>(service: SharedService, job: F) -> Result<PredictionReport, ApiError>
where
    F: FnOnce(&mut PredictionService) -> anyhow::Result<PredictionReport> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = service.blocking_lock();
        job(&mut *guard)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Prediction task failed: {}", e)))?
    .map_err(ApiError::from)
}
