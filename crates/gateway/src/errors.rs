use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::{VideoError, media::MediaError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Model Loading...")]
    ModelsLoading,

    #[error("Only image or video uploads are supported, got '{0}'")]
    UnsupportedMedia(String),

    #[error("Missing multipart field 'file'")]
    MissingFile,

    #[error("Invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("{0}")]
    BadInput(String),

    #[error("Prediction failed: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ModelsLoading => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnsupportedMedia(_) | Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::MissingFile => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Multipart(e) => e.status(),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Sort pipeline failures into client errors and server errors.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(media) = err.downcast_ref::<MediaError>() {
            return match media {
                MediaError::EmptyData | MediaError::DecodeFailed(_) => {
                    Self::BadInput(media.to_string())
                }
                MediaError::EncodeFailed(_) => Self::Internal(media.to_string()),
            };
        }

        if let Some(video) = err.downcast_ref::<VideoError>() {
            return match video {
                VideoError::ProbeFailed(_) | VideoError::NoVideoStream => {
                    Self::BadInput(video.to_string())
                }
                _ => Self::Internal(video.to_string()),
            };
        }

        Self::Internal(format!("{:#}", err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Request rejected");
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
