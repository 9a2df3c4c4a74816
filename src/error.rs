//! Error taxonomy of the certificate pipeline.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::db::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{0}")]
    Conflict(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    /// A collaborator (renderer, mail relay) could not do its part right now.
    #[error("{0}")]
    Unavailable(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        AppError::NotFound { entity }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        AppError::Conflict(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyIssued => {
                AppError::Conflict("Certificate already issued for this student and course".into())
            }
            other => AppError::Persistence(other.to_string()),
        }
    }
}

/// Malformed or mistyped request bodies answer in the same envelope as every other error.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Persistence(detail) => {
                tracing::error!(error = %detail, "Request failed on persistence");
                "Internal server error".to_string()
            }
            AppError::Unavailable(detail) => {
                tracing::warn!(error = %detail, "Request failed on an unavailable collaborator");
                detail.clone()
            }
            other => other.to_string(),
        };
        (
            status,
            Json(serde_json::json!({
                "success": false,
                "message": message
            })),
        )
            .into_response()
    }
}
