use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),

    /// Missing, malformed or expired credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but the resource belongs to someone else.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// A mutation referenced an id that does not exist. Reported as 400.
    #[error("{0}")]
    UnknownId(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::UnknownId(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Database(DbError::UniqueViolation { .. }) => StatusCode::CONFLICT,
            AppError::Database(DbError::Other(_)) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand back to the caller.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::UnknownId(m)
            | AppError::Conflict(m)
            | AppError::PayloadTooLarge(m) => m.clone(),
            AppError::Database(DbError::UniqueViolation { .. }) => "Data sudah ada".to_string(),
            AppError::Database(DbError::Other(_)) | AppError::Internal(_) => {
                "System error".to_string()
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return AppError::PayloadTooLarge("Ukuran file melebihi batas maksimum".into());
        }
        AppError::Validation(format!("Multipart tidak valid: {}", err.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(DbError::Other(_)) | AppError::Internal(_) => {
                tracing::error!(error = ?self, "system error");
            }
            AppError::Unauthorized(_) | AppError::Forbidden(_) => {
                tracing::info!(error = %self, "access denied");
            }
            _ => {
                tracing::debug!(error = %self, "client error");
            }
        }

        let status = self.status_code();
        let body = json!({
            "status": status.as_u16(),
            "message": self.user_message(),
            "data": null,
        });
        (status, Json(body)).into_response()
    }
}
