//! Error handling

use std::path::{Path, PathBuf};

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// A feature is missing, non-numeric or out of range, or a request field is malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The persisted model artifact could not be read, parsed or written.
    #[error("model storage error at {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },

    #[error("model training failed: {0}")]
    Training(String),

    #[error("student record {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl TrackerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        TrackerError::InvalidInput(msg.into())
    }

    pub fn storage(path: &Path, reason: impl ToString) -> Self {
        TrackerError::Storage {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

impl From<csv::Error> for TrackerError {
    fn from(err: csv::Error) -> Self {
        TrackerError::InvalidInput(format!("malformed CSV: {}", err))
    }
}

impl ResponseError for TrackerError {
    fn status_code(&self) -> StatusCode {
        match self {
            TrackerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TrackerError::NotFound(_) => StatusCode::NOT_FOUND,
            TrackerError::Storage { .. } | TrackerError::Training(_) | TrackerError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            TrackerError::InvalidInput(_) | TrackerError::NotFound(_) => self.to_string(),
            TrackerError::Storage { .. } | TrackerError::Training(_) => {
                tracing::error!("Model error: {}", self);
                "Prediction model unavailable".to_string()
            }
            TrackerError::Database(err) => {
                tracing::error!("Database error: {}", err);
                "Database error occurred".to_string()
            }
        };

        HttpResponse::build(status).json(json!({
            "error": message,
            "status": status.as_u16(),
        }))
    }
}
