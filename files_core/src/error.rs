//! File factory error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::files::models::FileType;

pub type Result<T> = std::result::Result<T, FileError>;

#[derive(Error, Debug)]
pub enum FileError {
    #[error("Invalid file reference: {0}")]
    InvalidReference(String),

    #[error("File record not found: {0}")]
    RecordNotFound(String),

    #[error("Detected file type {detected} does not match the specified type {declared}. Please verify the file.")]
    TypeMismatch { declared: FileType, detected: FileType },

    #[error("Invalid file transfer method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid file type: {0}")]
    InvalidCategory(String),

    #[error("File validation failed for file: {filename}")]
    PolicyViolation { filename: String },

    #[error("Number of files exceeds the maximum limit {limit}")]
    TooManyFiles { limit: usize },

    #[error("Number of image files exceeds the maximum limit {limit}")]
    TooManyImages { limit: usize },

    #[error("Invalid file, expected tenant_id={expected}, got tenant_id={actual}, file_id={file_id:?}")]
    TenantMismatch {
        expected: String,
        actual: String,
        file_id: Option<String>,
    },

    #[error("File {0:?} has no related record id")]
    MissingReference(Option<String>),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FileError {
    /// Errors caused by the caller's input, safe to show to an end user.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            FileError::InvalidReference(_)
                | FileError::RecordNotFound(_)
                | FileError::TypeMismatch { .. }
                | FileError::UnsupportedMethod(_)
                | FileError::InvalidCategory(_)
                | FileError::PolicyViolation { .. }
                | FileError::TooManyFiles { .. }
                | FileError::TooManyImages { .. }
                | FileError::MissingReference(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            FileError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            FileError::TenantMismatch { .. } => StatusCode::FORBIDDEN,
            FileError::Database(_) | FileError::Config(_) | FileError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for FileError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = match &self {
            FileError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                "Database error".to_string()
            }
            FileError::Config(msg) => {
                tracing::error!("Configuration error: {}", msg);
                "Internal server error".to_string()
            }
            FileError::Other(err) => {
                tracing::error!("Unexpected error: {:?}", err);
                "Internal server error".to_string()
            }
            FileError::TenantMismatch { .. } => {
                tracing::warn!("{}", self);
                "File does not belong to this workspace".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for FileError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => FileError::RecordNotFound("Resource not found".to_string()),
            _ => FileError::Database(err.to_string()),
        }
    }
}

impl From<config::ConfigError> for FileError {
    fn from(err: config::ConfigError) -> Self {
        FileError::Config(err.to_string())
    }
}
