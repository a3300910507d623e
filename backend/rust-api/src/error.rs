use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::services::code_execution::ExecutionError;
use crate::store::StoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    /// Carries the resource name, e.g. "Adventure".
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Authorisation(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Authorisation(message.into())
    }

    /// Write conflicts on an adventure row are retried by the services.
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Store(StoreError::Conflict))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Authorisation(_) => StatusCode::FORBIDDEN,
            AppError::Execution(ExecutionError::UnsupportedLanguage(_)) => StatusCode::BAD_REQUEST,
            AppError::Execution(_) | AppError::Store(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Validation(detail) => json!({
                "error": "Validation failed",
                "detail": detail,
            }),
            AppError::NotFound(_) => json!({ "error": self.to_string() }),
            AppError::Authorisation(detail) => json!({
                "error": "Forbidden",
                "detail": detail,
            }),
            AppError::Execution(ExecutionError::UnsupportedLanguage(_)) => json!({
                "error": "Validation failed",
                "detail": self.to_string(),
            }),
            AppError::Execution(e) => {
                tracing::error!("Code execution failed: {}", e);
                json!({
                    "error": "Code execution failed",
                    "detail": e.public_reason(),
                })
            }
            AppError::Store(e) => {
                tracing::error!("Store failure: {:?}", e);
                json!({ "error": "Internal server error" })
            }
            AppError::Internal(e) => {
                tracing::error!("Unexpected error: {:#}", e);
                json!({ "error": "Internal server error" })
            }
        };

        (status, Json(body)).into_response()
    }
}
