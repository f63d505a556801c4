use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::notification::NotifyError;
use crate::schedule::ScheduleStoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Validation(msg) => AppError::Validation(msg),
            NotifyError::EntityNotFound(id) => AppError::NotFound(format!("entity {}", id)),
            NotifyError::SendInProgress { .. } => AppError::Conflict(err.to_string()),
            NotifyError::Ledger(e) => AppError::Storage(e.to_string()),
            NotifyError::Directory(e) => AppError::Storage(e.to_string()),
            NotifyError::Guard(e) => AppError::Storage(e.to_string()),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<ScheduleStoreError> for AppError {
    fn from(err: ScheduleStoreError) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "SEND_IN_PROGRESS"),
            AppError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_ERROR"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let log_message = self.to_string();

        // Client-caused errors are safe to echo back verbatim
        let client_message = match &self {
            AppError::Validation(msg) | AppError::NotFound(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Storage(_) if is_production() => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Config(_) | AppError::Internal(_) if is_production() => {
                "Internal server error".to_string()
            }
            _ => log_message.clone(),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notify_error_mapping() {
        let err: AppError = NotifyError::Validation("title is empty".to_string()).into();
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);

        let err: AppError = NotifyError::EntityNotFound("post-1".to_string()).into();
        assert_eq!(err.status_and_code().0, StatusCode::NOT_FOUND);

        let err: AppError = NotifyError::SendInProgress {
            entity_id: "post-1".to_string(),
            delivery_type: "new_content".to_string(),
        }
        .into();
        assert_eq!(err.status_and_code(), (StatusCode::CONFLICT, "SEND_IN_PROGRESS"));

        let err: AppError = NotifyError::Ledger(LedgerError::Unavailable("down".into())).into();
        assert_eq!(err.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::NotFound("entity x".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
