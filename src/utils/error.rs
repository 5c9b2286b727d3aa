use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::services::sheets::SheetsError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed or missing request fields. No state was changed.
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Store unreachable or a write failed. The message is logged, never returned.
    #[error("Database error: {0}")]
    Persistence(String),

    /// Spreadsheet auth/connectivity failure.
    #[error("Spreadsheet error: {0}")]
    ExternalService(String),

    #[error("A synchronization is already running")]
    SyncInProgress,
}

impl AppError {
    /// Stable identifier returned to callers alongside the message.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Persistence(_) => "persistence_error",
            AppError::ExternalService(_) => "external_service_error",
            AppError::SyncInProgress => "sync_conflict",
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            AppError::Persistence(_) => "Failed to access the data store".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) | AppError::SyncInProgress => StatusCode::CONFLICT,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "kind": self.kind(),
            "error": self.public_message()
        }))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref err, _) = e {
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            {
                return AppError::AlreadyExists(
                    "a record with this user_id already exists".to_string(),
                );
            }
        }
        AppError::Persistence(e.to_string())
    }
}

impl From<SheetsError> for AppError {
    fn from(e: SheetsError) -> Self {
        AppError::ExternalService(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_errors_hide_internal_detail() {
        let err = AppError::Persistence("disk I/O error at /var/lib/secret.db".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("secret"));
        assert_eq!(err.kind(), "persistence_error");
    }

    #[test]
    fn sync_conflict_maps_to_409() {
        let err = AppError::SyncInProgress;
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.kind(), "sync_conflict");
    }

    #[test]
    fn sheets_errors_become_external_service_errors() {
        let err: AppError = SheetsError::Authorization("token rejected".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.kind(), "external_service_error");
    }
}
