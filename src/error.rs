//! Domain error types for Keygate.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::http::{StatusCode, header};
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

use crate::models::KeyStatus;

/// Seconds a client should wait before retrying after a storage fault.
const STORAGE_RETRY_AFTER_SECS: u32 = 5;

/// Application-level errors.
///
/// The key lifecycle outcomes (`KeyNotFound`, `KeyExpired`, `KeyAlreadyConsumed`) are
/// terminal: retrying cannot change them. Only `StorageUnavailable` is worth a retry.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("key not found")]
    KeyNotFound,

    #[error("key expired")]
    KeyExpired,

    #[error("key is {0}")]
    KeyAlreadyConsumed(KeyStatus),

    /// Missing or wrong shared secret / admin key
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient database fault
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Grant failed: {0}")]
    GrantFailed(String),

    #[error("Revoke failed: {0}")]
    RevokeFailed(String),
}

impl AppError {
    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::KeyNotFound => "KEY_NOT_FOUND",
            AppError::KeyExpired => "KEY_EXPIRED",
            AppError::KeyAlreadyConsumed(_) => "KEY_ALREADY_CONSUMED",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AppError::GrantFailed(_) => "GRANT_FAILED",
            AppError::RevokeFailed(_) => "REVOKE_FAILED",
        }
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::StorageUnavailable(_))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::KeyNotFound => StatusCode::NOT_FOUND,
            AppError::KeyExpired => StatusCode::GONE,
            AppError::KeyAlreadyConsumed(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::GrantFailed(_) | AppError::RevokeFailed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::StorageUnavailable(err_str) => {
                tracing::error!("Storage error: {}", err_str);
                "The key store is temporarily unavailable".to_string()
            }
            AppError::GrantFailed(err_str) => {
                tracing::error!("Grant failed: {}", err_str);
                "Key redeemed but the privilege could not be granted".to_string()
            }
            _ => self.to_string(),
        };

        let mut builder = HttpResponse::build(self.status_code());
        if self.is_retryable() {
            builder.insert_header((header::RETRY_AFTER, STORAGE_RETRY_AFTER_SECS.to_string()));
        }

        builder.json(ErrorResponse {
            error: self.code().to_string(),
            message,
        })
    }
}

/// Error response body.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::StorageUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}
