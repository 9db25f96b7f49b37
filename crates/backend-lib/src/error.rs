// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
#[derive(Error, Debug)]
pub enum AppError {
    /// Input failed a username or password policy check
    #[error("Invalid input: {}", .0.join(", "))]
    InvalidInput(Vec<String>),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    /// Authoritative store lookup or bulk read failed or timed out
    #[error("User store unavailable: {0}")]
    StoreUnavailable(String),

    /// Registration-time uniqueness could not be established
    #[error("Username availability unknown: {0}")]
    AvailabilityUnknown(String),

    #[error("No available username found after {attempts} attempts")]
    SuggestionExhausted { attempts: usize },

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::UsernameTaken(_) => StatusCode::CONFLICT,
            AppError::StoreUnavailable(_)
            | AppError::AvailabilityUnknown(_)
            | AppError::SuggestionExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "VAL_001",
            AppError::UsernameTaken(_) => "USER_001",
            AppError::StoreUnavailable(_) => "STORE_001",
            AppError::AvailabilityUnknown(_) => "STORE_002",
            AppError::SuggestionExhausted { .. } => "USER_002",
            AppError::Hashing(_) => "HASH_001",
            AppError::Config(_) => "CFG_001",
            AppError::Internal(_) => "INT_001",
            AppError::Json(_) => "JSON_001",
        }
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            // Policy issues are meant for the user, so they pass through.
            AppError::InvalidInput(issues) => issues.join(", "),
            AppError::UsernameTaken(_) => "Username is taken".to_string(),
            AppError::StoreUnavailable(_) | AppError::AvailabilityUnknown(_) => {
                "Username availability could not be verified, please try again later".to_string()
            },
            AppError::SuggestionExhausted { .. } => {
                "Could not find an available username, please try again".to_string()
            },
            AppError::Json(_) => "Invalid request format".to_string(),
            _ => "An internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Hashing(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::StoreUnavailable("operation timed out".to_string())
    }
}
