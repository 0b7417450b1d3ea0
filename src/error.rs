use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tracing::error;

use crate::types::envelope::ApiResponse;

/// One field-level validation failure, reported under `details`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, ThisError)]
pub enum LedgerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("Too many attempts, try again later")]
    RateLimited,

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Exchange rate error: {0}")]
    Fx(String),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("Password hashing error: {0}")]
    Password(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt stored value: {0}")]
    CorruptValue(String),
}

/// Errors worth another attempt when talking to an upstream rate provider.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for LedgerError {
    fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LedgerError::UpstreamStatus(code) => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl LedgerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        LedgerError::Validation {
            message: message.clone(),
            details: vec![FieldError::new(field, message)],
        }
    }

    /// Collapse accumulated field errors; `Ok` when there are none.
    pub fn check(details: Vec<FieldError>) -> Result<(), LedgerError> {
        if details.is_empty() {
            return Ok(());
        }
        Err(LedgerError::Validation {
            message: "Validation failed".to_string(),
            details,
        })
    }

    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::Unauthorized | LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LedgerError::Forbidden(_) => StatusCode::FORBIDDEN,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Validation { .. } => StatusCode::BAD_REQUEST,
            LedgerError::Conflict(_) => StatusCode::CONFLICT,
            LedgerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            LedgerError::Database(_)
            | LedgerError::Json(_)
            | LedgerError::Fx(_)
            | LedgerError::Reqwest(_)
            | LedgerError::UpstreamStatus(_)
            | LedgerError::RactorError(_)
            | LedgerError::Password(_)
            | LedgerError::Config(_)
            | LedgerError::CorruptValue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let body = match self {
            LedgerError::Validation { message, details } => {
                let details = serde_json::to_value(details).ok();
                ApiResponse::<()>::failure(message, details)
            }
            err if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "request failed");
                ApiResponse::<()>::failure("Internal server error", None)
            }
            err => ApiResponse::<()>::failure(err.to_string(), None),
        };
        (status, Json(body)).into_response()
    }
}
