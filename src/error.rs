// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("You do not have access to this resource")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    DuplicateKey(String),

    #[error("Failed to generate form fields: {0}")]
    Generation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable kind, included in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::InvalidToken => "invalid_token",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::DuplicateKey(_) => "duplicate_key",
            AppError::Generation(_) => "generation_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateKey(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Generation(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    message: String,
    error: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "An internal server error occurred.".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "An internal server error occurred.".to_string()
            }
            AppError::Generation(msg) => {
                tracing::error!(error = %msg, "Field generation failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            success: false,
            message,
            error: self.kind(),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<crate::services::CredentialError> for AppError {
    fn from(err: crate::services::CredentialError) -> Self {
        match err {
            crate::services::CredentialError::InvalidToken => AppError::InvalidToken,
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<crate::services::GenerationError> for AppError {
    fn from(err: crate::services::GenerationError) -> Self {
        AppError::Generation(err.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
