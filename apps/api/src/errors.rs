use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::models::AnalysisError;
use crate::document::models::ParseError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Analysis(#[from] AnalysisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Parse(e) => match e {
                ParseError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                ParseError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                ParseError::Empty
                | ParseError::Corrupted(_)
                | ParseError::Encrypted
                | ParseError::LegacyFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Analysis(e) => match e {
                AnalysisError::Validation(_) => StatusCode::BAD_REQUEST,
                AnalysisError::StreamInProgress | AnalysisError::Cancelled => StatusCode::CONFLICT,
                AnalysisError::CooldownActive { .. }
                | AnalysisError::QuotaExceeded(_)
                | AnalysisError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
                AnalysisError::BotVerification(_) => StatusCode::FORBIDDEN,
                AnalysisError::InvalidCredential(_) => StatusCode::UNAUTHORIZED,
                AnalysisError::ContentPolicy { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                AnalysisError::Transport(_) => StatusCode::BAD_GATEWAY,
                AnalysisError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Parse(e) => e.code(),
            AppError::Analysis(e) => e.code(),
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                "An internal server error occurred".to_string()
            }
            AppError::Analysis(e @ AnalysisError::Template(_)) => {
                tracing::error!("Template error: {e}");
                e.to_string()
            }
            AppError::NotFound(msg) | AppError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        };

        let mut error = json!({
            "code": self.code(),
            "message": message
        });
        if let AppError::Analysis(AnalysisError::CooldownActive { remaining_seconds }) = &self {
            error["remainingSeconds"] = json!(remaining_seconds);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
