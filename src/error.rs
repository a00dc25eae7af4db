//! Error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::model::ModelError;
use crate::scoring::ScoringError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    Unauthorized,

    // Request errors
    InvalidInput(String),

    // Model errors
    ModelUnavailable,
    ModelLoadFailed(String),
    InferenceFailure(String),

    // Generic errors
    InternalError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::ModelUnavailable => (StatusCode::SERVICE_UNAVAILABLE, "Model not loaded"),
            AppError::ModelLoadFailed(msg) => {
                tracing::error!("Model load failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.as_str())
            }
            AppError::InferenceFailure(msg) => {
                tracing::error!("Inference failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Inference failed")
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<ScoringError> for AppError {
    fn from(err: ScoringError) -> Self {
        match err {
            ScoringError::InvalidInput(msg) => AppError::InvalidInput(msg),
            ScoringError::ModelUnavailable => AppError::ModelUnavailable,
            ScoringError::InferenceFailure(msg) => AppError::InferenceFailure(msg),
        }
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::ModelLoadFailed(err.to_string())
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}
