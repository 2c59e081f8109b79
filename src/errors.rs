use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("record store error: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    /// Single rejection for every credential failure. The response body never
    /// distinguishes "no such identity" from "wrong credential".
    #[error("invalid token or API key")]
    Unauthenticated,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("storage limit exceeded")]
    QuotaExceeded { needed: i64, ceiling: i64 },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::StoreUnavailable(ref e) => {
                tracing::error!("record store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Record store unavailable".to_string())
            }
            AppError::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, "Invalid token or API key".to_string())
            }
            AppError::RateLimited => {
                (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string())
            }
            AppError::QuotaExceeded { needed, ceiling } => (
                StatusCode::FORBIDDEN,
                format!("Storage limit exceeded: {} of {} bytes", needed, ceiling),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::UnsupportedMediaType(mime) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("Invalid file type: {}", mime),
            ),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
            AppError::Storage(ref msg) => {
                tracing::error!("storage error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
