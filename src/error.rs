use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::ItemId;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Event store unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Item(s) not found: {0:?}")]
    ItemNotFound(Vec<ItemId>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for failures of the underlying event store, as opposed to caller mistakes
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::AdapterUnavailable(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::ItemNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Database(_) | AppError::AdapterUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Cancelled => (StatusCode::REQUEST_TIMEOUT, self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
