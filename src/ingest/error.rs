use crate::parser::ParseError;
use crate::port::QueueError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),

    #[error("Batch must contain between 1 and {max} records, got {got}")]
    BatchSize { max: usize, got: usize },

    #[error("Unknown parser: {0}")]
    ParserNotFound(String),

    #[error("Could not parse log: {0}")]
    Parse(#[from] ParseError),

    #[error("Queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

impl IngestError {
    pub fn status(&self) -> StatusCode {
        match self {
            IngestError::Validation(_) | IngestError::BatchSize { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            IngestError::ParserNotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Parse(_) => StatusCode::BAD_REQUEST,
            IngestError::Queue(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Ingestion request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
