//! Errors that end a `/generate_sql` request early.
//!
//! SQL execution failures are deliberately absent: they are reported inside
//! a 200 response so the caller still sees the SQL that was attempted.

use crate::llm::LlmError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("failed to generate SQL: {0}")]
    Generation(#[from] LlmError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::EmptyQuery => StatusCode::BAD_REQUEST,
            ApiError::Generation(e) => {
                error!(error = %e, "SQL generation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
