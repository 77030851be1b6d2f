use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Every error the HTTP layer can answer with.
///
/// Each variant renders as `{"success": false, "error": <classification>, "message": <text>}`;
/// validation failures additionally carry the full `errors` list.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{error}")]
    NotConfigured {
        error: &'static str,
        message: &'static str,
    },

    /// Upstream provider refused the request; its status is passed through.
    #[error("{error}: {message}")]
    Upstream {
        status: StatusCode,
        error: String,
        message: String,
    },

    #[error("Validation failed")]
    Validation(Vec<String>),

    #[error("{status}: {message}")]
    InvalidBody { status: StatusCode, message: String },

    #[error("{0}")]
    RateLimited(&'static str),

    #[error("{0}")]
    NotFound(String),

    /// Unexpected failure. `message` is already scrubbed for the environment.
    #[error("{error}: {message}")]
    Internal {
        error: &'static str,
        message: String,
    },
}

impl ApiError {
    /// Build an internal error, exposing `detail` only in development.
    pub fn internal(
        error: &'static str,
        detail: impl std::fmt::Display,
        public_message: &str,
        development: bool,
    ) -> Self {
        let message = if development {
            detail.to_string()
        } else {
            public_message.to_string()
        };
        ApiError::Internal { error, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotConfigured { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidBody { status, .. } => *status,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotConfigured { error, message } => json!({
                "success": false,
                "error": error,
                "message": message,
            }),
            ApiError::Upstream { error, message, .. } => json!({
                "success": false,
                "error": error,
                "message": message,
            }),
            ApiError::Validation(errors) => json!({
                "success": false,
                "error": "Validation failed",
                "message": errors.join("; "),
                "errors": errors,
            }),
            ApiError::InvalidBody { message, .. } => json!({
                "success": false,
                "error": "Invalid request body",
                "message": message,
            }),
            ApiError::RateLimited(message) => json!({
                "success": false,
                "error": "Too many requests",
                "message": message,
            }),
            ApiError::NotFound(message) => json!({
                "success": false,
                "error": "Not Found",
                "message": message,
            }),
            ApiError::Internal { error, message } => json!({
                "success": false,
                "error": error,
                "message": message,
            }),
        };

        (status, Json(body)).into_response()
    }
}
