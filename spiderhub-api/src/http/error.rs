// HTTP error handling

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use std::fmt;

use super::envelope::Envelope;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(Envelope::<Value> {
            code: i32::from(self.status.as_u16()),
            msg: self.message,
            data: None,
        });

        (self.status, body).into_response()
    }
}

/// Convert spiderhub_core errors to HTTP errors
impl From<spiderhub_core::Error> for AppError {
    fn from(err: spiderhub_core::Error) -> Self {
        use spiderhub_core::Error;

        match err {
            Error::NotFound(_) => AppError::not_found(err.to_string()),
            Error::DuplicateKey(_) => AppError::conflict(err.to_string()),
            Error::InvalidKey(_)
            | Error::BadIdentifier(_)
            | Error::MissingParameter(_)
            | Error::UnsupportedOperation(_) => AppError::bad_request(err.to_string()),
            other => {
                tracing::error!("Request failed: {}", other);
                AppError::internal_server_error(other.to_string())
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::bad_request(format!("Invalid multipart body: {}", err.body_text()))
    }
}
