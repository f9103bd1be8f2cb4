//! HTTP error handling for the web API.
//!
//! Core errors are turned into a status code plus a JSON body with a message
//! the page can show as-is.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// HTTP status sent with the body
    #[serde(skip)]
    pub status: StatusCode,
    /// Error code (e.g., "E003" for code not found)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Message meant for the person at the browser
    pub message: String,
    /// Underlying cause of client errors. Server-side failures leave it
    /// out, since their causes name remote locators.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    /// Create an error with an explicit status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Create an internal server error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }
}

/// Status code for a core error.
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NoFiles | Error::InvalidCodeFormat(_) => StatusCode::BAD_REQUEST,
        Error::CodeNotFound(_) => StatusCode::NOT_FOUND,
        Error::UpstreamFetch { .. } | Error::UpstreamUpload(_) => StatusCode::BAD_GATEWAY,
        Error::CapacityExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Message shown to the user for a core error.
fn message_for(err: &Error) -> String {
    match err {
        Error::NoFiles => "Please choose a file".to_string(),
        Error::CodeNotFound(_) | Error::InvalidCodeFormat(_) => {
            "Invalid or expired code".to_string()
        }
        Error::UpstreamFetch { .. } => "Could not fetch the shared files".to_string(),
        Error::UpstreamUpload(_) => "Failed to upload to storage".to_string(),
        Error::CapacityExhausted { .. } => {
            "Too many active shares, try again shortly".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            tracing::warn!("Request failed: {}", err);
        }
        Self {
            status,
            code: err.code().map(String::from),
            message: message_for(&err),
            details: (!status.is_server_error()).then(|| err.to_string()),
        }
    }
}

/// Result type for web handlers.
pub type ApiResult<T> = Result<T, ApiError>;
