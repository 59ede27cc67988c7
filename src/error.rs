use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Every way an HTTP request to the chat API can be refused.
///
/// The `Display` text is exactly what clients see in the `error` field of the response body.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid JSON format")]
    InvalidJson,

    #[error("Username and message are required")]
    MessageFieldsRequired,
    #[error("Username and message must be strings")]
    MessageFieldsNotStrings,
    #[error("Username and message cannot be empty")]
    MessageFieldsEmpty,
    #[error("Username too long (max 20 chars) or message too long (max 1000 chars)")]
    MessageFieldsTooLong,

    #[error("Username is required")]
    UsernameRequired,
    #[error("Username must be a string")]
    UsernameNotString,
    #[error("Username cannot be empty")]
    UsernameEmpty,
    #[error("Username must be between 2 and 20 characters")]
    UsernameLength,

    #[error("Not found")]
    NotFound,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
