use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use super::types::ErrorResponse;

pub const NO_MESSAGE: &str = "No message provided";
pub const REDACTED: &str = "Internal server error";

#[derive(Debug)]
pub enum ApiError {
    /// Request carried no usable `message`.
    MissingMessage,
    /// Generation failed; holds the text shown to the client.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingMessage => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::MissingMessage => NO_MESSAGE.to_string(),
            ApiError::Internal(message) => message,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}
