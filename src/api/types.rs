use serde::Serialize;
use serde_json::Value;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub message: String,
}

impl ChatRequest {
    /// Parses a request with a non-empty message. Bodies that are not a JSON
    /// object with a string `message` count as having none.
    pub fn from_body(body: &[u8]) -> Option<Self> {
        let value: Value = serde_json::from_slice(body).ok()?;
        let message = value.as_object()?.get("message")?.as_str()?;
        if message.is_empty() {
            return None;
        }
        Some(Self {
            message: message.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataResponse {
    pub message: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub device: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
