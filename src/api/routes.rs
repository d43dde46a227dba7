use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{ApiError, REDACTED};
use super::pages;
use super::types::*;
use super::AppState;
use crate::error::ServiceError;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/about", get(pages::about))
        .route("/chat", get(pages::chat))
        .route("/health", get(health_check))
        .route("/api/data", get(api_data))
        .route("/api/chat", post(chat_api))
        .route("/static/chat.js", get(pages::chat_script))
        .route("/static/style.css", get(pages::stylesheet))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.service.model_id().to_string(),
        device: state.service.device_name().to_string(),
    })
}

async fn api_data() -> Json<DataResponse> {
    Json(DataResponse {
        message: "Hello from Flask API!",
        status: "success",
    })
}

// The body is read raw so that malformed or mistyped JSON ends up as a
// missing message rather than an extractor rejection.
async fn chat_api(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ApiError> {
    let request_id = Uuid::new_v4();

    let Some(request) = ChatRequest::from_body(&body) else {
        warn!(%request_id, "Chat request without a message ({} byte body)", body.len());
        return Err(ApiError::MissingMessage);
    };

    info!(%request_id, "Chat request: message_len={}", request.message.len());

    let service = Arc::clone(&state.service);
    let result = tokio::task::spawn_blocking(move || service.reply(&request.message))
        .await
        .map_err(|e| ServiceError::Generation(format!("generation task failed: {}", e)))
        .and_then(|reply| reply);

    match result {
        Ok(response) => {
            info!(%request_id, "Chat response: {} chars", response.len());
            Ok(Json(ChatResponse {
                response,
                model: state.service.model_id().to_string(),
            }))
        }
        Err(e) => {
            error!(%request_id, "Generation error: {}", e);
            let message = if state.redact_errors {
                REDACTED.to_string()
            } else {
                e.to_string()
            };
            Err(ApiError::Internal(message))
        }
    }
}
