mod error;
mod pages;
mod routes;
mod types;

pub use routes::create_router;

use std::sync::Arc;

use crate::service::ModelService;

/// Shared application state
pub struct AppState {
    pub service: Arc<ModelService>,
    /// Replace internal error text with a generic message in 500 bodies.
    pub redact_errors: bool,
}
