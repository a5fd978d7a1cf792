//! Health check endpoint.

use axum::{routing::get, Json, Router};
use grimoire_engine::model::{Campaign, Character};
use grimoire_engine::Entity;
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub collections: [&'static str; 2],
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler. Unauthenticated so clients can check connectivity
/// before they have a token.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        collections: [Campaign::COLLECTION, Character::COLLECTION],
    })
}

/// Root handler.
async fn root() -> &'static str {
    "Grimoire Server"
}
