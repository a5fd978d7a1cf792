//! HTTP route definitions.

mod entities;
mod health;

use crate::AppState;
use axum::Router;
use grimoire_engine::model::{Campaign, Character};

/// Create all application routes.
pub fn create_routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .merge(entities::routes::<Campaign>())
        .merge(entities::routes::<Character>())
}
