//! Grimoire Server - reference REST backend for Grimoire sync.
//!
//! Serves `campaigns` and `characters` as plain JSON collections over
//! sqlite, with the same CRUD surface the engine's `HttpRemote` talks to.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::db::Pool;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open the database named by `config` and bring its schema up to date.
    pub async fn connect(config: Config) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let pool = db::create_pool(&config.database_url).await?;

        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;

        Ok(Self {
            pool,
            config: Arc::new(config),
        })
    }
}

/// Build the router with tracing and CORS layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
