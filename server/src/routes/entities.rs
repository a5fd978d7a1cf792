//! Collection routes, one set per entity type.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use grimoire_engine::{Entity, RemoteEntity, RemoteId};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_create, handle_delete, handle_get, handle_list, handle_update};
use crate::AppState;

/// Create routes for `T`'s collection:
/// `GET|POST /{collection}` and `GET|PUT|DELETE /{collection}/{id}`.
pub fn routes<T: Entity>() -> Router<AppState> {
    let collection = format!("/{}", T::COLLECTION);
    let item = format!("/{}/{{id}}", T::COLLECTION);

    Router::new()
        .route(&collection, get(list_handler::<T>).post(create_handler::<T>))
        .route(
            &item,
            get(get_handler::<T>)
                .put(update_handler::<T>)
                .delete(delete_handler::<T>),
        )
}

/// GET /{collection}
async fn list_handler<T: Entity>(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<RemoteEntity<T>>>> {
    Ok(Json(handle_list(&state.pool).await?))
}

/// GET /{collection}/{id}
async fn get_handler<T: Entity>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<RemoteId>,
) -> Result<Json<RemoteEntity<T>>> {
    Ok(Json(handle_get(&state.pool, id).await?))
}

/// POST /{collection}
async fn create_handler<T: Entity>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(fields): Json<T>,
) -> Result<(StatusCode, Json<RemoteEntity<T>>)> {
    let created = handle_create(&state.pool, fields).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /{collection}/{id}
async fn update_handler<T: Entity>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<RemoteId>,
    Json(fields): Json<T>,
) -> Result<Json<RemoteEntity<T>>> {
    Ok(Json(handle_update(&state.pool, id, fields).await?))
}

/// DELETE /{collection}/{id}
async fn delete_handler<T: Entity>(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<RemoteId>,
) -> Result<StatusCode> {
    handle_delete::<T>(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
