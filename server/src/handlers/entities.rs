//! Entity handlers - CRUD over one collection's JSON documents.
//!
//! On every write the server hands out ids to children that lack one and
//! points them back at their parent, so clients only ever learn child ids
//! from a response or a later pull.

use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use grimoire_engine::{Entity, RemoteEntity, RemoteId};
use sqlx::SqliteConnection;

/// Sequence shared by every kind of child.
const CHILD_SEQUENCE: &str = "children";

/// List a collection.
pub async fn handle_list<T: Entity>(pool: &Pool) -> Result<Vec<RemoteEntity<T>>> {
    db::list_entities(pool, T::COLLECTION)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

/// Fetch one entity.
pub async fn handle_get<T: Entity>(pool: &Pool, id: RemoteId) -> Result<RemoteEntity<T>> {
    let stored = db::get_entity(pool, T::COLLECTION, check_id(id)?)
        .await?
        .ok_or_else(|| not_found::<T>(id))?;
    decode(stored)
}

/// Store a new entity and assign its id.
pub async fn handle_create<T: Entity>(pool: &Pool, fields: T) -> Result<RemoteEntity<T>> {
    let now = chrono::Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;

    // Insert first to learn the id the children point back at.
    let id = db::insert_entity(&mut *tx, T::COLLECTION, "{}", now).await?;
    let fields = link_and_store(&mut *tx, id, fields, now).await?;

    tx.commit().await?;
    tracing::debug!(collection = T::COLLECTION, id, "entity created");
    Ok(RemoteEntity::new(id, fields))
}

/// Replace an entity's fields.
pub async fn handle_update<T: Entity>(
    pool: &Pool,
    id: RemoteId,
    fields: T,
) -> Result<RemoteEntity<T>> {
    let id = check_id(id)?;
    let now = chrono::Utc::now().timestamp_millis();
    let mut tx = pool.begin().await?;

    // Touch the row before reading the child sequence so the write lock is
    // already held.
    let exists = db::update_entity(&mut *tx, T::COLLECTION, id, "{}", now).await?;
    if !exists {
        return Err(not_found::<T>(id));
    }
    let fields = link_and_store(&mut *tx, id, fields, now).await?;

    tx.commit().await?;
    tracing::debug!(collection = T::COLLECTION, id, "entity updated");
    Ok(RemoteEntity::new(id, fields))
}

/// Delete an entity.
pub async fn handle_delete<T: Entity>(pool: &Pool, id: RemoteId) -> Result<()> {
    if !db::delete_entity(pool, T::COLLECTION, check_id(id)?).await? {
        return Err(not_found::<T>(id));
    }
    tracing::debug!(collection = T::COLLECTION, id, "entity deleted");
    Ok(())
}

async fn link_and_store<T: Entity>(
    conn: &mut SqliteConnection,
    id: RemoteId,
    mut fields: T,
    now: i64,
) -> Result<T> {
    let start = db::get_sequence(&mut *conn, CHILD_SEQUENCE).await?;
    let mut next = start;
    fields.link_children(id, &mut || {
        next += 1;
        next
    });
    if next != start {
        db::set_sequence(&mut *conn, CHILD_SEQUENCE, next).await?;
    }

    let payload = serde_json::to_string(&fields)?;
    db::update_entity(&mut *conn, T::COLLECTION, id, &payload, now).await?;
    Ok(fields)
}

fn decode<T: Entity>(stored: db::StoredEntity) -> Result<RemoteEntity<T>> {
    let fields = serde_json::from_str(&stored.payload)?;
    Ok(RemoteEntity::new(stored.id, fields))
}

fn check_id(id: RemoteId) -> Result<RemoteId> {
    if id <= 0 {
        return Err(AppError::BadRequest(format!("invalid id: {id}")));
    }
    Ok(id)
}

fn not_found<T: Entity>(id: RemoteId) -> AppError {
    AppError::NotFound(format!("{} {id}", T::COLLECTION))
}
