//! Database operations for the entities table.

use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite};

/// A stored entity row from the database.
#[derive(Debug)]
pub struct StoredEntity {
    pub id: i64,
    pub collection: String,
    /// JSON document of the entity's fields
    pub payload: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, SqliteRow> for StoredEntity {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEntity {
            id: row.try_get("id")?,
            collection: row.try_get("collection")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// All entities in a collection, by ascending id.
pub async fn list_entities<'e, E>(
    executor: E,
    collection: &str,
) -> Result<Vec<StoredEntity>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StoredEntity>(
        r#"
        SELECT id, collection, payload, created_at, updated_at
        FROM entities
        WHERE collection = ?1
        ORDER BY id
        "#,
    )
    .bind(collection)
    .fetch_all(executor)
    .await
}

/// Get an entity by collection and id.
pub async fn get_entity<'e, E>(
    executor: E,
    collection: &str,
    id: i64,
) -> Result<Option<StoredEntity>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, StoredEntity>(
        r#"
        SELECT id, collection, payload, created_at, updated_at
        FROM entities
        WHERE collection = ?1 AND id = ?2
        "#,
    )
    .bind(collection)
    .bind(id)
    .fetch_optional(executor)
    .await
}

/// Insert an entity and return its new id.
pub async fn insert_entity<'e, E>(
    executor: E,
    collection: &str,
    payload: &str,
    now: i64,
) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO entities (collection, payload, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?3)
        "#,
    )
    .bind(collection)
    .bind(payload)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Replace an entity's payload. Returns false if it does not exist.
pub async fn update_entity<'e, E>(
    executor: E,
    collection: &str,
    id: i64,
    payload: &str,
    now: i64,
) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE entities
        SET payload = ?3, updated_at = ?4
        WHERE collection = ?1 AND id = ?2
        "#,
    )
    .bind(collection)
    .bind(id)
    .bind(payload)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an entity. Returns false if it does not exist.
pub async fn delete_entity<'e, E>(executor: E, collection: &str, id: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM entities WHERE collection = ?1 AND id = ?2")
        .bind(collection)
        .bind(id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Current value of a named id sequence.
pub async fn get_sequence<'e, E>(executor: E, name: &str) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT value FROM sequences WHERE name = ?1")
        .bind(name)
        .fetch_optional(executor)
        .await?;

    match row {
        Some(row) => row.try_get("value"),
        None => Ok(0),
    }
}

/// Store the last id handed out by a named sequence.
pub async fn set_sequence<'e, E>(executor: E, name: &str, value: i64) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO sequences (name, value) VALUES (?1, ?2)
        ON CONFLICT (name) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(name)
    .bind(value)
    .execute(executor)
    .await?;

    Ok(())
}
