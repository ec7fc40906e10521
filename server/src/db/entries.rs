//! Database operations for the entry table.
//!
//! Entries are never hard-deleted: a delete flips `deleted` and stamps the
//! version so that later pulls can report it.

use serde_json::Value;
use sqlx::{PgConnection, Row};
use stow_engine::{ChangedEntry, Key, Version};

/// Row wrapper so the engine type can be decoded by sqlx.
#[derive(Debug)]
pub struct ChangedEntryRow(pub ChangedEntry);

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ChangedEntryRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ChangedEntryRow(ChangedEntry {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            deleted: row.try_get("deleted")?,
            version: row.try_get("version")?,
        }))
    }
}

/// Get a live entry's value.
pub async fn get_entry(
    conn: &mut PgConnection,
    space_id: &str,
    key: &str,
) -> Result<Option<Value>, sqlx::Error> {
    let row: Option<(Value,)> = sqlx::query_as(
        r#"
        SELECT value
        FROM entry
        WHERE space_id = $1 AND key = $2 AND deleted = false
        "#,
    )
    .bind(space_id)
    .bind(key)
    .fetch_optional(conn)
    .await?;

    Ok(row.map(|r| r.0))
}

/// Upsert an entry, clearing any tombstone.
pub async fn put_entry(
    conn: &mut PgConnection,
    space_id: &str,
    key: &str,
    value: &Value,
    version: Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO entry (space_id, key, value, deleted, version, last_modified)
        VALUES ($1, $2, $3, false, $4, now())
        ON CONFLICT (space_id, key) DO UPDATE SET
            value = EXCLUDED.value,
            deleted = false,
            version = EXCLUDED.version,
            last_modified = now()
        "#,
    )
    .bind(space_id)
    .bind(key)
    .bind(value)
    .bind(version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Tombstone an entry. A key that was never written is left absent.
pub async fn del_entry(
    conn: &mut PgConnection,
    space_id: &str,
    key: &str,
    version: Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE entry
        SET deleted = true, version = $3, last_modified = now()
        WHERE space_id = $1 AND key = $2
        "#,
    )
    .bind(space_id)
    .bind(key)
    .bind(version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Live entries with `key >= from_key` that start with `prefix`, ascending.
pub async fn get_entries(
    conn: &mut PgConnection,
    space_id: &str,
    from_key: &str,
    prefix: &str,
) -> Result<Vec<(Key, Value)>, sqlx::Error> {
    sqlx::query_as::<_, (Key, Value)>(
        r#"
        SELECT key, value
        FROM entry
        WHERE space_id = $1 AND key >= $2 AND starts_with(key, $3) AND deleted = false
        ORDER BY key
        "#,
    )
    .bind(space_id)
    .bind(from_key)
    .bind(prefix)
    .fetch_all(conn)
    .await
}

/// Every entry, tombstones included, stamped after `since`.
pub async fn get_changed_entries(
    conn: &mut PgConnection,
    space_id: &str,
    since: Version,
) -> Result<Vec<ChangedEntry>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ChangedEntryRow>(
        r#"
        SELECT key, value, deleted, version
        FROM entry
        WHERE space_id = $1 AND version > $2
        ORDER BY key
        "#,
    )
    .bind(space_id)
    .bind(since)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().map(|row| row.0).collect())
}
