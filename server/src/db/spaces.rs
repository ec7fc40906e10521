//! Database operations for the space table (the per-space version counter).

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};
use stow_engine::Version;

/// A stored space row.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceRecord {
    pub id: String,
    pub version: Version,
    pub last_modified: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SpaceRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(SpaceRecord {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            last_modified: row.try_get("last_modified")?,
        })
    }
}

/// Insert a space at version 0. Returns false if it already existed.
pub async fn create_space(conn: &mut PgConnection, space_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO space (id, version, last_modified)
        VALUES ($1, 0, now())
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(space_id)
    .execute(conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Get a space row by ID.
pub async fn get_space(
    conn: &mut PgConnection,
    space_id: &str,
) -> Result<Option<SpaceRecord>, sqlx::Error> {
    sqlx::query_as::<_, SpaceRecord>(
        r#"
        SELECT id, version, last_modified
        FROM space
        WHERE id = $1
        "#,
    )
    .bind(space_id)
    .fetch_optional(conn)
    .await
}

/// Get the current version of a space.
pub async fn get_version(
    conn: &mut PgConnection,
    space_id: &str,
) -> Result<Option<Version>, sqlx::Error> {
    let row: Option<(i64,)> = sqlx::query_as(r#"SELECT version FROM space WHERE id = $1"#)
        .bind(space_id)
        .fetch_optional(conn)
        .await?;

    Ok(row.map(|r| r.0))
}

/// Set the version of a space.
pub async fn set_version(
    conn: &mut PgConnection,
    space_id: &str,
    version: Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"UPDATE space SET version = $2, last_modified = now() WHERE id = $1"#)
        .bind(space_id)
        .bind(version)
        .execute(conn)
        .await?;

    Ok(())
}
