//! Database operations for the client and client_group tables.

use sqlx::{PgConnection, Row};
use std::collections::BTreeMap;
use stow_engine::{ClientId, MutationId, Version};

/// A stored client row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: String,
    pub client_group_id: String,
    pub last_mutation_id: MutationId,
    pub last_modified_version: Version,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ClientRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ClientRecord {
            id: row.try_get("id")?,
            client_group_id: row.try_get("client_group_id")?,
            last_mutation_id: row.try_get("last_mutation_id")?,
            last_modified_version: row.try_get("last_modified_version")?,
        })
    }
}

/// A stored client group row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientGroupRecord {
    pub id: String,
    pub space_id: String,
    /// Principal that owns the group.
    pub user_id: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ClientGroupRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ClientGroupRecord {
            id: row.try_get("id")?,
            space_id: row.try_get("space_id")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

/// Get a client by ID.
pub async fn get_client(
    conn: &mut PgConnection,
    client_id: &str,
) -> Result<Option<ClientRecord>, sqlx::Error> {
    sqlx::query_as::<_, ClientRecord>(
        r#"
        SELECT id, client_group_id, last_mutation_id, last_modified_version
        FROM client
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .fetch_optional(conn)
    .await
}

/// Insert a client with no applied mutations.
pub async fn create_client(
    conn: &mut PgConnection,
    client_id: &str,
    client_group_id: &str,
    version: Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO client (id, client_group_id, last_mutation_id, last_modified_version)
        VALUES ($1, $2, 0, $3)
        "#,
    )
    .bind(client_id)
    .bind(client_group_id)
    .bind(version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Advance a client's mutation cursor.
pub async fn update_client(
    conn: &mut PgConnection,
    client_id: &str,
    last_mutation_id: MutationId,
    version: Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE client
        SET last_mutation_id = $2, last_modified_version = $3, last_modified = now()
        WHERE id = $1
        "#,
    )
    .bind(client_id)
    .bind(last_mutation_id)
    .bind(version)
    .execute(conn)
    .await?;

    Ok(())
}

/// Get a client group by ID.
pub async fn get_client_group(
    conn: &mut PgConnection,
    client_group_id: &str,
) -> Result<Option<ClientGroupRecord>, sqlx::Error> {
    sqlx::query_as::<_, ClientGroupRecord>(
        r#"
        SELECT id, space_id, user_id
        FROM client_group
        WHERE id = $1
        "#,
    )
    .bind(client_group_id)
    .fetch_optional(conn)
    .await
}

/// Insert a client group owned by `user_id`.
pub async fn create_client_group(
    conn: &mut PgConnection,
    client_group_id: &str,
    space_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(r#"INSERT INTO client_group (id, space_id, user_id) VALUES ($1, $2, $3)"#)
        .bind(client_group_id)
        .bind(space_id)
        .bind(user_id)
        .execute(conn)
        .await?;

    Ok(())
}

/// Cursors of the group's clients that moved after `since`.
pub async fn get_changed_last_mutation_ids(
    conn: &mut PgConnection,
    client_group_id: &str,
    since: Version,
) -> Result<BTreeMap<ClientId, MutationId>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT id, last_mutation_id
        FROM client
        WHERE client_group_id = $1 AND last_modified_version > $2
        "#,
    )
    .bind(client_group_id)
    .bind(since)
    .fetch_all(conn)
    .await?;

    Ok(rows.into_iter().collect())
}
