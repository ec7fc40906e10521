//! Storage backends behind a single transactional interface.
//!
//! [`Store`] hands out [`StoreTx`] handles. Every read and write of a push or
//! pull goes through one handle, and nothing is visible to other handles until
//! [`StoreTx::commit`]. Dropping a handle without committing discards it.

mod memory;
mod retry;

pub use memory::{MemoryStore, MemoryTx};
pub use retry::with_retry;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use stow_engine::{ChangedEntry, ClientId, Key, MutationId, Version};

use crate::db::{self, ClientGroupRecord, ClientRecord, SpaceRecord};

/// SQLSTATE codes Postgres uses for aborts that a rerun may get past.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another writer committed after this transaction's snapshot was taken.
    #[error("Transaction conflicted with a concurrent commit")]
    Conflict,
}

impl StoreError {
    /// Whether the transaction was aborted by a conflict rather than a fault.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Conflict => true,
            StoreError::Database(sqlx::Error::Database(e)) => matches!(
                e.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
            ),
            StoreError::Database(_) => false,
        }
    }
}

/// A storage backend.
#[derive(Debug, Clone)]
pub enum Store {
    Postgres(PgPool),
    Memory(Arc<MemoryStore>),
}

impl Store {
    /// A fresh in-memory backend.
    pub fn memory() -> Self {
        Store::Memory(Arc::new(MemoryStore::new()))
    }

    /// Short name of the backend, for diagnostics.
    pub fn backend(&self) -> &'static str {
        match self {
            Store::Postgres(_) => "postgres",
            Store::Memory(_) => "memory",
        }
    }

    /// Begin a serializable read-write transaction.
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        match self {
            Store::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                    .execute(&mut *tx)
                    .await?;
                Ok(StoreTx::Postgres(tx))
            }
            Store::Memory(store) => Ok(StoreTx::Memory(store.begin())),
        }
    }

    /// Begin a serializable transaction that only reads.
    pub async fn begin_read_only(&self) -> Result<StoreTx, StoreError> {
        match self {
            Store::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE, READ ONLY")
                    .execute(&mut *tx)
                    .await?;
                Ok(StoreTx::Postgres(tx))
            }
            Store::Memory(store) => Ok(StoreTx::Memory(store.begin())),
        }
    }
}

/// An open transaction on either backend.
pub enum StoreTx {
    Postgres(Transaction<'static, Postgres>),
    Memory(MemoryTx),
}

impl StoreTx {
    pub async fn create_space(&mut self, space_id: &str) -> Result<bool, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::create_space(&mut **tx, space_id).await?),
            StoreTx::Memory(tx) => Ok(tx.create_space(space_id)),
        }
    }

    pub async fn get_space(&mut self, space_id: &str) -> Result<Option<SpaceRecord>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_space(&mut **tx, space_id).await?),
            StoreTx::Memory(tx) => Ok(tx.get_space(space_id)),
        }
    }

    /// Current version of a space, `None` if the space does not exist.
    pub async fn get_version(&mut self, space_id: &str) -> Result<Option<Version>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_version(&mut **tx, space_id).await?),
            StoreTx::Memory(tx) => Ok(tx.get_space(space_id).map(|space| space.version)),
        }
    }

    pub async fn set_version(&mut self, space_id: &str, version: Version) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::set_version(&mut **tx, space_id, version).await?),
            StoreTx::Memory(tx) => {
                tx.set_version(space_id, version);
                Ok(())
            }
        }
    }

    pub async fn get_entry(&mut self, space_id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_entry(&mut **tx, space_id, key).await?),
            StoreTx::Memory(tx) => Ok(tx.get_entry(space_id, key)),
        }
    }

    pub async fn put_entry(
        &mut self,
        space_id: &str,
        key: &str,
        value: &Value,
        version: Version,
    ) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => {
                Ok(db::put_entry(&mut **tx, space_id, key, value, version).await?)
            }
            StoreTx::Memory(tx) => {
                tx.put_entry(space_id, key, value.clone(), version);
                Ok(())
            }
        }
    }

    pub async fn del_entry(&mut self, space_id: &str, key: &str, version: Version) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::del_entry(&mut **tx, space_id, key, version).await?),
            StoreTx::Memory(tx) => {
                tx.del_entry(space_id, key, version);
                Ok(())
            }
        }
    }

    /// Live entries at or after `from_key` whose key starts with `prefix`.
    pub async fn get_entries(
        &mut self,
        space_id: &str,
        from_key: &str,
        prefix: &str,
    ) -> Result<Vec<(Key, Value)>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => {
                Ok(db::get_entries(&mut **tx, space_id, from_key, prefix).await?)
            }
            StoreTx::Memory(tx) => Ok(tx.get_entries(space_id, from_key, prefix)),
        }
    }

    /// Entries stamped after `since`, tombstones included, in key order.
    pub async fn get_changed_entries(
        &mut self,
        space_id: &str,
        since: Version,
    ) -> Result<Vec<ChangedEntry>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_changed_entries(&mut **tx, space_id, since).await?),
            StoreTx::Memory(tx) => Ok(tx.get_changed_entries(space_id, since)),
        }
    }

    pub async fn get_client(&mut self, client_id: &str) -> Result<Option<ClientRecord>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_client(&mut **tx, client_id).await?),
            StoreTx::Memory(tx) => Ok(tx.get_client(client_id)),
        }
    }

    pub async fn create_client(
        &mut self,
        client_id: &str,
        client_group_id: &str,
        version: Version,
    ) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => {
                Ok(db::create_client(&mut **tx, client_id, client_group_id, version).await?)
            }
            StoreTx::Memory(tx) => {
                tx.create_client(client_id, client_group_id, version);
                Ok(())
            }
        }
    }

    pub async fn update_client(
        &mut self,
        client_id: &str,
        last_mutation_id: MutationId,
        version: Version,
    ) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => {
                Ok(db::update_client(&mut **tx, client_id, last_mutation_id, version).await?)
            }
            StoreTx::Memory(tx) => {
                tx.update_client(client_id, last_mutation_id, version);
                Ok(())
            }
        }
    }

    pub async fn get_client_group(
        &mut self,
        client_group_id: &str,
    ) -> Result<Option<ClientGroupRecord>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_client_group(&mut **tx, client_group_id).await?),
            StoreTx::Memory(tx) => Ok(tx.get_client_group(client_group_id)),
        }
    }

    pub async fn create_client_group(
        &mut self,
        client_group_id: &str,
        space_id: &str,
        user_id: &str,
    ) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::create_client_group(
                &mut **tx,
                client_group_id,
                space_id,
                user_id,
            )
            .await?),
            StoreTx::Memory(tx) => {
                tx.create_client_group(client_group_id, space_id, user_id);
                Ok(())
            }
        }
    }

    /// `{clientID: lastMutationID}` for the group's clients advanced after `since`.
    pub async fn get_changed_last_mutation_ids(
        &mut self,
        client_group_id: &str,
        since: Version,
    ) -> Result<BTreeMap<ClientId, MutationId>, StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(db::get_changed_last_mutation_ids(
                &mut **tx,
                client_group_id,
                since,
            )
            .await?),
            StoreTx::Memory(tx) => Ok(tx.get_changed_last_mutation_ids(client_group_id, since)),
        }
    }

    /// Make every write of this transaction visible.
    pub async fn commit(self) -> Result<(), StoreError> {
        match self {
            StoreTx::Postgres(tx) => Ok(tx.commit().await?),
            StoreTx::Memory(tx) => tx.commit(),
        }
    }
}
