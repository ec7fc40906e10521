//! In-process storage backend.
//!
//! Used when no `DATABASE_URL` is configured and by the integration tests.
//! Each transaction works on a private snapshot of the whole state and
//! publishes it at commit. Validation is first-committer-wins: a transaction
//! that wrote anything fails with [`StoreError::Conflict`] if any other
//! writer committed after its snapshot was taken.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use stow_engine::{ChangedEntry, ClientId, Key, MutationId, SpaceId, Version};

use super::StoreError;
use crate::db::{ClientGroupRecord, ClientRecord, SpaceRecord};

#[derive(Debug, Clone)]
struct EntryRow {
    value: Value,
    deleted: bool,
    version: Version,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    spaces: HashMap<SpaceId, SpaceRecord>,
    groups: HashMap<String, ClientGroupRecord>,
    clients: HashMap<ClientId, ClientRecord>,
    entries: HashMap<SpaceId, BTreeMap<Key, EntryRow>>,
}

#[derive(Debug, Default)]
struct Shared {
    state: MemoryState,
    /// Number of write transactions committed so far.
    commits: u64,
}

/// Shared in-memory database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    shared: Mutex<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current state into a new transaction.
    pub fn begin(self: &Arc<Self>) -> MemoryTx {
        let shared = self.shared.lock();
        MemoryTx {
            store: Arc::clone(self),
            base: shared.commits,
            state: shared.state.clone(),
            wrote: false,
        }
    }

    /// Number of committed write transactions.
    pub fn commit_count(&self) -> u64 {
        self.shared.lock().commits
    }
}

/// A transaction against a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    store: Arc<MemoryStore>,
    base: u64,
    state: MemoryState,
    wrote: bool,
}

impl MemoryTx {
    pub(super) fn create_space(&mut self, space_id: &str) -> bool {
        if self.state.spaces.contains_key(space_id) {
            return false;
        }
        self.wrote = true;
        self.state.spaces.insert(
            space_id.to_string(),
            SpaceRecord {
                id: space_id.to_string(),
                version: 0,
                last_modified: Utc::now(),
            },
        );
        true
    }

    pub(super) fn get_space(&self, space_id: &str) -> Option<SpaceRecord> {
        self.state.spaces.get(space_id).cloned()
    }

    pub(super) fn set_version(&mut self, space_id: &str, version: Version) {
        if let Some(space) = self.state.spaces.get_mut(space_id) {
            self.wrote = true;
            space.version = version;
            space.last_modified = Utc::now();
        }
    }

    pub(super) fn get_entry(&self, space_id: &str, key: &str) -> Option<Value> {
        self.state
            .entries
            .get(space_id)?
            .get(key)
            .filter(|row| !row.deleted)
            .map(|row| row.value.clone())
    }

    pub(super) fn put_entry(&mut self, space_id: &str, key: &str, value: Value, version: Version) {
        self.wrote = true;
        self.state
            .entries
            .entry(space_id.to_string())
            .or_default()
            .insert(
                key.to_string(),
                EntryRow {
                    value,
                    deleted: false,
                    version,
                },
            );
    }

    pub(super) fn del_entry(&mut self, space_id: &str, key: &str, version: Version) {
        let row = self
            .state
            .entries
            .get_mut(space_id)
            .and_then(|rows| rows.get_mut(key));
        if let Some(row) = row {
            self.wrote = true;
            row.deleted = true;
            row.version = version;
        }
    }

    pub(super) fn get_entries(&self, space_id: &str, from_key: &str, prefix: &str) -> Vec<(Key, Value)> {
        let Some(rows) = self.state.entries.get(space_id) else {
            return Vec::new();
        };
        let lower = from_key.max(prefix);
        rows.range::<str, _>((Bound::Included(lower), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, row)| !row.deleted)
            .map(|(key, row)| (key.clone(), row.value.clone()))
            .collect()
    }

    pub(super) fn get_changed_entries(&self, space_id: &str, since: Version) -> Vec<ChangedEntry> {
        let Some(rows) = self.state.entries.get(space_id) else {
            return Vec::new();
        };
        rows.iter()
            .filter(|(_, row)| row.version > since)
            .map(|(key, row)| ChangedEntry {
                key: key.clone(),
                value: row.value.clone(),
                deleted: row.deleted,
                version: row.version,
            })
            .collect()
    }

    pub(super) fn get_client(&self, client_id: &str) -> Option<ClientRecord> {
        self.state.clients.get(client_id).cloned()
    }

    pub(super) fn create_client(&mut self, client_id: &str, client_group_id: &str, version: Version) {
        self.wrote = true;
        self.state.clients.insert(
            client_id.to_string(),
            ClientRecord {
                id: client_id.to_string(),
                client_group_id: client_group_id.to_string(),
                last_mutation_id: 0,
                last_modified_version: version,
            },
        );
    }

    pub(super) fn update_client(&mut self, client_id: &str, last_mutation_id: MutationId, version: Version) {
        if let Some(client) = self.state.clients.get_mut(client_id) {
            self.wrote = true;
            client.last_mutation_id = last_mutation_id;
            client.last_modified_version = version;
        }
    }

    pub(super) fn get_client_group(&self, client_group_id: &str) -> Option<ClientGroupRecord> {
        self.state.groups.get(client_group_id).cloned()
    }

    pub(super) fn create_client_group(&mut self, client_group_id: &str, space_id: &str, user_id: &str) {
        self.wrote = true;
        self.state.groups.insert(
            client_group_id.to_string(),
            ClientGroupRecord {
                id: client_group_id.to_string(),
                space_id: space_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    pub(super) fn get_changed_last_mutation_ids(
        &self,
        client_group_id: &str,
        since: Version,
    ) -> BTreeMap<ClientId, MutationId> {
        self.state
            .clients
            .values()
            .filter(|c| c.client_group_id == client_group_id && c.last_modified_version > since)
            .map(|c| (c.id.clone(), c.last_mutation_id))
            .collect()
    }

    pub(super) fn commit(self) -> Result<(), StoreError> {
        if !self.wrote {
            return Ok(());
        }

        let mut shared = self.store.shared.lock();
        if shared.commits != self.base {
            tracing::debug!(
                base = self.base,
                current = shared.commits,
                "In-memory commit lost to a concurrent writer"
            );
            return Err(StoreError::Conflict);
        }

        shared.state = self.state;
        shared.commits += 1;
        Ok(())
    }
}
