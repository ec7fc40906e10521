//! Pending-change overlay for a single push.
//!
//! The overlay caches every key a push has read or written. Reads from the
//! backing store are cached clean; writes are dirty and become the set of
//! changes flushed at commit. Keys are kept in a `BTreeMap` so that the dirty
//! subset can be fed to [`crate::merge::MergeIter`] without re-sorting.

use crate::merge::PendingValue;
use crate::Key;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq)]
struct Slot {
    value: PendingValue,
    dirty: bool,
}

/// Result of looking a key up in the overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// The overlay knows nothing about the key; the store must be consulted.
    Miss,
    /// The key is live with this value.
    Live(&'a Value),
    /// The key is known to be absent (deleted in this push, or read as absent).
    Absent,
}

/// A dirty overlay entry ready to be written to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

impl Change {
    /// The key this change targets.
    pub fn key(&self) -> &str {
        match self {
            Change::Put { key, .. } | Change::Delete { key } => key,
        }
    }
}

/// Position in the overlay's undo log, restored when a mutator fails part-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Ordered read/write cache scoped to one push.
#[derive(Debug, Clone, Default)]
pub struct Overlay {
    slots: BTreeMap<Key, Slot>,
    /// Prior slot of every key replaced, newest last.
    undo: Vec<(Key, Option<Slot>)>,
}

impl Overlay {
    /// Create an empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a key up without touching the store.
    pub fn lookup(&self, key: &str) -> Lookup<'_> {
        match self.slots.get(key) {
            None => Lookup::Miss,
            Some(Slot {
                value: Some(value), ..
            }) => Lookup::Live(value),
            Some(Slot { value: None, .. }) => Lookup::Absent,
        }
    }

    /// Record a value read from the store. Never overwrites an existing slot.
    pub fn cache_clean(&mut self, key: impl Into<Key>, value: Option<Value>) {
        let key = key.into();
        if !self.slots.contains_key(&key) {
            self.set(key, Slot { value, dirty: false });
        }
    }

    /// Buffer a put.
    pub fn put(&mut self, key: impl Into<Key>, value: Value) {
        self.set(
            key.into(),
            Slot {
                value: Some(value),
                dirty: true,
            },
        );
    }

    /// Buffer a delete (tombstone).
    pub fn delete(&mut self, key: impl Into<Key>) {
        self.set(
            key.into(),
            Slot {
                value: None,
                dirty: true,
            },
        );
    }

    fn set(&mut self, key: Key, slot: Slot) {
        let previous = self.slots.insert(key.clone(), slot);
        self.undo.push((key, previous));
    }

    /// Number of dirty entries.
    pub fn dirty_count(&self) -> usize {
        self.slots.values().filter(|s| s.dirty).count()
    }

    /// Whether any write has been buffered.
    pub fn is_dirty(&self) -> bool {
        self.slots.values().any(|s| s.dirty)
    }

    /// Dirty entries with key >= `start`, ascending, cloned for merging.
    pub fn pending_from<'a>(
        &'a self,
        start: &str,
    ) -> impl Iterator<Item = (Key, PendingValue)> + 'a {
        self.slots
            .range::<str, _>((Bound::Included(start), Bound::Unbounded))
            .filter(|(_, slot)| slot.dirty)
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
    }

    /// Mark the current state of the undo log.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.undo.len())
    }

    /// Undo every change made since [`Overlay::checkpoint`] returned `checkpoint`.
    ///
    /// Only the keys touched since the checkpoint are visited.
    pub fn restore(&mut self, checkpoint: Checkpoint) {
        while self.undo.len() > checkpoint.0 {
            let Some((key, previous)) = self.undo.pop() else {
                break;
            };
            match previous {
                Some(slot) => {
                    self.slots.insert(key, slot);
                }
                None => {
                    self.slots.remove(&key);
                }
            }
        }
    }

    /// Consume the overlay, returning the dirty entries in key order.
    pub fn into_changes(self) -> Vec<Change> {
        self.slots
            .into_iter()
            .filter(|(_, slot)| slot.dirty)
            .map(|(key, slot)| match slot.value {
                Some(value) => Change::Put { key, value },
                None => Change::Delete { key },
            })
            .collect()
    }
}
