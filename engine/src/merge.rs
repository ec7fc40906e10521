//! Ordered merge of persisted entries with pending, uncommitted changes.
//!
//! # Algorithm
//!
//! Both inputs are sorted ascending by key and hold each key at most once.
//! The merge keeps one lookahead element per input and at each step:
//!
//! 1. Emits the source element when its key is smaller (or pending is done)
//! 2. Emits the pending element when its key is smaller (or source is done)
//! 3. On equal keys drops the source element and emits the pending one
//!
//! Pending tombstones are never emitted; they only shadow the source. The
//! output is strictly ascending with unique keys, produced in a single
//! O(n + m) pass.

use crate::Key;
use serde_json::Value;
use std::cmp::Ordering;
use std::iter::Peekable;

/// A pending change: `Some(value)` for a put, `None` for a tombstone.
pub type PendingValue = Option<Value>;

/// Forward-only merge of a persisted stream and a pending-change stream.
pub struct MergeIter<S, P>
where
    S: Iterator<Item = (Key, Value)>,
    P: Iterator<Item = (Key, PendingValue)>,
{
    source: Peekable<S>,
    pending: Peekable<P>,
}

impl<S, P> MergeIter<S, P>
where
    S: Iterator<Item = (Key, Value)>,
    P: Iterator<Item = (Key, PendingValue)>,
{
    /// Create a merge over two ascending, unique-keyed inputs.
    pub fn new(source: S, pending: P) -> Self {
        Self {
            source: source.peekable(),
            pending: pending.peekable(),
        }
    }
}

impl<S, P> Iterator for MergeIter<S, P>
where
    S: Iterator<Item = (Key, Value)>,
    P: Iterator<Item = (Key, PendingValue)>,
{
    type Item = (Key, Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let ordering = match (self.source.peek(), self.pending.peek()) {
                (None, None) => return None,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some((source_key, _)), Some((pending_key, _))) => source_key.cmp(pending_key),
            };

            let pending = match ordering {
                Ordering::Less => return self.source.next(),
                Ordering::Greater => self.pending.next(),
                Ordering::Equal => {
                    self.source.next();
                    self.pending.next()
                }
            };

            // Tombstones only suppress; keep going until something live shows up.
            if let Some((key, Some(value))) = pending {
                return Some((key, value));
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (_, source_max) = self.source.size_hint();
        let (_, pending_max) = self.pending.size_hint();
        let upper = match (source_max, pending_max) {
            (Some(a), Some(b)) => a.checked_add(b),
            _ => None,
        };
        (0, upper)
    }
}

/// Merge persisted entries with pending changes, yielding live pairs only.
pub fn merge_pending_changes<S, P>(source: S, pending: P) -> MergeIter<S::IntoIter, P::IntoIter>
where
    S: IntoIterator<Item = (Key, Value)>,
    P: IntoIterator<Item = (Key, PendingValue)>,
{
    MergeIter::new(source.into_iter(), pending.into_iter())
}
