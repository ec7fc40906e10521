//! Turning changed entry rows into pull patches.

use crate::protocol::PatchOp;
use crate::{Key, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An entry row whose version is newer than the client's cookie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedEntry {
    pub key: Key,
    pub value: Value,
    pub deleted: bool,
    pub version: Version,
}

impl ChangedEntry {
    fn into_op(self) -> PatchOp {
        if self.deleted {
            PatchOp::Del { key: self.key }
        } else {
            PatchOp::Put {
                key: self.key,
                value: self.value,
            }
        }
    }
}

/// One `put` per live change and one `del` per tombstone, in input order.
pub fn build_patch(changed: impl IntoIterator<Item = ChangedEntry>) -> Vec<PatchOp> {
    changed.into_iter().map(ChangedEntry::into_op).collect()
}

/// A patch that replaces the client's state wholesale: `clear` followed by a
/// `put` for every live entry. Tombstones carry no information after a clear.
pub fn reset_patch(entries: impl IntoIterator<Item = ChangedEntry>) -> Vec<PatchOp> {
    std::iter::once(PatchOp::Clear)
        .chain(
            entries
                .into_iter()
                .filter(|e| !e.deleted)
                .map(ChangedEntry::into_op),
        )
        .collect()
}
