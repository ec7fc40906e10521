//! Per-client mutation cursor.
//!
//! Every client numbers its mutations 1, 2, 3, ... The server remembers the
//! last id it applied for each client and uses it to decide, for each incoming
//! mutation, whether to skip it (replay), apply it, or stop (the client is
//! ahead of what the server knows about).

use crate::MutationId;

/// What to do with one incoming mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Already applied on a previous push; skip without running the mutator.
    AlreadyApplied,
    /// The next mutation in sequence; run it.
    Apply,
    /// Ahead of the server's cursor. The client's assumption about server
    /// state no longer holds.
    FromFuture { expected: MutationId },
}

/// Mutation cursor for one client.
///
/// A client the server has never seen starts at zero, so only id 1 can be
/// applied for it: lazy creation and discontinuity detection share one rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientCursor {
    last_mutation_id: MutationId,
}

impl ClientCursor {
    /// Cursor positioned after `last_mutation_id`.
    pub fn new(last_mutation_id: MutationId) -> Self {
        Self { last_mutation_id }
    }

    /// The last applied mutation id.
    pub fn last_mutation_id(&self) -> MutationId {
        self.last_mutation_id
    }

    /// The id that must come next.
    pub fn expected(&self) -> MutationId {
        self.last_mutation_id + 1
    }

    /// Classify an incoming mutation id.
    pub fn classify(&self, id: MutationId) -> Disposition {
        let expected = self.expected();
        match id.cmp(&expected) {
            std::cmp::Ordering::Less => Disposition::AlreadyApplied,
            std::cmp::Ordering::Equal => Disposition::Apply,
            std::cmp::Ordering::Greater => Disposition::FromFuture { expected },
        }
    }

    /// Mark the expected mutation as applied.
    pub fn advance(&mut self) {
        self.last_mutation_id += 1;
    }
}
