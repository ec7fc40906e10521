//! # Stow Engine
//!
//! The pure core of the Stow sync server.
//!
//! Clients write optimistically against a local copy of a key-value space and
//! later push named mutations to the server, which re-runs them against the
//! authoritative copy. Clients then pull an incremental diff since the last
//! version they saw. This crate holds the parts of that cycle that need no IO:
//!
//! - [`merge`]: ordered merge of persisted entries with pending changes
//! - [`overlay`]: the per-push write buffer that feeds the merge
//! - [`cursor`]: per-client mutation cursors (skip, apply or stop)
//! - [`diff`]: changed rows to patch operations
//! - [`protocol`]: push/pull request and response bodies
//!
//! ## Design Principles
//!
//! - **No IO**: storage, transport and transactions live in the server crate
//! - **Deterministic**: same inputs, same outputs
//! - **Byte-ordered keys**: keys compare as Rust `String`s do, which the
//!   server's storage is configured to match
//!
//! ## Quick Start
//!
//! ```rust
//! use stow_engine::{merge_pending_changes, Overlay};
//! use serde_json::json;
//!
//! let persisted = vec![("a".to_string(), json!(1)), ("c".to_string(), json!(3))];
//!
//! let mut overlay = Overlay::new();
//! overlay.put("b", json!(2));
//! overlay.delete("c");
//!
//! let merged: Vec<_> = merge_pending_changes(persisted, overlay.pending_from("")).collect();
//! assert_eq!(
//!     merged,
//!     vec![("a".to_string(), json!(1)), ("b".to_string(), json!(2))]
//! );
//! ```

pub mod cursor;
pub mod diff;
pub mod error;
pub mod merge;
pub mod overlay;
pub mod protocol;

// Re-export main types at crate root
pub use cursor::{ClientCursor, Disposition};
pub use diff::{build_patch, reset_patch, ChangedEntry};
pub use error::{Error, Result};
pub use merge::{merge_pending_changes, MergeIter, PendingValue};
pub use overlay::{Change, Checkpoint, Lookup, Overlay};
pub use protocol::{
    Mutation, PatchOp, PullRequest, PullResponse, PushErrorKind, PushRequest, PushResponse,
};

/// Type aliases for clarity
pub type SpaceId = String;
pub type ClientGroupId = String;
pub type ClientId = String;
pub type Key = String;
pub type Version = i64;
pub type MutationId = i64;
