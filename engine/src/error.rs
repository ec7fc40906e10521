//! Error types for the Stow engine.

use crate::{MutationId, Version};
use thiserror::Error;

/// Validation errors raised before a request touches any storage.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("clientGroupID must not be empty")]
    MissingClientGroup,

    #[error("mutation {id} has an empty clientID")]
    MissingClientId { id: MutationId },

    #[error("invalid mutation id {0}: ids start at 1")]
    InvalidMutationId(MutationId),

    #[error("unknown mutator: {0}")]
    UnknownMutator(String),

    #[error("invalid cookie: {0}")]
    InvalidCookie(Version),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
