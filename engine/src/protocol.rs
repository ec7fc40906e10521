//! Push/pull wire types.
//!
//! Field names follow the sync protocol's JSON casing (`clientGroupID`,
//! `lastMutationIDChanges`, ...), which does not match serde's camelCase for
//! the `ID` suffix, so those fields are renamed explicitly.

use crate::{ClientGroupId, ClientId, Error, Key, MutationId, Result, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One named, client-numbered operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    #[serde(rename = "clientID")]
    pub client_id: ClientId,
    pub id: MutationId,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    /// Client wall-clock time; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

impl Mutation {
    pub fn new(
        client_id: impl Into<ClientId>,
        id: MutationId,
        name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            id,
            name: name.into(),
            args,
            timestamp: None,
        }
    }
}

/// Request body for a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    #[serde(rename = "clientGroupID")]
    pub client_group_id: ClientGroupId,
    pub mutations: Vec<Mutation>,
}

impl PushRequest {
    /// Check the request shape before any storage is touched.
    ///
    /// `is_known` answers whether a mutator name is registered.
    pub fn validate(&self, is_known: impl Fn(&str) -> bool) -> Result<()> {
        if self.client_group_id.is_empty() {
            return Err(Error::MissingClientGroup);
        }
        for mutation in &self.mutations {
            if mutation.client_id.is_empty() {
                return Err(Error::MissingClientId { id: mutation.id });
            }
            if mutation.id < 1 {
                return Err(Error::InvalidMutationId(mutation.id));
            }
            if !is_known(&mutation.name) {
                return Err(Error::UnknownMutator(mutation.name.clone()));
            }
        }
        Ok(())
    }
}

/// Push failures the client must act on, reported with a 200 status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PushErrorKind {
    /// The server has no record of the state the client assumes; the client
    /// should drop its local state instead of retrying.
    ClientStateNotFound,
}

/// Response body for a push: `{}` on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PushErrorKind>,
}

impl PushResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn client_state_not_found() -> Self {
        Self {
            error: Some(PushErrorKind::ClientStateNotFound),
        }
    }
}

/// Request body for a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    #[serde(rename = "clientGroupID")]
    pub client_group_id: ClientGroupId,
    /// Version the client last saw; `None` asks for a full snapshot.
    #[serde(default)]
    pub cookie: Option<Version>,
}

impl PullRequest {
    pub fn validate(&self) -> Result<()> {
        if self.client_group_id.is_empty() {
            return Err(Error::MissingClientGroup);
        }
        match self.cookie {
            Some(cookie) if cookie < 0 => Err(Error::InvalidCookie(cookie)),
            _ => Ok(()),
        }
    }

    /// The version to diff from: "the beginning of time" for no cookie.
    pub fn since(&self) -> Version {
        self.cookie.unwrap_or(0)
    }
}

/// A single patch instruction for the client's local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    Put { key: Key, value: Value },
    Del { key: Key },
    /// Drop everything held locally before applying the rest of the patch.
    Clear,
}

/// Response body for a pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullResponse {
    pub cookie: Version,
    #[serde(rename = "lastMutationIDChanges")]
    pub last_mutation_id_changes: BTreeMap<ClientId, MutationId>,
    pub patch: Vec<PatchOp>,
}
