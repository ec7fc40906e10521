//! Push handler: re-runs client mutations against the authoritative state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use stow_engine::{ClientCursor, ClientId, Disposition, MutationId, PushRequest, PushResponse};

use crate::auth::authorize_client_group;
use crate::error::{AppError, Result};
use crate::mutators::MutatorError;
use crate::store::{with_retry, StoreTx};
use crate::transaction::TransactionCache;
use crate::AppState;

/// What one committed push did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Mutations whose mutator ran (successfully or not) in this push.
    pub applied: usize,
    /// Set when a mutation id ran ahead of its client's cursor.
    pub gap: Option<Gap>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub client_id: ClientId,
    pub expected: MutationId,
    pub received: MutationId,
}

impl PushOutcome {
    /// The response body the client gets.
    pub fn into_response(self) -> Result<PushResponse> {
        match self.gap {
            Some(_) => Err(AppError::ClientStateNotFound),
            None => Ok(PushResponse::ok()),
        }
    }
}

#[derive(Debug)]
struct ClientState {
    cursor: ClientCursor,
    is_new: bool,
    advanced: bool,
}

/// Validate and apply a push, retrying the whole transaction on conflicts.
///
/// Does not poke; callers decide who to notify.
pub async fn process_push(
    state: &AppState,
    space_id: &str,
    principal: &str,
    request: &PushRequest,
) -> Result<PushOutcome> {
    request.validate(|name| state.mutators.contains(name))?;

    with_retry(state.config.max_tx_attempts, "push", |attempt| {
        push_attempt(state, space_id, principal, request, attempt)
    })
    .await
}

/// Apply a push and poke every subscriber of the space if anything changed.
pub async fn handle_push(
    state: &AppState,
    space_id: &str,
    principal: &str,
    request: PushRequest,
) -> Result<PushResponse> {
    let outcome = process_push(state, space_id, principal, &request).await?;
    if outcome.applied > 0 {
        state.notifier.notify(space_id);
    }
    outcome.into_response()
}

async fn push_attempt(
    state: &AppState,
    space_id: &str,
    principal: &str,
    request: &PushRequest,
    attempt: u32,
) -> Result<PushOutcome> {
    let group_id = request.client_group_id.as_str();
    tracing::debug!(
        space_id,
        client_group_id = group_id,
        mutations = request.mutations.len(),
        attempt,
        "Processing push"
    );

    let mut tx = state.store.begin().await?;

    let version = tx
        .get_version(space_id)
        .await?
        .ok_or_else(|| AppError::UnknownSpace(space_id.to_string()))?;
    let next_version = version + 1;

    authorize_client_group(&mut tx, space_id, principal, group_id, true).await?;

    let mut clients: HashMap<ClientId, ClientState> = HashMap::new();
    let mut cache = TransactionCache::new(&mut tx, space_id);
    let mut outcome = PushOutcome::default();

    for mutation in &request.mutations {
        let client = match clients.entry(mutation.client_id.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let loaded = load_client(cache.store(), &mutation.client_id, group_id).await?;
                entry.insert(loaded)
            }
        };

        match client.cursor.classify(mutation.id) {
            Disposition::AlreadyApplied => {
                tracing::debug!(
                    client_id = %mutation.client_id,
                    mutation_id = mutation.id,
                    "Mutation already applied, skipping"
                );
            }
            Disposition::FromFuture { expected } => {
                tracing::warn!(
                    client_id = %mutation.client_id,
                    mutation_id = mutation.id,
                    expected,
                    "Mutation from the future, stopping batch"
                );
                outcome.gap = Some(Gap {
                    client_id: mutation.client_id.clone(),
                    expected,
                    received: mutation.id,
                });
                break;
            }
            Disposition::Apply => {
                cache.set_client(mutation.client_id.as_str());
                let checkpoint = cache.checkpoint();

                let result = match state.mutators.get(&mutation.name) {
                    Some(mutator) => mutator.call(&mut cache, mutation.args.clone()).await,
                    None => Err(MutatorError::Failed(format!(
                        "unknown mutator {}",
                        mutation.name
                    ))),
                };

                match result {
                    Ok(()) => {
                        tracing::debug!(
                            client_id = %mutation.client_id,
                            mutation_id = mutation.id,
                            name = %mutation.name,
                            "Applied mutation"
                        );
                    }
                    Err(MutatorError::Store(e)) => return Err(e.into()),
                    Err(e) => {
                        // The mutation still counts as applied, as a no-op.
                        cache.rollback_to(checkpoint);
                        tracing::warn!(
                            client_id = %mutation.client_id,
                            mutation_id = mutation.id,
                            name = %mutation.name,
                            error = %e,
                            "Mutator failed"
                        );
                    }
                }

                client.cursor.advance();
                client.advanced = true;
                outcome.applied += 1;
            }
        }
    }

    if outcome.applied > 0 {
        cache.store().set_version(space_id, next_version).await?;
        cache.flush(next_version).await?;

        for (client_id, client) in clients.iter().filter(|(_, c)| c.advanced) {
            if client.is_new {
                tx.create_client(client_id, group_id, next_version).await?;
            }
            tx.update_client(client_id, client.cursor.last_mutation_id(), next_version)
                .await?;
        }
    }

    tx.commit().await?;

    tracing::info!(
        space_id,
        client_group_id = group_id,
        applied = outcome.applied,
        version = if outcome.applied > 0 { next_version } else { version },
        attempt,
        "Push committed"
    );
    Ok(outcome)
}

async fn load_client(tx: &mut StoreTx, client_id: &str, group_id: &str) -> Result<ClientState> {
    match tx.get_client(client_id).await? {
        Some(record) if record.client_group_id != group_id => Err(AppError::Unauthorized(format!(
            "client {} belongs to group {}, not {}",
            client_id, record.client_group_id, group_id
        ))),
        Some(record) => Ok(ClientState {
            cursor: ClientCursor::new(record.last_mutation_id),
            is_new: false,
            advanced: false,
        }),
        None => Ok(ClientState {
            cursor: ClientCursor::default(),
            is_new: true,
            advanced: false,
        }),
    }
}
