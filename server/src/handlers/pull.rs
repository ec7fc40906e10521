//! Pull handler: the diff between a client's cookie and the current version.

use stow_engine::{build_patch, reset_patch, PullRequest, PullResponse};

use crate::auth::authorize_client_group;
use crate::error::{AppError, Result};
use crate::store::with_retry;
use crate::AppState;

/// Compute a pull response in one read-only transaction.
pub async fn handle_pull(
    state: &AppState,
    space_id: &str,
    principal: &str,
    request: PullRequest,
) -> Result<PullResponse> {
    request.validate()?;

    with_retry(state.config.max_tx_attempts, "pull", |attempt| {
        pull_attempt(state, space_id, principal, &request, attempt)
    })
    .await
}

async fn pull_attempt(
    state: &AppState,
    space_id: &str,
    principal: &str,
    request: &PullRequest,
    attempt: u32,
) -> Result<PullResponse> {
    let group_id = request.client_group_id.as_str();
    let mut tx = state.store.begin_read_only().await?;

    let version = tx
        .get_version(space_id)
        .await?
        .ok_or_else(|| AppError::UnknownSpace(space_id.to_string()))?;

    authorize_client_group(&mut tx, space_id, principal, group_id, false).await?;

    let since = request.since();
    let (patch, last_mutation_id_changes) = if since > version {
        // The client saw a version this server never reached.
        tracing::warn!(space_id, cookie = since, version, "Cookie ahead of server, resetting client");
        let entries = tx.get_changed_entries(space_id, 0).await?;
        let changes = tx.get_changed_last_mutation_ids(group_id, 0).await?;
        (reset_patch(entries), changes)
    } else {
        let entries = tx.get_changed_entries(space_id, since).await?;
        let changes = tx.get_changed_last_mutation_ids(group_id, since).await?;
        (build_patch(entries), changes)
    };

    tx.commit().await?;

    tracing::debug!(
        space_id,
        client_group_id = group_id,
        cookie = since,
        version,
        ops = patch.len(),
        attempt,
        "Pull served"
    );

    Ok(PullResponse {
        cookie: version,
        last_mutation_id_changes,
        patch,
    })
}
