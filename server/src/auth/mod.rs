//! Principal extraction and client group ownership checks.

mod middleware;

pub use middleware::{AuthUser, ANONYMOUS};

use crate::error::{AppError, Result};
use crate::store::StoreTx;

/// Check that `principal` may act on `client_group_id` within `space_id`.
///
/// An unknown group is created owned by `principal` when `create` is set
/// (pushes) and otherwise accepted as empty (pulls).
pub async fn authorize_client_group(
    tx: &mut StoreTx,
    space_id: &str,
    principal: &str,
    client_group_id: &str,
    create: bool,
) -> Result<()> {
    match tx.get_client_group(client_group_id).await? {
        Some(group) if group.space_id != space_id => Err(AppError::Unauthorized(format!(
            "client group {} belongs to another space",
            client_group_id
        ))),
        Some(group) if group.user_id != principal => Err(AppError::Unauthorized(format!(
            "client group {} is not owned by {}",
            client_group_id, principal
        ))),
        Some(_) => Ok(()),
        None if create => {
            tx.create_client_group(client_group_id, space_id, principal)
                .await?;
            tracing::debug!(
                client_group_id,
                space_id,
                principal,
                "Created client group"
            );
            Ok(())
        }
        None => Ok(()),
    }
}
