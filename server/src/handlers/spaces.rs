//! Space lifecycle: creation and inspection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stow_engine::{SpaceId, Version};

use crate::error::{AppError, Result};
use crate::store::with_retry;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSpaceRequest {
    /// Generated when absent.
    #[serde(rename = "spaceID", default)]
    pub space_id: Option<SpaceId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSpaceResponse {
    #[serde(rename = "spaceID")]
    pub space_id: SpaceId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceInfo {
    #[serde(rename = "spaceID")]
    pub space_id: SpaceId,
    pub version: Version,
    pub last_modified: DateTime<Utc>,
}

pub async fn create_space(state: &AppState, request: CreateSpaceRequest) -> Result<CreateSpaceResponse> {
    let space_id = match request.space_id {
        Some(id) if id.is_empty() => {
            return Err(AppError::BadRequest("spaceID must not be empty".to_string()))
        }
        Some(id) => id,
        None => uuid::Uuid::new_v4().to_string(),
    };

    let created = with_retry(state.config.max_tx_attempts, "create_space", |_| async {
        let mut tx = state.store.begin().await?;
        let created = tx.create_space(&space_id).await?;
        tx.commit().await?;
        Ok::<_, AppError>(created)
    })
    .await?;

    if !created {
        return Err(AppError::SpaceExists(space_id));
    }

    tracing::info!(space_id = %space_id, "Created space");
    Ok(CreateSpaceResponse { space_id })
}

pub async fn get_space(state: &AppState, space_id: &str) -> Result<SpaceInfo> {
    let mut tx = state.store.begin_read_only().await?;
    let space = tx
        .get_space(space_id)
        .await?
        .ok_or_else(|| AppError::UnknownSpace(space_id.to_string()))?;
    tx.commit().await?;

    Ok(SpaceInfo {
        space_id: space.id,
        version: space.version,
        last_modified: space.last_modified,
    })
}
