//! Space management routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{create_space, get_space, CreateSpaceRequest, CreateSpaceResponse, SpaceInfo};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/spaces", post(create_space_handler))
        .route("/spaces/{space_id}", get(get_space_handler))
}

/// POST /spaces - Create a space, optionally with a chosen ID.
async fn create_space_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    request: Option<Json<CreateSpaceRequest>>,
) -> Result<(StatusCode, Json<CreateSpaceResponse>)> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let response = create_space(&state, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /spaces/{space_id} - Current version of a space.
async fn get_space_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(space_id): Path<String>,
) -> Result<Json<SpaceInfo>> {
    Ok(Json(get_space(&state, &space_id).await?))
}
