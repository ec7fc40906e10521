//! Sync endpoint routes.

use axum::{
    extract::{rejection::JsonRejection, Path, State, WebSocketUpgrade},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use stow_engine::{PullRequest, PullResponse, PushRequest, PushResponse};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{get_space, handle_pull, handle_push, handle_websocket_connection};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/spaces/{space_id}/push", post(push_handler))
        .route("/spaces/{space_id}/pull", post(pull_handler))
        .route("/spaces/{space_id}/poke", get(poke_handler))
}

/// POST /spaces/{space_id}/push - Apply client mutations.
async fn push_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(space_id): Path<String>,
    payload: std::result::Result<Json<PushRequest>, JsonRejection>,
) -> Result<Json<PushResponse>> {
    let Json(request) = payload?;
    let response = handle_push(&state, &space_id, &auth.principal, request).await?;
    Ok(Json(response))
}

/// POST /spaces/{space_id}/pull - Fetch changes since a cookie.
async fn pull_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(space_id): Path<String>,
    payload: std::result::Result<Json<PullRequest>, JsonRejection>,
) -> Result<Json<PullResponse>> {
    let Json(request) = payload?;
    let response = handle_pull(&state, &space_id, &auth.principal, request).await?;
    Ok(Json(response))
}

/// GET /spaces/{space_id}/poke - Upgrade to a poke WebSocket.
async fn poke_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(space_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    get_space(&state, &space_id).await?;
    Ok(ws.on_upgrade(move |socket| {
        handle_websocket_connection(socket, state, space_id, auth.principal)
    }))
}
