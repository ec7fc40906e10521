//! Liveness probe and a plain-text banner.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Which storage backend the server is running on.
    pub store: &'static str,
    /// Open poke sockets across all spaces.
    pub subscribers: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(|| async { "Stow Sync Server" }))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend(),
        subscribers: state.notifier.subscriber_count(),
    })
}
