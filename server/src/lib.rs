//! Stow Server - pull-based key-value sync over HTTP and WebSockets.
//!
//! Clients push named mutations, which the server re-runs against the
//! authoritative copy of a space, and pull incremental diffs keyed by a
//! version cookie. Pokes over WebSockets tell clients when to pull.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod mutators;
pub mod routes;
pub mod store;
pub mod transaction;
pub mod websocket;

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::mutators::MutatorRegistry;
use crate::store::Store;
use crate::websocket::PokeNotifier;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<Config>,
    pub notifier: Arc<PokeNotifier>,
    pub mutators: Arc<MutatorRegistry>,
}

impl AppState {
    pub fn new(store: Store, config: Config, mutators: MutatorRegistry) -> Self {
        Self {
            store,
            config: Arc::new(config),
            notifier: PokeNotifier::new_shared(),
            mutators: Arc::new(mutators),
        }
    }
}

/// Build the HTTP router with tracing, timeout and CORS layers.
pub fn build_router(state: AppState) -> Router {
    let timeout = state.config.request_timeout;

    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(timeout))
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
