//! Unified error handling for the server.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use stow_engine::PushResponse;

use crate::store::StoreError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid request: {0}")]
    Engine(#[from] stow_engine::Error),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// The principal does not own the client group, or a client claims a
    /// group it does not belong to.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A mutation id ran ahead of the server's cursor for its client.
    #[error("Client state not found")]
    ClientStateNotFound,

    #[error("Unknown space: {0}")]
    UnknownSpace(String),

    #[error("Space already exists: {0}")]
    SpaceExists(String),

    #[error("Transaction failed after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl AppError {
    /// Whether rerunning the whole transaction may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Store(e) if e.is_transient())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match &self {
            // Reported in-band so the client resets instead of retrying.
            AppError::ClientStateNotFound => {
                return (StatusCode::OK, Json(PushResponse::client_state_not_found()))
                    .into_response();
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                    None,
                )
            }
            AppError::Engine(e) => {
                tracing::warn!("Rejected request: {}", e);
                (StatusCode::BAD_REQUEST, e.to_string(), None)
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Unauthorized(reason) => {
                tracing::warn!("Unauthorized: {}", reason);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None)
            }
            AppError::UnknownSpace(id) => (
                StatusCode::NOT_FOUND,
                format!("Unknown space: {}", id),
                None,
            ),
            AppError::SpaceExists(id) => (
                StatusCode::CONFLICT,
                format!("Space already exists: {}", id),
                None,
            ),
            AppError::RetriesExhausted { attempts } => {
                tracing::error!(attempts, "Giving up on transaction");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    Some(self.to_string()),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
