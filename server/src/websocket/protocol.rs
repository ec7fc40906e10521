//! WebSocket message protocol definitions.
//!
//! Messages are JSON objects tagged with a snake_case `type`. Push and pull
//! payloads reuse the HTTP body field names.

use serde::{Deserialize, Serialize};
use stow_engine::{Mutation, PullResponse, PushResponse, Version};

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Pull {
        #[serde(rename = "clientGroupID")]
        client_group_id: String,
        #[serde(default)]
        cookie: Option<Version>,
        /// Request ID for correlating responses
        #[serde(default)]
        request_id: Option<String>,
    },

    Push {
        #[serde(rename = "clientGroupID")]
        client_group_id: String,
        mutations: Vec<Mutation>,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    PullResponse {
        #[serde(flatten)]
        response: PullResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    PushResponse {
        #[serde(flatten)]
        response: PushResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Something in the subscribed space changed; pull to see it.
    Poke,

    Pong,

    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }
}
