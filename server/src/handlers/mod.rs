//! Request handlers for spaces, push, pull and pokes.
//!
//! Handlers take the shared [`crate::AppState`] by reference so that the
//! HTTP routes and the WebSocket transport run the same code.

mod pull;
mod push;
mod spaces;
mod websocket;

pub use pull::*;
pub use push::*;
pub use spaces::*;
pub use websocket::*;
