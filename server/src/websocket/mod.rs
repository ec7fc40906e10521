//! Poke delivery over WebSockets.
//!
//! Clients subscribe to a space and receive a content-free `poke` whenever a
//! push to that space commits, telling them to pull. The same socket also
//! carries push and pull messages for clients that prefer one connection.

mod notifier;
mod protocol;

pub use notifier::{PokeNotifier, PokeSender};
pub use protocol::*;
