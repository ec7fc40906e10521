//! Subscriber registry for pokes.
//!
//! Delivery is best-effort: a subscriber whose channel is closed is skipped
//! and cleaned up when its socket task unsubscribes.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::ServerMessage;

/// Sender half of a subscriber's outgoing message queue.
pub type PokeSender = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug)]
struct Subscriber {
    space_id: String,
    sender: PokeSender,
}

/// Tracks which connections listen to which space.
///
/// Thread-safe and shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct PokeNotifier {
    /// All subscribers, keyed by subscription ID.
    subscribers: DashMap<String, Subscriber>,
    /// Subscription IDs per space.
    by_space: DashMap<String, Vec<String>>,
}

impl PokeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Listen for pokes on `space_id`. Returns the subscription ID.
    pub fn subscribe(&self, space_id: &str, sender: PokeSender) -> String {
        let id = uuid::Uuid::new_v4().to_string();

        self.subscribers.insert(
            id.clone(),
            Subscriber {
                space_id: space_id.to_string(),
                sender,
            },
        );
        self.by_space
            .entry(space_id.to_string())
            .or_default()
            .push(id.clone());

        tracing::info!(subscription_id = %id, space_id, "Poke subscriber registered");
        id
    }

    pub fn unsubscribe(&self, id: &str) {
        if let Some((_, subscriber)) = self.subscribers.remove(id) {
            if let Some(mut ids) = self.by_space.get_mut(&subscriber.space_id) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    drop(ids);
                    self.by_space.remove(&subscriber.space_id);
                }
            }

            tracing::info!(subscription_id = %id, space_id = %subscriber.space_id, "Poke subscriber removed");
        }
    }

    /// Poke every subscriber of `space_id`. Returns how many were reached.
    pub fn notify(&self, space_id: &str) -> usize {
        self.poke(space_id, None)
    }

    /// Poke every subscriber of `space_id` except `except_id`.
    pub fn notify_except(&self, space_id: &str, except_id: &str) -> usize {
        self.poke(space_id, Some(except_id))
    }

    /// Queue a message for one subscriber.
    pub fn send_to(&self, id: &str, message: ServerMessage) -> bool {
        self.subscribers
            .get(id)
            .map(|subscriber| subscriber.sender.send(message).is_ok())
            .unwrap_or(false)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn poke(&self, space_id: &str, except_id: Option<&str>) -> usize {
        let Some(ids) = self.by_space.get(space_id).map(|ids| ids.value().clone()) else {
            return 0;
        };

        let mut sent = 0;
        for id in ids.iter().filter(|id| Some(id.as_str()) != except_id) {
            if self.send_to(id, ServerMessage::Poke) {
                sent += 1;
            }
        }

        tracing::debug!(space_id, recipients = sent, "Poked subscribers");
        sent
    }
}
