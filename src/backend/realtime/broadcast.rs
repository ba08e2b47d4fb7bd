/**
 * Per-Document Op Broadcasting
 *
 * Committed operations are fanned out to every subscriber of their
 * document through one `tokio::sync::broadcast` channel per `(collection,
 * id)`. Channels are created on first subscribe and removed by the periodic
 * cleanup once nobody listens.
 *
 * # Ordering
 *
 * The backend publishes while still holding the document's commit lock, so
 * every channel carries ops in commit order. A subscriber that falls behind
 * the channel capacity sees `RecvError::Lagged` and refills the gap from the
 * store.
 */

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::shared::document::{CommittedOp, DocKey};

/// Event carried by a document channel
pub type OpEvent = Arc<CommittedOp>;

/// Default per-document channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Registry of per-document broadcast channels
#[derive(Clone)]
pub struct PubSub {
    channels: Arc<Mutex<HashMap<DocKey, broadcast::Sender<OpEvent>>>>,
    capacity: usize,
}

impl PubSub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Get or create the channel of a document and subscribe to it
    pub fn subscribe(&self, key: &DocKey) -> broadcast::Receiver<OpEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Send a committed op to every subscriber of its document
    ///
    /// Returns the number of receivers reached (0 without subscribers).
    pub fn publish(&self, key: &DocKey, op: OpEvent) -> usize {
        let version = op.version;
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        match channels.get(key) {
            Some(sender) => match sender.send(op) {
                Ok(count) => {
                    tracing::debug!("Published {} v{} to {} subscribers", key, version, count);
                    count
                }
                Err(_) => 0,
            },
            None => 0,
        }
    }

    /// Drop channels without subscribers; returns how many were removed
    pub fn cleanup_inactive_channels(&self) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub fn get_subscriber_count(&self, key: &DocKey) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for PubSub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
