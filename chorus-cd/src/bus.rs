//! In-process broadcast bus behind the notification channel
//!
//! One-to-many and lossy by design: publishing with no subscribers, or past
//! a subscriber that has lagged out of the buffer, silently drops the
//! notification. A subscriber that misses one catches up through its own
//! next `get song` query, not through redelivery.

use tokio::sync::broadcast;

/// Topic fan-out over `tokio::sync::broadcast`.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<String>,
}

impl BroadcastBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a topic to whoever is currently listening. Send errors mean
    /// "no subscribers" and are ignored.
    pub fn publish(&self, topic: &str) {
        let _ = self.tx.send(topic.to_string());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new(16)
    }
}
