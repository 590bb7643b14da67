//! The live-WebSocket subscriber map (spec.md §4.4 Concurrency, §9 redesign
//! flags).
//!
//! Modeled as `address -> (transport, generation)` per the redesign
//! guidance: a resubscribe to an address already held replaces the prior
//! transport and bumps its generation, so a stale `on_close` callback from
//! the replaced socket can check its captured generation and no-op instead
//! of evicting the new subscriber.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::envelope::MessageEnvelope;

/// One frame pushed out over a subscriber's WebSocket. `type` distinguishes
/// the four server-originated message kinds (spec.md §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Acknowledges a successful subscribe.
    Subscribed {
        /// The address the connection subscribed as.
        address: String,
    },
    /// A delivered message, pushed live or replayed from the pending queue.
    Message {
        /// The envelope being delivered.
        envelope: MessageEnvelope,
    },
    /// Informs the sender that their message reached an online recipient.
    DeliveryReceipt {
        /// The delivered message's id.
        #[serde(rename = "messageId")]
        message_id: String,
        /// Milliseconds since epoch the delivery occurred.
        timestamp: u64,
    },
    /// Informs the sender (or the addressee's other sessions) that a
    /// message was marked read.
    ReadReceipt {
        /// The message that was marked read.
        #[serde(rename = "messageId")]
        message_id: String,
        /// Milliseconds since epoch the read occurred.
        timestamp: u64,
    },
    /// A rejection, sent in place of a normal response.
    Error {
        /// Human-readable explanation.
        message: String,
    },
}

struct Entry {
    generation: u64,
    sender: mpsc::UnboundedSender<ServerFrame>,
}

/// Tracks at most one live subscriber per address and fans messages out to
/// it. Cheap to clone (internally `Arc`-free; callers share a single
/// instance behind an `Arc`).
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<String, Entry>>,
    next_generation: AtomicU64,
    max_subscribers: usize,
}

impl SubscriberRegistry {
    /// Creates an empty registry accepting up to `max_subscribers`
    /// concurrent connections.
    #[must_use]
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            max_subscribers,
        }
    }

    /// Current subscriber count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    /// True if no subscriber is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if accepting another subscriber would exceed the configured
    /// ceiling. A resubscribe to an address already held never counts
    /// against this, since it replaces rather than adds.
    #[must_use]
    pub fn at_capacity(&self, address: &str) -> bool {
        let subs = self.subscribers.read();
        !subs.contains_key(address) && subs.len() >= self.max_subscribers
    }

    /// Registers `address` as subscribed via `sender`, replacing whatever
    /// was previously subscribed at that address. Returns the generation
    /// the caller must present to [`Self::unsubscribe`].
    pub fn subscribe(&self, address: &str, sender: mpsc::UnboundedSender<ServerFrame>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(address.to_string(), Entry { generation, sender });
        generation
    }

    /// Removes `address`'s subscriber, but only if it's still the one
    /// tagged with `generation`. A stale close callback from a socket that
    /// was already replaced by a newer subscribe is a no-op.
    pub fn unsubscribe(&self, address: &str, generation: u64) {
        let mut subs = self.subscribers.write();
        if subs.get(address).is_some_and(|entry| entry.generation == generation) {
            subs.remove(address);
        }
    }

    /// True if `address` currently has a live subscriber.
    #[must_use]
    pub fn is_subscribed(&self, address: &str) -> bool {
        self.subscribers.read().contains_key(address)
    }

    /// Pushes `frame` to `address`'s subscriber, if any. Returns whether a
    /// subscriber was present to receive it; a closed channel (subscriber
    /// gone but not yet reaped) counts as absent.
    pub fn send(&self, address: &str, frame: ServerFrame) -> bool {
        let subs = self.subscribers.read();
        match subs.get(address) {
            Some(entry) => entry.sender.send(frame).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::UnboundedSender<ServerFrame>, mpsc::UnboundedReceiver<ServerFrame>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn resubscribe_replaces_and_bumps_generation() {
        let registry = SubscriberRegistry::new(10);
        let (tx1, _rx1) = channel();
        let gen1 = registry.subscribe("0xaaaa", tx1);

        let (tx2, _rx2) = channel();
        let gen2 = registry.subscribe("0xaaaa", tx2);
        assert_ne!(gen1, gen2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn stale_unsubscribe_is_noop() {
        let registry = SubscriberRegistry::new(10);
        let (tx1, _rx1) = channel();
        let gen1 = registry.subscribe("0xaaaa", tx1);

        let (tx2, _rx2) = channel();
        registry.subscribe("0xaaaa", tx2);

        registry.unsubscribe("0xaaaa", gen1);
        assert!(registry.is_subscribed("0xaaaa"));
    }

    #[test]
    fn fresh_unsubscribe_removes() {
        let registry = SubscriberRegistry::new(10);
        let (tx, _rx) = channel();
        let generation = registry.subscribe("0xaaaa", tx);
        registry.unsubscribe("0xaaaa", generation);
        assert!(!registry.is_subscribed("0xaaaa"));
    }

    #[test]
    fn send_to_absent_address_returns_false() {
        let registry = SubscriberRegistry::new(10);
        assert!(!registry.send("0xaaaa", ServerFrame::Error { message: "x".to_string() }));
    }

    #[test]
    fn send_delivers_to_live_subscriber() {
        let registry = SubscriberRegistry::new(10);
        let (tx, mut rx) = channel();
        registry.subscribe("0xaaaa", tx);
        assert!(registry.send("0xaaaa", ServerFrame::Subscribed { address: "0xaaaa".to_string() }));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn capacity_check_allows_resubscribe_of_existing_address() {
        let registry = SubscriberRegistry::new(1);
        let (tx1, _rx1) = channel();
        registry.subscribe("0xaaaa", tx1);
        assert!(!registry.at_capacity("0xaaaa"));
        assert!(registry.at_capacity("0xbbbb"));
    }
}
