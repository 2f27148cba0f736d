//! In-process publish/subscribe channel for call-state propagation
//!
//! Call sessions publish their state snapshots here instead of mutating the
//! registry directly; the orchestrator subscribes and is the single writer of
//! the [`CallRegistry`](crate::registry::CallRegistry). Two topics exist:
//! `call.update` for any observable change and `call.ended` exactly once per
//! call.
//!
//! Delivery is FIFO per topic per subscriber (each subscriber gets its own
//! unbounded queue). No ordering is guaranteed across topics. One subscriber
//! (the orchestrator) is the normal configuration, but any number can attach
//! without affecting each other's ordering.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::call::CallInfo;

/// One publish/subscribe topic with per-subscriber FIFO delivery
pub struct Topic<T: Clone> {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone> Topic<T> {
    /// Create an empty topic
    pub fn new() -> Self {
        Self { subscribers: Mutex::new(Vec::new()) }
    }

    /// Attach a new subscriber
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publish a message to every live subscriber, pruning closed ones
    pub fn publish(&self, message: T) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(message.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

impl<T: Clone> Default for Topic<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The bus carrying call-state changes from sessions to the orchestrator
pub struct EventBus {
    /// A call session changed observably (phase or media state)
    pub call_update: Topic<CallInfo>,
    /// A call session reached its terminal phase
    pub call_ended: Topic<CallInfo>,
}

impl EventBus {
    /// Create a bus with both topics empty
    pub fn new() -> Self {
        Self { call_update: Topic::new(), call_ended: Topic::new() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
