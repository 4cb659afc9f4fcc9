//! Change notifications for successful write operations.
//!
//! Every mutating operation emits one event after it succeeds, carrying the
//! collection name and the kind of change. Events are delivered to every
//! live subscriber; dropped receivers are pruned on the next emit.

use parking_lot::RwLock;
use std::sync::mpsc::{self, Receiver, Sender};

/// The kind of write that produced a [`ChangeEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    /// A single document was inserted.
    Insert { id: String },
    /// A batch insert succeeded; carries the ids actually written.
    InsertMany { ids: Vec<String> },
    /// A single document was updated. `upserted` is true when the update
    /// inserted a new document instead of modifying an existing one.
    Update { id: String, upserted: bool },
    /// Multiple documents matched and were updated.
    UpdateMany { count: usize },
    /// A document body was replaced wholesale.
    Replace { id: String },
    /// A single document was deleted.
    Delete { id: String },
    /// Multiple documents were deleted.
    DeleteMany { count: usize },
    /// The collection's table and indexes were dropped.
    Drop,
}

/// A single change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Name of the collection the write targeted.
    pub collection: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(collection: impl Into<String>, kind: ChangeKind) -> Self {
        Self { collection: collection.into(), kind }
    }
}

/// Fans committed change events out to subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future change events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Delivers an event to every live subscriber, dropping closed channels.
    pub fn emit(&self, event: ChangeEvent) {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn emit_reaches_all_subscribers() {
        let bus = EventBus::new();
        let rx1 = bus.subscribe();
        let rx2 = bus.subscribe();

        let event = ChangeEvent::new("users", ChangeKind::Insert { id: "u1".into() });
        bus.emit(event.clone());

        assert_eq!(rx1.recv_timeout(Duration::from_millis(100)).unwrap(), event);
        assert_eq!(rx2.recv_timeout(Duration::from_millis(100)).unwrap(), event);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(rx);
        bus.emit(ChangeEvent::new("users", ChangeKind::Drop));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
