//! Change notification for store subscribers.
//!
//! Views register interest in a whole collection or in one entity and get
//! [`StoreEvent`]s over an unbounded channel. There is no global observation
//! graph: each [`EntityStore`](crate::EntityStore) owns its own notifier.

use crate::{LocalId, RemoteId};
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier returned by [`Notifier::subscribe`].
pub type SubscriptionId = Uuid;

/// Receiving half handed to a subscriber.
pub type EventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Every change in the collection
    Collection,
    /// Changes to a single entity
    Entity(LocalId),
}

impl Interest {
    fn matches(&self, event: &StoreEvent) -> bool {
        match self {
            Interest::Collection => true,
            Interest::Entity(id) => *id == event.local_id,
        }
    }
}

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Created locally
    Created,
    /// Edited locally
    Updated,
    /// Deleted locally (tombstoned or dropped)
    Deleted,
    /// Server acknowledged a push (dirty cleared or id assigned)
    Synced,
    /// Fields overwritten by a pull, or inserted from one
    Replaced,
    /// Removed because the server no longer has it
    Removed,
}

/// A change to one entity of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub collection: &'static str,
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub kind: ChangeKind,
}

#[derive(Debug)]
struct Subscriber {
    interest: Interest,
    sender: mpsc::UnboundedSender<StoreEvent>,
}

/// Registry of subscribers.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: DashMap<SubscriptionId, Subscriber>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    /// Register interest and return the subscription id with its receiver.
    pub fn subscribe(&self, interest: Interest) -> (SubscriptionId, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.subscribers.insert(id, Subscriber { interest, sender });
        tracing::debug!(subscription = %id, ?interest, "store subscriber registered");
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// Deliver an event to every matching subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned. Returns the number
    /// of subscribers that received the event.
    pub fn notify(&self, event: StoreEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.subscribers.iter() {
            let subscriber = entry.value();
            if !subscriber.interest.matches(&event) {
                continue;
            }
            if subscriber.sender.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                closed.push(*entry.key());
            }
        }

        for id in closed {
            self.subscribers.remove(&id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
