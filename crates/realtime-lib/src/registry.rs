// ============================
// realtime-lib/src/registry.rs
// ============================
//! Subscriber registry and fan-out.
//!
//! Every subscriber registered on a channel receives every parsed inbound
//! message. Dispatch iterates over a snapshot, so callbacks may subscribe or
//! unsubscribe from inside a delivery without deadlocking, and a panicking
//! callback is contained so the remaining subscribers still get the message.

use crate::metrics::{MESSAGES_DELIVERED, SUBSCRIBERS, SUBSCRIBER_PANICS};
use gympulse_common::InboundMessage;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tracing::{debug, error};
use uuid::Uuid;

/// Handle identifying one registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Callback invoked with each inbound message
pub type Callback = Arc<dyn Fn(&InboundMessage) + Send + Sync + 'static>;

/// Reports that a subscriber's consumer has gone away
type Liveness = Arc<dyn Fn() -> bool + Send + Sync + 'static>;

#[derive(Clone)]
struct Subscriber {
    callback: Callback,
    closed: Option<Liveness>,
}

impl Subscriber {
    fn is_closed(&self) -> bool {
        self.closed.as_ref().is_some_and(|closed| closed())
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `callback` and return the handle that removes it again.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.insert(Subscriber {
            callback: Arc::new(callback),
            closed: None,
        })
    }

    /// Like [`subscribe`](Self::subscribe), but the callback is dropped at
    /// the next dispatch once `closed` returns true.
    pub fn subscribe_until<F, C>(self: &Arc<Self>, callback: F, closed: C) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
        C: Fn() -> bool + Send + Sync + 'static,
    {
        self.insert(Subscriber {
            callback: Arc::new(callback),
            closed: Some(Arc::new(closed)),
        })
    }

    fn insert(self: &Arc<Self>, subscriber: Subscriber) -> Subscription {
        let id = SubscriberId(Uuid::new_v4());
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, subscriber);
            subscribers.len()
        };
        gauge!(SUBSCRIBERS).set(count as f64);
        debug!(subscriber = %id, "subscriber registered");

        Subscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove one callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.write();
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            gauge!(SUBSCRIBERS).set(count as f64);
            debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
        gauge!(SUBSCRIBERS).set(0.0);
    }

    /// Deliver `message` to every subscriber registered right now.
    ///
    /// Subscribers whose consumer has gone away are removed instead of
    /// called. Returns how many callbacks completed without panicking.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let snapshot: Vec<(SubscriberId, Subscriber)> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.clone()))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, subscriber) in snapshot {
            if subscriber.is_closed() {
                closed.push(id);
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(message))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    counter!(SUBSCRIBER_PANICS).increment(1);
                    error!(subscriber = %id, action = ?message.action_str(), "subscriber panicked during dispatch");
                },
            }
        }

        for id in closed {
            if self.unsubscribe(id) {
                debug!(subscriber = %id, "pruned subscriber with no consumer");
            }
        }

        counter!(MESSAGES_DELIVERED).increment(delivered as u64);
        delivered
    }
}

/// Returned by `subscribe`; call [`Subscription::unsubscribe`] to stop delivery.
///
/// Dropping the handle leaves the callback registered until the owning
/// channel is torn down.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriberId,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Remove exactly this callback. Returns false if it was already gone
    /// or the channel no longer exists.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.unsubscribe(self.id))
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}
