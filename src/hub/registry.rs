use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use async_trait::async_trait;
use log::{debug, info};

use crate::error::SendError;
use crate::hub::message::BroadcastMessage;

// Delivery target for broadcast messages. Transport agnostic: a WebSocket,
// an SSE stream or an in-process channel can all sit behind it.
//
// Once `close` has been called, `send` must fail with `SendError::Closed`.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SendError>;

    fn close(&self);

    fn label(&self) -> String {
        "subscriber".to_string()
    }
}

// Shared handle to a subscriber. Two handles are equal only when they point
// at the same subscriber instance.
#[derive(Clone)]
pub struct SubscriberHandle(Arc<dyn Subscriber>);

impl SubscriberHandle {
    pub fn from_arc(subscriber: Arc<dyn Subscriber>) -> Self {
        Self(subscriber)
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Deref for SubscriberHandle {
    type Target = dyn Subscriber;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SubscriberHandle {}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SubscriberHandle").field(&self.0.label()).finish()
    }
}

#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<usize, SubscriberHandle>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking subscriber callback must not wedge the registry.
    fn lock(&self) -> MutexGuard<'_, HashMap<usize, SubscriberHandle>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, subscriber: SubscriberHandle) -> bool {
        let label = subscriber.label();
        let added = self.lock().insert(subscriber.key(), subscriber).is_none();
        if added {
            info!("Subscriber added: {}", label);
        }
        added
    }

    // Close and remove under the same lock, so no other path can observe a
    // closed subscriber that is still registered.
    pub fn remove(&self, subscriber: &SubscriberHandle) -> bool {
        let mut subscribers = self.lock();
        match subscribers.remove(&subscriber.key()) {
            Some(removed) => {
                removed.close();
                debug!("Subscriber removed: {}", removed.label());
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, subscriber: &SubscriberHandle) -> bool {
        self.lock().contains_key(&subscriber.key())
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn snapshot(&self) -> Vec<SubscriberHandle> {
        self.lock().values().cloned().collect()
    }

    // Visits a snapshot taken under the lock; the lock is released while `f`
    // runs. Members removed after the snapshot are skipped.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&SubscriberHandle),
    {
        for subscriber in self.snapshot() {
            if self.contains(&subscriber) {
                f(&subscriber);
            }
        }
    }

    pub fn clear(&self) -> usize {
        let mut subscribers = self.lock();
        let count = subscribers.len();
        for (_, subscriber) in subscribers.drain() {
            subscriber.close();
        }
        count
    }
}
