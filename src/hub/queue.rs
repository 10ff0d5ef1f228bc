use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};
use log::warn;

use crate::hub::message::BroadcastMessage;

// What a full queue does with a new message. Producers are never blocked
// indefinitely: a stalled dispatcher must not stop price refreshes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    #[default]
    DropOldest,
    DropNewest,
    Block { timeout: Duration },
}

impl OverflowPolicy {
    pub fn parse(name: &str, block_timeout: Duration) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_newest" => Ok(Self::DropNewest),
            "block" => Ok(Self::Block { timeout: block_timeout }),
            other => Err(format!("Unknown overflow policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Queued,
    DroppedOldest,
    DroppedNewest,
    TimedOut,
}

pub struct BroadcastQueue {
    items: Mutex<VecDeque<BroadcastMessage>>,
    capacity: usize,
    policy: OverflowPolicy,
    readable: Notify,
    writable: Notify,
    dropped: AtomicU64,
}

impl BroadcastQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            readable: Notify::new(),
            writable: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BroadcastMessage>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn push(&self, message: BroadcastMessage) -> PushOutcome {
        match self.policy {
            OverflowPolicy::DropOldest => {
                let outcome = {
                    let mut items = self.lock();
                    let outcome = if items.len() >= self.capacity {
                        items.pop_front();
                        PushOutcome::DroppedOldest
                    } else {
                        PushOutcome::Queued
                    };
                    items.push_back(message);
                    outcome
                };
                if outcome == PushOutcome::DroppedOldest {
                    self.record_drop("dropped oldest message");
                }
                self.readable.notify_one();
                outcome
            }
            OverflowPolicy::DropNewest => {
                let queued = {
                    let mut items = self.lock();
                    if items.len() >= self.capacity {
                        false
                    } else {
                        items.push_back(message);
                        true
                    }
                };
                if queued {
                    self.readable.notify_one();
                    PushOutcome::Queued
                } else {
                    self.record_drop("dropped new message");
                    PushOutcome::DroppedNewest
                }
            }
            OverflowPolicy::Block { timeout } => {
                let deadline = Instant::now() + timeout;
                loop {
                    {
                        let mut items = self.lock();
                        if items.len() < self.capacity {
                            items.push_back(message);
                            drop(items);
                            self.readable.notify_one();
                            return PushOutcome::Queued;
                        }
                    }
                    if timeout_at(deadline, self.writable.notified()).await.is_err() {
                        self.record_drop("timed out waiting for space");
                        return PushOutcome::TimedOut;
                    }
                }
            }
        }
    }

    // Waits until a message is available. Cancel safe: a message is only
    // removed after the last suspension point.
    pub async fn pop(&self) -> BroadcastMessage {
        loop {
            if let Some(message) = self.try_pop() {
                return message;
            }
            self.readable.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<BroadcastMessage> {
        let message = self.lock().pop_front();
        if message.is_some() {
            self.writable.notify_one();
        }
        message
    }

    pub fn clear(&self) -> usize {
        let drained = {
            let mut items = self.lock();
            let count = items.len();
            items.clear();
            count
        };
        self.writable.notify_waiters();
        drained
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, reason: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Broadcast queue full (capacity {}): {} ({} dropped so far)", self.capacity, reason, total);
    }
}
