use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use uuid::Uuid;

use crate::error::SendError;
use crate::hub::{BroadcastMessage, Subscriber};

// Hub-facing side of one WebSocket client. Messages are serialized here and
// handed to the connection's writer task through a bounded channel, so a
// client that stops reading makes `send` block until the hub's timeout.
pub struct WsSubscriber {
    id: Uuid,
    peer_addr: String,
    tx: mpsc::Sender<String>,
    closed: AtomicBool,
    close_notify: Notify,
}

impl WsSubscriber {
    pub fn new(peer_addr: String, buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let subscriber = Self {
            id: Uuid::new_v4(),
            peer_addr,
            tx,
            closed: AtomicBool::new(false),
            close_notify: Notify::new(),
        };
        (subscriber, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    // Resolves once `close` has been called.
    pub async fn closed(&self) {
        while !self.is_closed() {
            self.close_notify.notified().await;
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        let json = message.to_json()?;
        self.tx.send(json).await.map_err(|_| SendError::Closed)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.close_notify.notify_one();
        }
    }

    fn label(&self) -> String {
        format!("{} ({})", self.peer_addr, &self.id.to_string()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::hub::{MessageKind, Payload};

    fn ping() -> BroadcastMessage {
        BroadcastMessage::new(MessageKind::Custom("ping".to_string()), Payload::Custom(serde_json::json!({"n": 1})))
    }

    #[tokio::test]
    async fn test_send_forwards_serialized_message() {
        let (subscriber, mut rx) = WsSubscriber::new("127.0.0.1:9000".to_string(), 4);
        subscriber.send(&ping()).await.unwrap();

        let text = rx.recv().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "ping");
        assert_eq!(value["data"]["n"], 1);
        assert!(subscriber.label().starts_with("127.0.0.1:9000"));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (subscriber, _rx) = WsSubscriber::new("peer".to_string(), 4);
        subscriber.close();
        subscriber.close();
        assert!(matches!(subscriber.send(&ping()).await, Err(SendError::Closed)));

        tokio::time::timeout(Duration::from_secs(1), subscriber.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_fails_once_writer_is_gone() {
        let (subscriber, rx) = WsSubscriber::new("peer".to_string(), 4);
        drop(rx);
        assert!(matches!(subscriber.send(&ping()).await, Err(SendError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_buffer_blocks_send() {
        let (subscriber, _rx) = WsSubscriber::new("peer".to_string(), 1);
        subscriber.send(&ping()).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), subscriber.send(&ping())).await;
        assert!(blocked.is_err());
    }
}
