use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use futures::stream::{SplitSink, SplitStream};
use futures::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use log::{debug, error, info, warn};

use crate::config::{DEFAULT_SEND_TIMEOUT_MS, SUBSCRIBER_BUFFER_SIZE};
use crate::hub::{BroadcastHub, BroadcastMessage, MessageKind, Payload, Subscriber, SubscriberHandle};
use crate::websocket::WsSubscriber;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

pub struct WebSocketHandler {
    hub: Arc<BroadcastHub>,
    peer_addr: String,
}

impl WebSocketHandler {
    pub fn new(hub: Arc<BroadcastHub>, peer_addr: String) -> Self {
        Self { hub, peer_addr }
    }

    pub async fn handle_connection(self, stream: TcpStream) {
        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                error!("WebSocket handshake failed for {}: {:?}", self.peer_addr, e);
                return;
            }
        };

        let (mut write, read) = ws_stream.split();

        let (subscriber, rx) = WsSubscriber::new(self.peer_addr.clone(), SUBSCRIBER_BUFFER_SIZE);
        let subscriber = Arc::new(subscriber);
        let client_id = subscriber.id();

        if let Err(e) = write.send(Message::Text(welcome_message(&client_id.to_string()))).await {
            warn!("Failed to greet {}: {:?}", self.peer_addr, e);
            return;
        }

        let handle = SubscriberHandle::from_arc(subscriber.clone());
        self.hub.add_subscriber(handle.clone());
        info!("WebSocket client connected - {} ({} subscribers)", handle.label(), self.hub.subscriber_count());

        let mut write_task = self.spawn_write_task(write, rx, subscriber.clone());
        let mut read_task = self.spawn_read_task(read);

        let writer_finished = tokio::select! {
            _ = &mut write_task => true,
            _ = &mut read_task => false,
        };

        self.hub.remove_subscriber(&handle);
        if writer_finished {
            debug!("Write task completed for {}", self.peer_addr);
            read_task.abort();
        } else {
            // Wakes the writer so it sends a close frame and exits
            subscriber.close();
            if let Err(e) = write_task.await {
                error!("Write task for {} failed: {}", self.peer_addr, e);
            }
        }

        info!("WebSocket client disconnected - {} ({} subscribers)", self.peer_addr, self.hub.subscriber_count());
    }

    fn spawn_write_task(
        &self,
        write: WsSink,
        rx: mpsc::Receiver<String>,
        subscriber: Arc<WsSubscriber>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(write_loop(write, rx, subscriber, self.peer_addr.clone()))
    }

    // Inbound traffic is not interpreted; reading keeps ping/pong and close
    // handling alive.
    fn spawn_read_task(&self, mut read: WsSource) -> tokio::task::JoinHandle<()> {
        let peer_addr = self.peer_addr.clone();
        tokio::spawn(async move {
            while let Some(msg_result) = read.next().await {
                match msg_result {
                    Ok(Message::Close(close_frame)) => {
                        debug!("Received close frame from {}: {:?}", peer_addr, close_frame);
                        break;
                    }
                    Ok(Message::Text(text)) => {
                        debug!("Ignoring text message from {}: {}", peer_addr, text);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Error reading from {}: {:?}", peer_addr, e);
                        break;
                    }
                }
            }
        })
    }
}

// Forwards queued text frames until the subscriber is closed or the client
// goes away. A close interrupts a frame send that is stuck on a client that
// stopped reading.
async fn write_loop<S>(
    mut write: S,
    mut rx: mpsc::Receiver<String>,
    subscriber: Arc<WsSubscriber>,
    peer_addr: String,
) where
    S: Sink<Message> + Unpin,
    S::Error: Debug,
{
    loop {
        tokio::select! {
            biased;
            _ = subscriber.closed() => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "Broadcast closed".into(),
                };
                let close_timeout = Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS);
                match tokio::time::timeout(close_timeout, write.send(Message::Close(Some(frame)))).await {
                    Ok(Err(e)) => debug!("Error sending close frame to {}: {:?}", peer_addr, e),
                    Err(_) => debug!("Timed out sending close frame to {}", peer_addr),
                    Ok(Ok(())) => {}
                }
                break;
            }
            message = rx.recv() => {
                let Some(message) = message else { break };
                tokio::select! {
                    biased;
                    _ = subscriber.closed() => {
                        warn!("Dropping stalled connection to {}", peer_addr);
                        break;
                    }
                    result = write.send(Message::Text(message)) => {
                        if let Err(e) = result {
                            warn!("Error sending message to {}: {:?}", peer_addr, e);
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn welcome_message(client_id: &str) -> String {
    let message = BroadcastMessage::new(
        MessageKind::Custom("connected".to_string()),
        Payload::Custom(serde_json::json!({
            "client_id": client_id,
            "message": "Connected to fund broadcast",
        })),
    );
    message.to_json().unwrap_or_else(|_| r#"{"type":"connected"}"#.to_string())
}

// Accepts WebSocket clients until the listener fails.
pub async fn serve(listener: TcpListener, hub: Arc<BroadcastHub>) {
    info!("🔗 Ready to accept WebSocket connections");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = WebSocketHandler::new(hub.clone(), addr.to_string());
                tokio::spawn(handler.handle_connection(stream));
            }
            Err(e) => {
                error!("Failed to accept WebSocket connection: {}", e);
                break;
            }
        }
    }
}
