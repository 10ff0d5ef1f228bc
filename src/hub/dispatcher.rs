use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use tokio::time::timeout;
use log::{debug, info, warn};

use crate::error::SendError;
use crate::hub::message::BroadcastMessage;
use crate::hub::queue::BroadcastQueue;
use crate::hub::registry::SubscriberRegistry;
use crate::hub::shutdown::ShutdownSignal;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub evicted: usize,
}

pub struct FanoutDispatcher {
    queue: Arc<BroadcastQueue>,
    registry: Arc<SubscriberRegistry>,
    send_timeout: Duration,
}

impl FanoutDispatcher {
    pub fn new(queue: Arc<BroadcastQueue>, registry: Arc<SubscriberRegistry>, send_timeout: Duration) -> Self {
        Self {
            queue,
            registry,
            send_timeout,
        }
    }

    pub async fn run(self, shutdown: ShutdownSignal) {
        info!("Fan-out dispatcher started");
        let mut stop = shutdown;

        loop {
            let message = tokio::select! {
                biased;
                _ = stop.triggered() => break,
                message = self.queue.pop() => message,
            };

            let report = self.dispatch(&message).await;
            if report.evicted > 0 {
                debug!(
                    "Dispatched {} ({}) to {} subscribers, evicted {}",
                    message.kind.as_str(),
                    message.fund_code().unwrap_or("-"),
                    report.delivered,
                    report.evicted
                );
            }
        }

        info!("Fan-out dispatcher stopped");
    }

    // Sends one message to every registered subscriber concurrently. Each
    // send is bounded by the timeout; failures are evicted before returning.
    pub async fn dispatch(&self, message: &BroadcastMessage) -> DispatchReport {
        let send_timeout = self.send_timeout;
        let mut deliveries = Vec::new();

        self.registry.for_each(|subscriber| {
            let subscriber = subscriber.clone();
            deliveries.push(async move {
                let result = match timeout(send_timeout, subscriber.send(message)).await {
                    Ok(result) => result,
                    Err(_) => Err(SendError::Timeout),
                };
                (subscriber, result)
            });
        });

        let mut report = DispatchReport::default();
        for (subscriber, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    if self.registry.remove(&subscriber) {
                        warn!("Evicted subscriber {}: {}", subscriber.label(), e);
                        report.evicted += 1;
                    }
                }
            }
        }
        report
    }
}
