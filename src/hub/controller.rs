use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use log::{error, info};

use crate::config::{BROADCAST_QUEUE_CAPACITY, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_SEND_TIMEOUT_MS};
use crate::error::HubError;
use crate::hub::dispatcher::FanoutDispatcher;
use crate::hub::message::{BroadcastMessage, MessageKind, Payload};
use crate::hub::queue::{BroadcastQueue, OverflowPolicy, PushOutcome};
use crate::hub::registry::{SubscriberHandle, SubscriberRegistry};
use crate::hub::scheduler::{RefreshInterval, UpdateScheduler};
use crate::hub::shutdown::{self, ShutdownTrigger};
use crate::hub::Collaborators;
use crate::models::{Alert, GroupSummary, PortfolioSummary, ValueRecord};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy)]
pub struct HubOptions {
    pub refresh_interval: Duration,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub send_timeout: Duration,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            queue_capacity: BROADCAST_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::DropOldest,
            send_timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub state: BroadcastState,
    pub subscribers: usize,
    pub queued: usize,
    pub queue_capacity: usize,
    pub dropped: u64,
    pub refresh_interval_secs: f64,
}

struct RunningTasks {
    trigger: ShutdownTrigger,
    scheduler: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

pub struct BroadcastHub {
    collaborators: Collaborators,
    registry: Arc<SubscriberRegistry>,
    queue: Arc<BroadcastQueue>,
    interval: RefreshInterval,
    send_timeout: Duration,
    // Held across start/stop so the two never interleave
    tasks: Mutex<Option<RunningTasks>>,
    running: AtomicBool,
}

impl BroadcastHub {
    pub fn new(collaborators: Collaborators, options: HubOptions) -> Result<Self, HubError> {
        Ok(Self {
            collaborators,
            registry: Arc::new(SubscriberRegistry::new()),
            queue: Arc::new(BroadcastQueue::new(options.queue_capacity, options.overflow_policy)),
            interval: RefreshInterval::new(options.refresh_interval)?,
            send_timeout: options.send_timeout,
            tasks: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return;
        }

        let (trigger, signal) = shutdown::channel();

        let scheduler = UpdateScheduler::new(
            self.collaborators.clone(),
            self.queue.clone(),
            self.interval.clone(),
        );
        let dispatcher = FanoutDispatcher::new(
            self.queue.clone(),
            self.registry.clone(),
            self.send_timeout,
        );

        *tasks = Some(RunningTasks {
            trigger,
            scheduler: tokio::spawn(scheduler.run(signal.clone())),
            dispatcher: tokio::spawn(dispatcher.run(signal)),
        });
        self.running.store(true, Ordering::SeqCst);

        info!("🚀 Broadcast hub started (refresh every {:?})", self.interval.get());
    }

    // Returns once both tasks have exited and every subscriber is closed.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        let running = match tasks.take() {
            Some(running) => running,
            None => return,
        };

        self.running.store(false, Ordering::SeqCst);
        running.trigger.trigger();

        if let Err(e) = running.scheduler.await {
            error!("Update scheduler task failed: {}", e);
        }
        if let Err(e) = running.dispatcher.await {
            error!("Fan-out dispatcher task failed: {}", e);
        }

        let closed = self.registry.clear();
        let discarded = self.queue.clear();

        info!("🛑 Broadcast hub stopped ({} subscribers closed, {} queued messages discarded)", closed, discarded);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> BroadcastState {
        if self.is_running() {
            BroadcastState::Running
        } else {
            BroadcastState::Stopped
        }
    }

    pub fn add_subscriber(&self, subscriber: SubscriberHandle) -> bool {
        self.registry.add(subscriber)
    }

    pub fn remove_subscriber(&self, subscriber: &SubscriberHandle) -> bool {
        self.registry.remove(subscriber)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.count()
    }

    pub fn set_refresh_interval(&self, interval: Duration) -> Result<(), HubError> {
        self.interval.set(interval)?;
        info!("Refresh interval set to {:?}", interval);
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        self.interval.get()
    }

    // Bypasses the scheduler; goes through the same queue and overflow policy.
    pub async fn send_custom_message(&self, kind: MessageKind, payload: Payload) -> PushOutcome {
        self.queue.push(BroadcastMessage::new(kind, payload)).await
    }

    pub async fn send_fund_alert(&self, fund_code: &str, alert_type: &str, value: f64) -> PushOutcome {
        let alert = Alert {
            fund_code: Some(fund_code.to_string()),
            alert_type: alert_type.to_string(),
            value,
            timestamp: Utc::now(),
        };
        self.send_custom_message(MessageKind::FundAlert, Payload::Alert(alert)).await
    }

    pub async fn send_portfolio_alert(&self, alert_type: &str, value: f64) -> PushOutcome {
        let alert = Alert {
            fund_code: None,
            alert_type: alert_type.to_string(),
            value,
            timestamp: Utc::now(),
        };
        self.send_custom_message(MessageKind::PortfolioAlert, Payload::Alert(alert)).await
    }

    pub async fn realtime_value(&self, code: &str) -> Result<ValueRecord, HubError> {
        if self.collaborators.positions.position(code).await?.is_none() {
            return Err(HubError::UnknownFund(code.to_string()));
        }
        Ok(self.collaborators.valuate(code).await?.record)
    }

    pub async fn realtime_summary(&self) -> Result<PortfolioSummary, HubError> {
        Ok(self.collaborators.portfolio.summarize().await?)
    }

    pub async fn realtime_group_summaries(&self) -> Result<HashMap<String, GroupSummary>, HubError> {
        Ok(self.collaborators.portfolio.group_summaries().await?)
    }

    pub async fn fund_history(&self, code: &str, days: u32) -> Result<Vec<ValueRecord>, HubError> {
        Ok(self.collaborators.history.history(code, days).await?)
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            state: self.state(),
            subscribers: self.registry.count(),
            queued: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            dropped: self.queue.dropped(),
            refresh_interval_secs: self.interval.get().as_secs_f64(),
        }
    }
}
