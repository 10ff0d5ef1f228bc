// Test doubles shared by the hub's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;

use crate::error::{FetchError, SendError, StoreError};
use crate::hub::message::BroadcastMessage;
use crate::hub::registry::Subscriber;
use crate::hub::Collaborators;
use crate::models::{Quote, ValueRecord};
use crate::services::{HistoryStore, MemoryStore, PortfolioService, PriceSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    Accept,
    Fail,
    Hang,
}

pub struct RecordingSubscriber {
    mode: SendMode,
    delay: Option<Duration>,
    received: Mutex<Vec<BroadcastMessage>>,
    attempts: AtomicUsize,
    closed: AtomicBool,
}

impl RecordingSubscriber {
    pub fn new() -> Self {
        Self::with_mode(SendMode::Accept)
    }

    pub fn with_mode(mode: SendMode) -> Self {
        Self {
            mode,
            delay: None,
            received: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn received(&self) -> Vec<BroadcastMessage> {
        self.received.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Subscriber for RecordingSubscriber {
    async fn send(&self, message: &BroadcastMessage) -> Result<(), SendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match self.mode {
            SendMode::Accept => {
                self.received.lock().unwrap().push(message.clone());
                Ok(())
            }
            SendMode::Fail => Err(SendError::Closed),
            SendMode::Hang => {
                futures::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn label(&self) -> String {
        format!("recording({:?})", self.mode)
    }
}

type FetchHook = Box<dyn Fn() + Send + Sync>;

// Fixed prices per code; codes without a price fail with NotFound.
pub struct StaticPriceSource {
    prices: Mutex<HashMap<String, f64>>,
    hooks: Mutex<HashMap<String, FetchHook>>,
    hang: bool,
    age: chrono::Duration,
    fetches: AtomicUsize,
}

impl StaticPriceSource {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: Mutex::new(prices.iter().map(|(code, price)| (code.to_string(), *price)).collect()),
            hooks: Mutex::new(HashMap::new()),
            hang: false,
            age: chrono::Duration::zero(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    // Quotes carry a publish time this far in the past.
    pub fn published_ago(mut self, age: chrono::Duration) -> Self {
        self.age = age;
        self
    }

    pub fn set_price(&self, code: &str, price: f64) {
        self.prices.lock().unwrap().insert(code.to_string(), price);
    }

    pub fn on_fetch(&self, code: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.hooks.lock().unwrap().insert(code.to_string(), Box::new(hook));
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn fetch(&self, code: &str) -> Result<Quote, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if let Some(hook) = self.hooks.lock().unwrap().get(code) {
            hook();
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(code)
            .copied()
            .ok_or_else(|| FetchError::NotFound(code.to_string()))?;
        let mut quote = Quote::new(code, price, 0.5);
        quote.name = Some(format!("Fund {}", code));
        quote.as_of = quote.as_of - self.age;
        Ok(quote)
    }
}

pub struct FailingHistory;

#[async_trait]
impl HistoryStore for FailingHistory {
    async fn append(&self, _record: &ValueRecord) -> Result<(), StoreError> {
        Err(StoreError::Invalid("disk full".to_string()))
    }

    async fn save_quote(&self, _quote: &Quote) -> Result<(), StoreError> {
        Err(StoreError::Invalid("disk full".to_string()))
    }

    async fn history(&self, _code: &str, _days: u32) -> Result<Vec<ValueRecord>, StoreError> {
        Ok(Vec::new())
    }
}

pub fn collaborators(prices: Arc<StaticPriceSource>, store: Arc<MemoryStore>) -> Collaborators {
    Collaborators {
        prices,
        positions: store.clone(),
        portfolio: Arc::new(PortfolioService::new(store.clone())),
        history: store,
    }
}
