pub mod controller;
pub mod dispatcher;
pub mod message;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod shutdown;
pub mod valuation;

#[cfg(test)]
pub mod testing;

use std::sync::Arc;
use chrono::Utc;

use crate::error::HubError;
use crate::models::{Quote, ValueRecord};
use crate::services::{HistoryStore, PortfolioAggregator, PositionStore, PriceSource};

pub use controller::{BroadcastHub, HubOptions, HubStats};
pub use message::{BroadcastMessage, MessageKind, Payload};
pub use queue::{OverflowPolicy, PushOutcome};
pub use registry::{Subscriber, SubscriberHandle};

// External systems the hub reads from and writes to.
#[derive(Clone)]
pub struct Collaborators {
    pub prices: Arc<dyn PriceSource>,
    pub positions: Arc<dyn PositionStore>,
    pub portfolio: Arc<dyn PortfolioAggregator>,
    pub history: Arc<dyn HistoryStore>,
}

impl Collaborators {
    // Quote first, then the position: a position deleted while the quote was
    // in flight is reported as unknown.
    pub async fn valuate(&self, code: &str) -> Result<Valuation, HubError> {
        let quote = self.prices.fetch(code).await?;
        let position = self
            .positions
            .position(code)
            .await?
            .ok_or_else(|| HubError::UnknownFund(code.to_string()))?;

        let record = valuation::compute_value(&quote, &position, Utc::now());
        Ok(Valuation { quote, record })
    }
}

// A fresh quote and the value record computed from it.
pub struct Valuation {
    pub quote: Quote,
    pub record: ValueRecord,
}
