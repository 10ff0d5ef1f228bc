pub mod portfolio;
pub mod quotes;
pub mod store;

use std::collections::BTreeSet;
use std::collections::HashMap;
use async_trait::async_trait;

use crate::error::{FetchError, StoreError};
use crate::models::{GroupSummary, PortfolioSummary, Position, Quote, ValueRecord};

pub use portfolio::PortfolioService;
pub use quotes::{EastmoneyPriceSource, SimulatedPriceSource};
pub use store::MemoryStore;

// Upstream quote provider. May fail per request; the hub never retries.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch(&self, code: &str) -> Result<Quote, FetchError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn subscribed_codes(&self) -> Result<BTreeSet<String>, StoreError>;

    async fn position(&self, code: &str) -> Result<Option<Position>, StoreError>;
}

#[async_trait]
pub trait PortfolioAggregator: Send + Sync {
    async fn summarize(&self) -> Result<PortfolioSummary, StoreError>;

    async fn group_summaries(&self) -> Result<HashMap<String, GroupSummary>, StoreError>;
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: &ValueRecord) -> Result<(), StoreError>;

    // Latest quote per fund, including the fund's display name.
    async fn save_quote(&self, quote: &Quote) -> Result<(), StoreError>;

    async fn history(&self, code: &str, days: u32) -> Result<Vec<ValueRecord>, StoreError>;
}
