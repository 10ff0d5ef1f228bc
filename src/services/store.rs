use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use log::info;

use crate::config::MAX_HISTORY_PER_FUND;
use crate::error::StoreError;
use crate::models::{Fund, Position, Quote, ValueRecord};
use crate::services::{HistoryStore, PositionStore};

// In-process store for funds, positions and valuation history, keyed by
// fund code.
pub struct MemoryStore {
    funds: Mutex<HashMap<String, Fund>>,
    positions: Mutex<HashMap<String, Position>>,
    history: Mutex<HashMap<String, VecDeque<ValueRecord>>>,
    history_limit: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_history_limit(MAX_HISTORY_PER_FUND)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            funds: Mutex::new(HashMap::new()),
            positions: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            history_limit: history_limit.max(1),
        }
    }

    // A quote without a name keeps the name already on file.
    pub fn update_fund(&self, quote: &Quote) -> Result<(), StoreError> {
        let mut funds = self.funds.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let fund = funds.entry(quote.code.clone()).or_insert_with(|| Fund {
            code: quote.code.clone(),
            name: String::new(),
            current_price: 0.0,
            change_rate: 0.0,
            last_updated: Utc::now(),
        });
        if let Some(name) = quote.name.as_deref().filter(|name| !name.is_empty()) {
            fund.name = name.to_string();
        }
        fund.current_price = quote.price;
        fund.change_rate = quote.change_rate;
        fund.last_updated = Utc::now();
        Ok(())
    }

    pub fn fund(&self, code: &str) -> Result<Option<Fund>, StoreError> {
        let funds = self.funds.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(funds.get(code).cloned())
    }

    pub fn funds(&self) -> Result<Vec<Fund>, StoreError> {
        let funds = self.funds.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut all: Vec<Fund> = funds.values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    pub fn upsert_position(&self, mut position: Position) -> Result<Position, StoreError> {
        position.validate().map_err(StoreError::Invalid)?;
        position.fund_code = position.fund_code.trim().to_string();
        position.last_updated = Utc::now();

        let mut positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        positions.insert(position.fund_code.clone(), position.clone());

        info!("Position saved - Fund: {}, Shares: {}, Cost: {}, Group: '{}'",
              position.fund_code, position.shares, position.cost_price, position.group_name);
        Ok(position)
    }

    pub fn get_position(&self, code: &str) -> Result<Option<Position>, StoreError> {
        let positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(positions.get(code).cloned())
    }

    // Ordered by group, then fund code.
    pub fn positions(&self) -> Result<Vec<Position>, StoreError> {
        let positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut all: Vec<Position> = positions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.group_name.cmp(&b.group_name).then_with(|| a.fund_code.cmp(&b.fund_code))
        });
        Ok(all)
    }

    pub fn delete_position(&self, code: &str) -> Result<Position, StoreError> {
        let mut positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let removed = positions.remove(code)
            .ok_or_else(|| StoreError::NotFound(format!("position for fund {}", code)))?;
        info!("Position deleted - Fund: {}", code);
        Ok(removed)
    }

    pub fn group_names(&self) -> Result<Vec<String>, StoreError> {
        let positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let groups: BTreeSet<String> = positions.values().map(|p| p.group_name.clone()).collect();
        Ok(groups.into_iter().collect())
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn subscribed_codes(&self) -> Result<BTreeSet<String>, StoreError> {
        let positions = self.positions.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(positions.keys().cloned().collect())
    }

    async fn position(&self, code: &str) -> Result<Option<Position>, StoreError> {
        self.get_position(code)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append(&self, record: &ValueRecord) -> Result<(), StoreError> {
        let mut history = self.history.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let entries = history.entry(record.fund_code.clone()).or_default();
        if entries.len() >= self.history_limit {
            entries.pop_front();
        }
        entries.push_back(record.clone());
        Ok(())
    }

    async fn save_quote(&self, quote: &Quote) -> Result<(), StoreError> {
        self.update_fund(quote)
    }

    // Records from the last `days` days, oldest first. A window reaching past
    // the earliest representable time returns everything.
    async fn history(&self, code: &str, days: u32) -> Result<Vec<ValueRecord>, StoreError> {
        let cutoff = Utc::now()
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let history = self.history.lock()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut records: Vec<ValueRecord> = history
            .get(code)
            .map(|entries| entries.iter().filter(|r| r.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PORTFOLIO_CODE;

    fn record_at(code: &str, price: f64, timestamp: DateTime<Utc>) -> ValueRecord {
        ValueRecord {
            fund_code: code.to_string(),
            current_price: price,
            change_rate: 1.5,
            estimate_value: price * 10.0,
            estimate_change: 0.0,
            timestamp,
        }
    }

    #[test]
    fn test_position_crud() {
        let store = MemoryStore::new();
        store.upsert_position(Position::new(" 000001 ", 100.0, 1.0).with_group("core")).unwrap();
        store.upsert_position(Position::new("110022", 5.0, 2.0).with_group("alpha")).unwrap();

        assert_eq!(store.get_position("000001").unwrap().unwrap().shares, 100.0);
        let ordered: Vec<_> = store.positions().unwrap().into_iter().map(|p| p.fund_code).collect();
        assert_eq!(ordered, vec!["110022", "000001"]);
        assert_eq!(store.group_names().unwrap(), vec!["alpha", "core"]);

        store.delete_position("000001").unwrap();
        assert!(store.get_position("000001").unwrap().is_none());
        assert!(matches!(store.delete_position("000001"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_invalid_position_rejected() {
        let store = MemoryStore::new();
        let result = store.upsert_position(Position::new("000001", -5.0, 1.0));
        assert!(matches!(result, Err(StoreError::Invalid(_))));
        assert!(store.positions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribed_codes_are_distinct() {
        let store = MemoryStore::new();
        store.upsert_position(Position::new("000001", 1.0, 1.0)).unwrap();
        store.upsert_position(Position::new("000001", 2.0, 1.0)).unwrap();
        store.upsert_position(Position::new("000002", 2.0, 1.0)).unwrap();

        let codes: Vec<_> = store.subscribed_codes().await.unwrap().into_iter().collect();
        assert_eq!(codes, vec!["000001", "000002"]);
    }

    #[tokio::test]
    async fn test_history_filters_by_days() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append(&record_at("000001", 1.0, now - Duration::days(10))).await.unwrap();
        store.append(&record_at("000001", 1.2, now - Duration::days(2))).await.unwrap();
        store.append(&record_at("000001", 1.3, now)).await.unwrap();

        let recent = store.history("000001", 3).await.unwrap();
        let prices: Vec<_> = recent.iter().map(|r| r.current_price).collect();
        assert_eq!(prices, vec![1.2, 1.3]);
        assert_eq!(store.history("000001", 30).await.unwrap().len(), 3);
        assert!(store.history("999999", 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_with_huge_window_returns_everything() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.append(&record_at("000001", 1.0, now - Duration::days(400))).await.unwrap();
        store.append(&record_at("000001", 1.1, now)).await.unwrap();

        assert_eq!(store.history("000001", u32::MAX).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_quote_keeps_fund_catalog() {
        let store = MemoryStore::new();
        let mut quote = Quote::new("000001", 1.215, 1.25);
        quote.name = Some("Growth Mixed".to_string());
        store.save_quote(&quote).await.unwrap();

        let fund = store.fund("000001").unwrap().unwrap();
        assert_eq!(fund.name, "Growth Mixed");
        assert_eq!(fund.current_price, 1.215);
        assert_eq!(fund.change_rate, 1.25);

        // Unnamed quotes update the price only
        store.save_quote(&Quote::new("000001", 1.3, 2.0)).await.unwrap();
        let fund = store.fund("000001").unwrap().unwrap();
        assert_eq!(fund.name, "Growth Mixed");
        assert_eq!(fund.current_price, 1.3);
    }

    #[tokio::test]
    async fn test_history_is_bounded_per_fund() {
        let store = MemoryStore::with_history_limit(2);
        let now = Utc::now();
        for price in [1.0, 2.0, 3.0] {
            store.append(&record_at("000001", price, now)).await.unwrap();
        }
        let prices: Vec<_> = store.history("000001", 1).await.unwrap().iter().map(|r| r.current_price).collect();
        assert_eq!(prices, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_value_records_do_not_create_funds() {
        let store = MemoryStore::new();
        store.append(&record_at(PORTFOLIO_CODE, 500.0, Utc::now())).await.unwrap();
        assert!(store.funds().unwrap().is_empty());
        assert_eq!(store.history(PORTFOLIO_CODE, 1).await.unwrap().len(), 1);
    }
}
