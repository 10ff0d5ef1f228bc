use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Fund, GroupSummary, PortfolioSummary, Position};
use crate::services::{MemoryStore, PortfolioAggregator};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Totals {
    value: f64,
    cost: f64,
    daily_gain: f64,
}

impl Totals {
    fn add(&mut self, position: &Position, fund: &Fund) {
        self.value += position.shares * fund.current_price;
        self.cost += position.cost();
        self.daily_gain += position.cost() * fund.change_rate / 100.0;
    }

    fn gain(&self) -> f64 {
        self.value - self.cost
    }

    fn rate(&self, amount: f64) -> f64 {
        if self.cost > 0.0 {
            amount / self.cost * 100.0
        } else {
            0.0
        }
    }
}

// Aggregates positions against the latest known fund prices. Funds that
// have never been priced are left out.
pub struct PortfolioService {
    store: Arc<MemoryStore>,
}

impl PortfolioService {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    fn priced_positions(&self) -> Result<Vec<(Position, Fund)>, StoreError> {
        let funds: HashMap<String, Fund> = self
            .store
            .funds()?
            .into_iter()
            .map(|fund| (fund.code.clone(), fund))
            .collect();

        Ok(self
            .store
            .positions()?
            .into_iter()
            .filter_map(|position| {
                let fund = funds.get(&position.fund_code)?.clone();
                Some((position, fund))
            })
            .collect())
    }
}

fn group_from(group_name: &str, totals: &Totals) -> GroupSummary {
    GroupSummary {
        group_name: group_name.to_string(),
        value: totals.value,
        cost: totals.cost,
        gain: totals.gain(),
        gain_rate: totals.rate(totals.gain()),
        daily_gain: totals.daily_gain,
        daily_gain_rate: totals.rate(totals.daily_gain),
    }
}

#[async_trait]
impl PortfolioAggregator for PortfolioService {
    async fn summarize(&self) -> Result<PortfolioSummary, StoreError> {
        let mut totals = Totals::default();
        for (position, fund) in self.priced_positions()? {
            totals.add(&position, &fund);
        }

        Ok(PortfolioSummary {
            total_value: totals.value,
            total_cost: totals.cost,
            total_gain: totals.gain(),
            total_gain_rate: totals.rate(totals.gain()),
            daily_gain: totals.daily_gain,
            daily_gain_rate: totals.rate(totals.daily_gain),
        })
    }

    async fn group_summaries(&self) -> Result<HashMap<String, GroupSummary>, StoreError> {
        let mut groups: HashMap<String, Totals> = self
            .store
            .group_names()?
            .into_iter()
            .map(|name| (name, Totals::default()))
            .collect();

        for (position, fund) in self.priced_positions()? {
            groups.entry(position.group_name.clone()).or_default().add(&position, &fund);
        }

        Ok(groups
            .into_iter()
            .map(|(name, totals)| {
                let summary = group_from(&name, &totals);
                (name, summary)
            })
            .collect())
    }
}
