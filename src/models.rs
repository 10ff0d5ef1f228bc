use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fund {
    pub code: String,
    pub name: String,
    pub current_price: f64,
    pub change_rate: f64,
    pub last_updated: DateTime<Utc>,
}

// Externally sourced price for one fund. `change_rate` is a percentage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub code: String,
    pub name: Option<String>,
    pub price: f64,
    pub change_rate: f64,
    pub as_of: DateTime<Utc>,
}

impl Quote {
    pub fn new(code: impl Into<String>, price: f64, change_rate: f64) -> Self {
        Self {
            code: code.into(),
            name: None,
            price,
            change_rate,
            as_of: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub fund_code: String,
    pub shares: f64,
    pub cost_price: f64,
    #[serde(default)]
    pub group_name: String,
    #[serde(default = "Utc::now")]
    pub last_updated: DateTime<Utc>,
}

impl Position {
    pub fn validate(&self) -> Result<(), String> {
        if self.fund_code.trim().is_empty() {
            return Err("Fund code cannot be empty".to_string());
        }

        if !self.shares.is_finite() || self.shares < 0.0 {
            return Err(format!("Shares must be a non-negative number, got {}", self.shares));
        }

        if !self.cost_price.is_finite() || self.cost_price < 0.0 {
            return Err(format!("Cost price must be a non-negative number, got {}", self.cost_price));
        }

        Ok(())
    }

    pub fn cost(&self) -> f64 {
        self.shares * self.cost_price
    }
}

// Valuation snapshot for one fund, or for the whole portfolio when
// `fund_code` is the reserved portfolio code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValueRecord {
    pub fund_code: String,
    pub current_price: f64,
    pub change_rate: f64,
    pub estimate_value: f64,
    pub estimate_change: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortfolioSummary {
    pub total_value: f64,
    pub total_cost: f64,
    pub total_gain: f64,
    pub total_gain_rate: f64,
    pub daily_gain: f64,
    pub daily_gain_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GroupSummary {
    pub group_name: String,
    pub value: f64,
    pub cost: f64,
    pub gain: f64,
    pub gain_rate: f64,
    pub daily_gain: f64,
    pub daily_gain_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_code: Option<String>,
    pub alert_type: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
impl Position {
    pub fn new(fund_code: impl Into<String>, shares: f64, cost_price: f64) -> Self {
        Self {
            fund_code: fund_code.into(),
            shares,
            cost_price,
            group_name: String::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn with_group(mut self, group_name: impl Into<String>) -> Self {
        self.group_name = group_name.into();
        self
    }
}
