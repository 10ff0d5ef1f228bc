use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::models::{Alert, ValueRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    FundUpdate,
    PortfolioUpdate,
    FundAlert,
    PortfolioAlert,
    Custom(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::FundUpdate => "fund_update",
            MessageKind::PortfolioUpdate => "portfolio_update",
            MessageKind::FundAlert => "fund_alert",
            MessageKind::PortfolioAlert => "portfolio_alert",
            MessageKind::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "fund_update" => MessageKind::FundUpdate,
            "portfolio_update" => MessageKind::PortfolioUpdate,
            "fund_alert" => MessageKind::FundAlert,
            "portfolio_alert" => MessageKind::PortfolioAlert,
            other => MessageKind::Custom(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Value(ValueRecord),
    Alert(Alert),
    Custom(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastMessage {
    pub kind: MessageKind,
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
}

// Wire shape: {"type": ..., "data": ..., "timestamp": <RFC 3339>}
#[derive(Serialize)]
struct WireMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    data: &'a Payload,
    timestamp: &'a DateTime<Utc>,
}

impl Serialize for BroadcastMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireMessage {
            kind: self.kind.as_str(),
            data: &self.payload,
            timestamp: &self.timestamp,
        }
        .serialize(serializer)
    }
}

impl BroadcastMessage {
    pub fn new(kind: MessageKind, payload: Payload) -> Self {
        Self {
            kind,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn fund_update(record: ValueRecord) -> Self {
        Self::new(MessageKind::FundUpdate, Payload::Value(record))
    }

    pub fn portfolio_update(record: ValueRecord) -> Self {
        Self::new(MessageKind::PortfolioUpdate, Payload::Value(record))
    }

    pub fn fund_code(&self) -> Option<&str> {
        match &self.payload {
            Payload::Value(record) => Some(&record.fund_code),
            Payload::Alert(alert) => alert.fund_code.as_deref(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str) -> ValueRecord {
        ValueRecord {
            fund_code: code.to_string(),
            current_price: 1.1,
            change_rate: 0.5,
            estimate_value: 110.0,
            estimate_change: 10.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_wire_shape() {
        let message = BroadcastMessage::fund_update(record("000001"));
        let json: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "fund_update");
        assert_eq!(json["data"]["fund_code"], "000001");
        assert_eq!(json["data"]["estimate_value"], 110.0);
        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn test_custom_kind_keeps_name() {
        let message = BroadcastMessage::new(
            MessageKind::from_name("market_closed"),
            Payload::Custom(serde_json::json!({"exchange": "SSE"})),
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["type"], "market_closed");
        assert_eq!(json["data"]["exchange"], "SSE");
        assert_eq!(message.fund_code(), None);
    }

    #[test]
    fn test_known_kind_names_round_trip() {
        for kind in [
            MessageKind::FundUpdate,
            MessageKind::PortfolioUpdate,
            MessageKind::FundAlert,
            MessageKind::PortfolioAlert,
        ] {
            assert_eq!(MessageKind::from_name(kind.as_str()), kind);
        }
    }
}
