use std::env;
use std::time::Duration;
use log::warn;

use crate::hub::OverflowPolicy;

// Server Configuration
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8080";
pub const DEFAULT_API_BIND_ADDRESS: &str = "127.0.0.1:3000";
pub const STATS_INTERVAL_SECS: u64 = 60;

// Refresh Configuration
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;
pub const MIN_REFRESH_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_QUOTE_TIMEOUT_SECS: u64 = 10;

// Broadcast Configuration
pub const BROADCAST_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2000;
pub const SUBSCRIBER_BUFFER_SIZE: usize = 64;

// Reserved fund code carried by portfolio-wide value records
pub const PORTFOLIO_CODE: &str = "__portfolio__";

// History Configuration
pub const MAX_HISTORY_PER_FUND: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceKind {
    Eastmoney,
    Simulated,
}

impl PriceSourceKind {
    pub fn parse(name: &str) -> Result<Self, String> {
        match name.trim().to_ascii_lowercase().as_str() {
            "eastmoney" => Ok(Self::Eastmoney),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!("Unknown price source: {}", other)),
        }
    }
}

pub struct Config {
    pub bind_address: String,
    pub api_bind_address: String,
    pub refresh_interval_secs: u64,
    pub queue_capacity: usize,
    pub overflow_policy: String,
    pub send_timeout_ms: u64,
    pub price_source: String,
    pub quote_timeout_secs: u64,
    pub auto_start: bool,
    pub log_level: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            bind_address: env::var("BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string()),
            api_bind_address: env::var("API_BIND_ADDRESS")
                .unwrap_or_else(|_| DEFAULT_API_BIND_ADDRESS.to_string()),
            refresh_interval_secs: env_or("REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS),
            queue_capacity: env_or("BROADCAST_QUEUE_CAPACITY", BROADCAST_QUEUE_CAPACITY),
            overflow_policy: env::var("OVERFLOW_POLICY")
                .unwrap_or_else(|_| "drop_oldest".to_string()),
            send_timeout_ms: env_or("SEND_TIMEOUT_MS", DEFAULT_SEND_TIMEOUT_MS),
            price_source: env::var("PRICE_SOURCE")
                .unwrap_or_else(|_| "eastmoney".to_string()),
            quote_timeout_secs: env_or("QUOTE_TIMEOUT_SECS", DEFAULT_QUOTE_TIMEOUT_SECS),
            auto_start: env_or("AUTO_START", true),
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.refresh_interval_secs == 0 {
            return Err("REFRESH_INTERVAL_SECS must be greater than 0".to_string());
        }

        if self.queue_capacity == 0 {
            return Err("BROADCAST_QUEUE_CAPACITY must be greater than 0".to_string());
        }

        if self.send_timeout_ms == 0 {
            return Err("SEND_TIMEOUT_MS must be greater than 0".to_string());
        }

        if self.quote_timeout_secs == 0 {
            warn!("QUOTE_TIMEOUT_SECS is 0, quote requests will fail immediately");
        }

        self.overflow_policy()?;
        self.price_source_kind()?;

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn quote_timeout(&self) -> Duration {
        Duration::from_secs(self.quote_timeout_secs)
    }

    pub fn overflow_policy(&self) -> Result<OverflowPolicy, String> {
        OverflowPolicy::parse(&self.overflow_policy, self.send_timeout())
    }

    pub fn price_source_kind(&self) -> Result<PriceSourceKind, String> {
        PriceSourceKind::parse(&self.price_source)
    }

    pub fn log_config(&self) {
        println!("Server Configuration:");
        println!("  WebSocket Bind Address: {}", self.bind_address);
        println!("  API Bind Address: {}", self.api_bind_address);
        println!("  Refresh Interval: {}s", self.refresh_interval_secs);
        println!("  Queue Capacity: {} ({})", self.queue_capacity, self.overflow_policy);
        println!("  Send Timeout: {}ms", self.send_timeout_ms);
        println!("  Price Source: {}", self.price_source);
        println!("  Auto Start: {}", self.auto_start);
        println!("  Log Level: {}", self.log_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            api_bind_address: DEFAULT_API_BIND_ADDRESS.to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            queue_capacity: BROADCAST_QUEUE_CAPACITY,
            overflow_policy: "drop_oldest".to_string(),
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            price_source: "simulated".to_string(),
            quote_timeout_secs: DEFAULT_QUOTE_TIMEOUT_SECS,
            auto_start: true,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_config_from_env() {
        let config = Config::from_env();
        assert!(!config.bind_address.is_empty());
        assert!(!config.api_bind_address.is_empty());
        assert!(!config.log_level.is_empty());
    }

    #[test]
    fn test_unparsable_value_falls_back_to_default() {
        env::set_var("FUND_SOCKET_TEST_INTERVAL", "soon");
        assert_eq!(env_or("FUND_SOCKET_TEST_INTERVAL", 30u64), 30);
        env::set_var("FUND_SOCKET_TEST_INTERVAL", " 45 ");
        assert_eq!(env_or("FUND_SOCKET_TEST_INTERVAL", 30u64), 45);
        env::remove_var("FUND_SOCKET_TEST_INTERVAL");
    }

    #[test]
    fn test_config_validation() {
        let mut config = base_config();
        assert!(config.validate().is_ok());

        config.refresh_interval_secs = 0;
        assert!(config.validate().is_err());

        config.refresh_interval_secs = 5;
        config.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.queue_capacity = 10;
        config.overflow_policy = "sometimes".to_string();
        assert!(config.validate().is_err());

        config.overflow_policy = "block".to_string();
        config.price_source = "bloomberg".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_policy_and_source_parsing() {
        let mut config = base_config();
        assert_eq!(config.overflow_policy(), Ok(OverflowPolicy::DropOldest));
        config.overflow_policy = "block".to_string();
        assert_eq!(
            config.overflow_policy(),
            Ok(OverflowPolicy::Block { timeout: Duration::from_millis(DEFAULT_SEND_TIMEOUT_MS) })
        );
        assert_eq!(config.price_source_kind(), Ok(PriceSourceKind::Simulated));
    }
}
