use chrono::{DateTime, Utc};

use crate::config::PORTFOLIO_CODE;
use crate::models::{PortfolioSummary, Position, Quote, ValueRecord};

// Pure: inputs are assumed validated upstream (finite, non-negative shares).
// `timestamp` is when the valuation was made, not when the quote was published.
pub fn compute_value(quote: &Quote, position: &Position, timestamp: DateTime<Utc>) -> ValueRecord {
    let estimate_value = position.shares * quote.price;
    let estimate_change = estimate_value - position.shares * position.cost_price;

    ValueRecord {
        fund_code: position.fund_code.clone(),
        current_price: quote.price,
        change_rate: quote.change_rate,
        estimate_value,
        estimate_change,
        timestamp,
    }
}

// Portfolio-wide record in the same shape as a per-fund one.
pub fn portfolio_value(summary: &PortfolioSummary, timestamp: DateTime<Utc>) -> ValueRecord {
    ValueRecord {
        fund_code: PORTFOLIO_CODE.to_string(),
        current_price: summary.total_value,
        change_rate: summary.total_gain_rate,
        estimate_value: summary.total_value,
        estimate_change: summary.total_gain,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn test_price_rise_example() {
        let position = Position::new("000001", 100.0, 1.00);
        let quote = Quote::new("000001", 1.10, 10.0);
        let now = Utc::now();

        let record = compute_value(&quote, &position, now);
        assert_eq!(record.fund_code, "000001");
        assert!((record.estimate_value - 110.0).abs() < EPS);
        assert!((record.estimate_change - 10.0).abs() < EPS);
        assert_eq!(record.change_rate, 10.0);
        assert_eq!(record.timestamp, now);
    }

    #[test]
    fn test_record_is_stamped_with_valuation_time() {
        let mut quote = Quote::new("000001", 1.10, 10.0);
        quote.as_of = Utc::now() - chrono::Duration::days(3);
        let now = Utc::now();

        let record = compute_value(&quote, &Position::new("000001", 1.0, 1.0), now);
        assert_eq!(record.timestamp, now);
        assert_ne!(record.timestamp, quote.as_of);
    }

    #[test]
    fn test_estimate_value_is_shares_times_price() {
        let cases = [(0.0, 3.2), (1.0, 0.0), (2500.5, 1.2345), (17.0, 99.99)];
        for (shares, price) in cases {
            let record = compute_value(&Quote::new("x", price, -0.4), &Position::new("x", shares, 1.5), Utc::now());
            assert!((record.estimate_value - shares * price).abs() < EPS);
            assert!((record.estimate_change - (shares * price - shares * 1.5)).abs() < EPS);
            assert_eq!(record.change_rate, -0.4);
        }
    }

    #[test]
    fn test_portfolio_value_uses_sentinel_code() {
        let summary = PortfolioSummary {
            total_value: 1200.0,
            total_cost: 1000.0,
            total_gain: 200.0,
            total_gain_rate: 20.0,
            ..Default::default()
        };
        let now = Utc::now();
        let record = portfolio_value(&summary, now);
        assert_eq!(record.fund_code, PORTFOLIO_CODE);
        assert_eq!(record.estimate_value, 1200.0);
        assert_eq!(record.estimate_change, 200.0);
        assert_eq!(record.change_rate, 20.0);
        assert_eq!(record.timestamp, now);
    }
}
