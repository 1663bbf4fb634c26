//! Aggregate statistics over a set of market snapshots.

use super::MarketSnapshot;
use serde::Serialize;

/// Summary of the funding landscape for logging and the `scan` command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingStats {
    pub count: usize,
    pub total_open_interest: f64,
    /// Mean per-period funding rate, `None` when there are no rows
    pub avg_funding: Option<f64>,
    /// Mean annualized funding in percent, `None` when there are no rows
    pub avg_apy: Option<f64>,
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Aggregate funding statistics. Non-finite values count as zero.
pub fn aggregate_funding_stats(rows: &[MarketSnapshot]) -> FundingStats {
    if rows.is_empty() {
        return FundingStats {
            count: 0,
            total_open_interest: 0.0,
            avg_funding: None,
            avg_apy: None,
        };
    }

    let count = rows.len();
    let total_open_interest = rows.iter().map(|r| finite_or_zero(r.open_interest)).sum();
    let funding_sum: f64 = rows.iter().map(|r| finite_or_zero(r.funding_rate)).sum();
    let apy_sum: f64 = rows
        .iter()
        .map(|r| finite_or_zero(r.annualized_funding_pct()))
        .sum();

    FundingStats {
        count,
        total_open_interest,
        avg_funding: Some(funding_sum / count as f64),
        avg_apy: Some(apy_sum / count as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FundingInterval;

    #[test]
    fn test_empty_rows() {
        let stats = aggregate_funding_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_apy, None);
        assert_eq!(stats.avg_funding, None);
    }

    #[test]
    fn test_averages_and_totals() {
        let rows = vec![
            MarketSnapshot::new("BTC", 0.0002, FundingInterval::Hourly).with_liquidity(0.0, 100.0),
            MarketSnapshot::new("ETH", -0.0001, FundingInterval::Hourly)
                .with_liquidity(0.0, f64::NAN),
        ];
        let stats = aggregate_funding_stats(&rows);

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_open_interest, 100.0);
        assert!((stats.avg_funding.unwrap() - 0.00005).abs() < 1e-12);
        assert!((stats.avg_apy.unwrap() - 43.8).abs() < 1e-9);
    }
}
