//! Per-instrument market state used for scoring and selection.

use serde::Serialize;

/// How often the venue settles funding.
///
/// Hyperliquid pays hourly; most CEX perpetuals settle every 8 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FundingInterval {
    Hourly,
    EightHours,
}

impl FundingInterval {
    /// Number of funding settlements in a (non-leap) year.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            FundingInterval::Hourly => 24.0 * 365.0,
            FundingInterval::EightHours => 3.0 * 365.0,
        }
    }
}

/// One instrument's current market state.
///
/// Numeric fields are kept as `f64` because they only feed heuristics; a value
/// the venue did not provide is either `None` or non-finite and the score model
/// degrades it to a worst-case component.
#[derive(Debug, Clone, Serialize)]
pub struct MarketSnapshot {
    /// Display label, e.g. "ETH-USD"
    pub pair: String,
    /// Instrument symbol, e.g. "ETH"
    pub base: String,
    pub mark_price: f64,
    /// Oracle / index price. Missing on some venues.
    pub oracle_price: Option<f64>,
    /// Fractional funding rate per settlement period, sign-carrying
    pub funding_rate: f64,
    pub funding_interval: FundingInterval,
    pub open_interest: f64,
    /// 24h notional volume in quote currency
    pub volume_24h: f64,
    /// Mark-vs-oracle relative deviation
    pub premium: f64,
    /// Maximum leverage offered by the venue, if parsable
    pub max_leverage: Option<f64>,
}

impl MarketSnapshot {
    /// Create a snapshot with only the funding fields set.
    pub fn new(base: &str, funding_rate: f64, funding_interval: FundingInterval) -> Self {
        let base = base.to_uppercase();
        Self {
            pair: format!("{}-USD", base),
            base,
            mark_price: 0.0,
            oracle_price: None,
            funding_rate,
            funding_interval,
            open_interest: 0.0,
            volume_24h: 0.0,
            premium: 0.0,
            max_leverage: None,
        }
    }

    pub fn with_prices(mut self, mark_price: f64, oracle_price: Option<f64>) -> Self {
        self.mark_price = mark_price;
        self.oracle_price = oracle_price;
        self
    }

    pub fn with_liquidity(mut self, volume_24h: f64, open_interest: f64) -> Self {
        self.volume_24h = volume_24h;
        self.open_interest = open_interest;
        self
    }

    pub fn with_premium(mut self, premium: f64) -> Self {
        self.premium = premium;
        self
    }

    pub fn with_max_leverage(mut self, max_leverage: f64) -> Self {
        self.max_leverage = Some(max_leverage);
        self
    }

    /// Annualized funding in percent: `rate × periods_per_year × 100`.
    ///
    /// Always derived from `funding_rate` so it can never go stale.
    pub fn annualized_funding_pct(&self) -> f64 {
        self.funding_rate * self.funding_interval.periods_per_year() * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annualized_funding_follows_rate() {
        let mut snapshot = MarketSnapshot::new("btc", 0.00015, FundingInterval::Hourly);
        assert_eq!(snapshot.base, "BTC");
        assert_eq!(snapshot.pair, "BTC-USD");
        assert!((snapshot.annualized_funding_pct() - 131.4).abs() < 1e-9);

        snapshot.funding_rate = -0.00009;
        assert!((snapshot.annualized_funding_pct() + 78.84).abs() < 1e-9);
    }

    #[test]
    fn test_eight_hour_interval() {
        let snapshot = MarketSnapshot::new("ETH", 0.0001, FundingInterval::EightHours);
        assert!((snapshot.annualized_funding_pct() - 10.95).abs() < 1e-9);
    }
}
