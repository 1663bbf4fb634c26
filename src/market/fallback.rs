//! Static sample rows served when neither live data nor a fresh cache exists.

use super::{FundingInterval, MarketSnapshot};

/// Representative BTC / ETH / SOL snapshots.
pub fn fallback_snapshots() -> Vec<MarketSnapshot> {
    vec![
        MarketSnapshot::new("BTC", 0.00015, FundingInterval::Hourly)
            .with_prices(67_892.12, Some(67_840.15))
            .with_liquidity(2_465_870_000.0, 1_845_329_000.0)
            .with_premium(0.00042)
            .with_max_leverage(50.0),
        MarketSnapshot::new("ETH", -0.00009, FundingInterval::Hourly)
            .with_prices(3_542.76, Some(3_529.44))
            .with_liquidity(1_265_772_000.0, 842_511_000.0)
            .with_premium(-0.00031)
            .with_max_leverage(30.0),
        MarketSnapshot::new("SOL", 0.00021, FundingInterval::Hourly)
            .with_prices(188.63, Some(187.9))
            .with_liquidity(396_452_000.0, 265_194_000.0)
            .with_premium(0.00067)
            .with_max_leverage(25.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_rows() {
        let rows = fallback_snapshots();
        let bases: Vec<&str> = rows.iter().map(|r| r.base.as_str()).collect();
        assert_eq!(bases, vec!["BTC", "ETH", "SOL"]);
        assert!(rows.iter().all(|r| r.mark_price > 0.0));
    }
}
