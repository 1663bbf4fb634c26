//! Multi-factor desirability score for a carry trade on one instrument.
//!
//! Four components, each normalized to [0, 1]:
//! - funding: annualized funding centered at 0.5, saturating at ±200% APY
//! - volume: log-scaled 24h notional volume against a $5B reference
//! - risk: penalizes premium and mark/oracle drift
//! - efficiency: log-scaled open interest and available leverage
//!
//! The weighted sum is scaled to [0, 10] and rounded to two decimals.
//! Scoring is total: missing or non-finite inputs degrade a component, they
//! never produce an error.

use crate::market::MarketSnapshot;

/// APY (in %) at which the funding component saturates.
pub const MAX_APY_CONSIDERED: f64 = 200.0;
/// $5B reference volume.
pub const MAX_VOLUME: f64 = 5_000_000_000.0;
/// $2B reference open interest.
pub const MAX_OPEN_INTEREST: f64 = 2_000_000_000.0;
/// 0.25% premium saturates the premium penalty.
pub const MAX_PREMIUM_DEVIATION: f64 = 0.0025;
/// 1% mark/oracle drift saturates the drift penalty.
pub const MAX_BASIS_DRIFT: f64 = 0.01;
pub const MAX_LEVERAGE: f64 = 50.0;

const FUNDING_WEIGHT: f64 = 0.35;
const VOLUME_WEIGHT: f64 = 0.25;
const RISK_WEIGHT: f64 = 0.20;
const EFFICIENCY_WEIGHT: f64 = 0.20;

/// Clamp to the unit interval. NaN maps to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// `log10(value) / log10(reference)` clamped to [0, 1]; 0 for non-positive input.
pub fn normalize_log(value: f64, reference: f64) -> f64 {
    if !value.is_finite() || value <= 0.0 {
        return 0.0;
    }
    clamp_unit(value.log10() / reference.log10())
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

/// Per-component breakdown, useful for logging why a pair ranks where it does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub funding: f64,
    pub volume: f64,
    pub risk: f64,
    pub efficiency: f64,
}

impl ScoreBreakdown {
    /// Weighted total on the 0–10 scale, rounded to two decimals.
    pub fn total(&self) -> f64 {
        let weighted = self.funding * FUNDING_WEIGHT
            + self.volume * VOLUME_WEIGHT
            + self.risk * RISK_WEIGHT
            + self.efficiency * EFFICIENCY_WEIGHT;
        let scaled = clamp_unit(weighted) * 10.0;
        (scaled * 100.0).round() / 100.0
    }
}

/// Stateless score model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreModel;

impl ScoreModel {
    pub fn new() -> Self {
        Self
    }

    /// Score a snapshot on the 0–10 scale.
    pub fn score(&self, snapshot: &MarketSnapshot) -> f64 {
        self.breakdown(snapshot).total()
    }

    pub fn breakdown(&self, snapshot: &MarketSnapshot) -> ScoreBreakdown {
        ScoreBreakdown {
            funding: funding_component(snapshot),
            volume: volume_component(snapshot),
            risk: risk_component(snapshot),
            efficiency: efficiency_component(snapshot),
        }
    }
}

fn funding_component(snapshot: &MarketSnapshot) -> f64 {
    let apy = finite(snapshot.annualized_funding_pct()).unwrap_or(0.0);
    clamp_unit((apy + MAX_APY_CONSIDERED) / (MAX_APY_CONSIDERED * 2.0))
}

fn volume_component(snapshot: &MarketSnapshot) -> f64 {
    let volume = finite(snapshot.volume_24h).unwrap_or(0.0);
    normalize_log(volume + 1.0, MAX_VOLUME)
}

fn risk_component(snapshot: &MarketSnapshot) -> f64 {
    let premium = finite(snapshot.premium).unwrap_or(0.0).abs();
    let premium_penalty = clamp_unit(premium / MAX_PREMIUM_DEVIATION);

    let mark = finite(snapshot.mark_price);
    let oracle = snapshot.oracle_price.and_then(finite).or(mark);

    // Zero prices fall through to the next candidate, ending at 1.
    let basis = [oracle, mark]
        .into_iter()
        .flatten()
        .find(|price| *price != 0.0)
        .unwrap_or(1.0);
    let reference = mark.or(oracle).unwrap_or(0.0);
    let drift = (reference - basis).abs() / basis.abs();
    let drift_penalty = clamp_unit(drift / MAX_BASIS_DRIFT);

    1.0 - clamp_unit(premium_penalty * 0.6 + drift_penalty * 0.4)
}

fn efficiency_component(snapshot: &MarketSnapshot) -> f64 {
    let open_interest = finite(snapshot.open_interest).unwrap_or(0.0);
    let leverage = snapshot.max_leverage.and_then(finite).unwrap_or(1.0);

    let leverage_score = clamp_unit(leverage / MAX_LEVERAGE);
    let oi_score = normalize_log(open_interest + 1.0, MAX_OPEN_INTEREST);
    clamp_unit(oi_score * 0.6 + leverage_score * 0.4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{fallback_snapshots, FundingInterval};

    fn sample() -> MarketSnapshot {
        MarketSnapshot::new("ETH", 0.0002, FundingInterval::Hourly)
            .with_prices(3000.0, Some(3000.0))
            .with_liquidity(1e9, 5e8)
            .with_premium(0.0001)
            .with_max_leverage(20.0)
    }

    #[test]
    fn test_score_in_range() {
        let model = ScoreModel::new();
        for row in fallback_snapshots().iter().chain(std::iter::once(&sample())) {
            let score = model.score(row);
            assert!((0.0..=10.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_score_is_deterministic() {
        let model = ScoreModel::new();
        let row = sample();
        let first = model.score(&row);
        for _ in 0..10 {
            assert_eq!(model.score(&row), first);
        }
    }

    #[test]
    fn test_garbage_input_degrades_instead_of_failing() {
        let model = ScoreModel::new();
        let mut row = MarketSnapshot::new("XPL", f64::NAN, FundingInterval::Hourly);
        row.mark_price = f64::NAN;
        row.volume_24h = f64::INFINITY;
        row.open_interest = -5.0;
        row.premium = f64::NAN;
        row.max_leverage = Some(f64::NAN);

        let score = model.score(&row);
        assert!(score.is_finite());
        assert!((0.0..=10.0).contains(&score));

        let breakdown = model.breakdown(&row);
        assert_eq!(breakdown.funding, 0.5);
        assert_eq!(breakdown.volume, 0.0);
        // No usable price: basis falls back to 1 against a zero reference
        assert!((breakdown.risk - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_funding_component_saturates() {
        let model = ScoreModel::new();
        let hot = MarketSnapshot::new("BTC", 0.01, FundingInterval::Hourly);
        let cold = MarketSnapshot::new("BTC", -0.01, FundingInterval::Hourly);
        assert_eq!(model.breakdown(&hot).funding, 1.0);
        assert_eq!(model.breakdown(&cold).funding, 0.0);
    }

    #[test]
    fn test_volume_component() {
        assert_eq!(normalize_log(0.0 + 1.0, MAX_VOLUME), 0.0);
        assert_eq!(normalize_log(-3.0, MAX_VOLUME), 0.0);
        assert_eq!(normalize_log(MAX_VOLUME * 10.0, MAX_VOLUME), 1.0);
    }

    #[test]
    fn test_risk_penalizes_premium_and_drift() {
        let model = ScoreModel::new();
        let calm = sample();
        let stressed = sample().with_prices(3060.0, Some(3000.0)).with_premium(0.003);

        assert!(model.breakdown(&calm).risk > 0.9);
        assert_eq!(model.breakdown(&stressed).risk, 0.0);
    }

    #[test]
    fn test_zero_prices_use_unit_basis() {
        let model = ScoreModel::new();
        let row = MarketSnapshot::new("SOL", 0.0, FundingInterval::Hourly).with_prices(0.0, Some(0.0));
        // |0 - 1| / 1 = 100% drift, fully penalized
        let risk = model.breakdown(&row).risk;
        assert!((risk - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_missing_leverage_defaults_to_one() {
        let model = ScoreModel::new();
        let row = MarketSnapshot::new("BTC", 0.0, FundingInterval::Hourly);
        let efficiency = model.breakdown(&row).efficiency;
        assert!((efficiency - 0.4 / MAX_LEVERAGE).abs() < 1e-12);
    }
}
