//! Selection of the single best carry strategy from scored snapshots.

use super::score::ScoreModel;
use crate::market::MarketSnapshot;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Candidates scoring below this floor rank after every candidate above it.
pub const MIN_STRATEGY_SCORE: f64 = 3.5;

/// Leverage cap applied to the selected strategy.
pub const MAX_STRATEGY_LEVERAGE: f64 = 2.0;

/// Instruments the strategy is allowed to trade.
pub const DEFAULT_ALLOWED_BASES: [&str; 6] = ["HYPE", "BTC", "ETH", "SOL", "PUMP", "XPL"];

/// APY gap (percentage points) below which two candidates are considered tied.
const APY_TIE_EPSILON: f64 = 0.01;
/// Score gap above which the score nudges the APY ordering.
const SCORE_GAP_THRESHOLD: f64 = 0.1;
const SCORE_NUDGE_FACTOR: f64 = 0.01;

/// Which legs the hedge holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HedgeDirection {
    /// Positive funding: shorts receive, so short perp and hold spot
    ShortPerpLongSpot,
    /// Negative funding: longs receive, so long perp and short spot
    LongPerpShortSpot,
    Neutral,
}

impl HedgeDirection {
    pub fn from_funding(funding_rate: f64) -> Self {
        if funding_rate > 0.0 {
            HedgeDirection::ShortPerpLongSpot
        } else if funding_rate < 0.0 {
            HedgeDirection::LongPerpShortSpot
        } else {
            HedgeDirection::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HedgeDirection::ShortPerpLongSpot => "Short perp / Long spot",
            HedgeDirection::LongPerpShortSpot => "Long perp / Short spot",
            HedgeDirection::Neutral => "Neutral",
        }
    }
}

impl fmt::Display for HedgeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The trade picked for this evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Strategy {
    pub pair: String,
    pub base: String,
    /// Signed annualized funding in percent
    pub apy: f64,
    pub direction: HedgeDirection,
    /// Leverage capped to [1, 2]
    pub leverage: f64,
    pub score: f64,
}

/// A snapshot entering selection, optionally with a precomputed score.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub snapshot: MarketSnapshot,
    pub score: Option<f64>,
}

impl Candidate {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot,
            score: None,
        }
    }

    pub fn with_score(snapshot: MarketSnapshot, score: f64) -> Self {
        Self {
            snapshot,
            score: Some(score),
        }
    }
}

/// A filtered, scored candidate in ranking order.
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    pub snapshot: MarketSnapshot,
    pub apy: f64,
    pub score: f64,
}

fn ordering_of(value: f64) -> Ordering {
    if value > 0.0 {
        Ordering::Greater
    } else if value < 0.0 {
        Ordering::Less
    } else {
        Ordering::Equal
    }
}

/// Staged comparator: `Less` means `a` ranks ahead of `b`.
///
/// 1. score-floor partition
/// 2. near-tie on APY broken by score
/// 3. large score gap nudges the APY difference
/// 4. descending APY
pub fn compare_candidates(a: &RankedCandidate, b: &RankedCandidate, min_score: f64) -> Ordering {
    let a_below = a.score < min_score;
    let b_below = b.score < min_score;
    match (a_below, b_below) {
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }

    let apy_diff = b.apy - a.apy;
    let score_diff = b.score - a.score;

    if apy_diff.abs() < APY_TIE_EPSILON {
        return ordering_of(score_diff);
    }

    if score_diff.abs() > SCORE_GAP_THRESHOLD {
        return ordering_of(apy_diff - apy_diff.signum() * SCORE_NUDGE_FACTOR * score_diff);
    }

    ordering_of(apy_diff)
}

/// Stable insertion sort.
///
/// The staged comparator is not guaranteed to be transitive, which the std
/// sorts may reject with a panic. Candidate sets are bounded by the allow-list.
fn sort_candidates(candidates: &mut [RankedCandidate], min_score: f64) {
    for i in 1..candidates.len() {
        let mut j = i;
        while j > 0 && compare_candidates(&candidates[j - 1], &candidates[j], min_score) == Ordering::Greater {
            candidates.swap(j - 1, j);
            j -= 1;
        }
    }
}

/// Leverage for the strategy: `min(2, max_leverage)` floored at 1.
pub fn pick_leverage(max_leverage: Option<f64>) -> f64 {
    match max_leverage {
        Some(parsed) if parsed.is_finite() && parsed > 0.0 => parsed.min(MAX_STRATEGY_LEVERAGE).max(1.0),
        _ => 1.0,
    }
}

/// Picks the best candidate among the allowed instruments.
#[derive(Debug, Clone)]
pub struct StrategySelector {
    allowed_bases: HashSet<String>,
    min_score: f64,
    model: ScoreModel,
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_BASES)
    }
}

impl StrategySelector {
    /// Create a selector for the given allow-list (case-insensitive).
    pub fn new<I, S>(allowed_bases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            allowed_bases: allowed_bases
                .into_iter()
                .map(|b| b.as_ref().trim().to_uppercase())
                .filter(|b| !b.is_empty())
                .collect(),
            min_score: MIN_STRATEGY_SCORE,
            model: ScoreModel::new(),
        }
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn is_allowed(&self, base: &str) -> bool {
        !base.is_empty() && self.allowed_bases.contains(&base.to_uppercase())
    }

    /// Filter, score and sort candidates into ranking order.
    pub fn rank(&self, candidates: Vec<Candidate>) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = candidates
            .into_iter()
            .filter(|c| self.is_allowed(&c.snapshot.base))
            .filter_map(|c| {
                let apy = c.snapshot.annualized_funding_pct();
                if !apy.is_finite() {
                    return None;
                }
                let score = c
                    .score
                    .filter(|s| s.is_finite())
                    .unwrap_or_else(|| self.model.score(&c.snapshot));
                Some(RankedCandidate {
                    snapshot: c.snapshot,
                    apy,
                    score,
                })
            })
            .collect();

        sort_candidates(&mut ranked, self.min_score);
        ranked
    }

    /// Select the best strategy from raw snapshots.
    pub fn select(&self, snapshots: &[MarketSnapshot]) -> Option<Strategy> {
        self.select_candidates(snapshots.iter().cloned().map(Candidate::new).collect())
    }

    /// Select the best strategy from candidates that may carry a score.
    ///
    /// Prefers the first ranked candidate with positive APY and a score at or
    /// above the floor; otherwise falls back to the head of the ranking.
    /// Returns `None` only when no candidate survives filtering.
    pub fn select_candidates(&self, candidates: Vec<Candidate>) -> Option<Strategy> {
        let ranked = self.rank(candidates);

        let preferred = ranked
            .iter()
            .find(|c| c.apy > 0.0 && c.score >= self.min_score);

        let pick = match preferred {
            Some(pick) => pick,
            None => {
                let head = ranked.first()?;
                debug!(
                    base = %head.snapshot.base,
                    apy = head.apy,
                    score = head.score,
                    "No candidate above score floor with positive APY, using top ranked"
                );
                head
            }
        };

        Some(build_strategy(pick))
    }
}

fn build_strategy(pick: &RankedCandidate) -> Strategy {
    Strategy {
        pair: pick.snapshot.pair.clone(),
        base: pick.snapshot.base.clone(),
        apy: pick.apy,
        direction: HedgeDirection::from_funding(pick.snapshot.funding_rate),
        leverage: pick_leverage(pick.snapshot.max_leverage),
        score: pick.score,
    }
}
