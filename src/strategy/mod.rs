//! Carry strategy logic.
//!
//! Contains the core logic for:
//! - Scoring and selecting the best funding carry
//! - Sizing the spot and perp legs of a hedge
//! - Diffing and executing rebalances against current exposure
//! - Scheduling the initial hedge and periodic rebalances

mod exposure;
mod rebalancer;
mod scheduler;
mod score;
mod selector;
mod sizing;

pub use exposure::{summarize, Exposure};
pub use rebalancer::{ExecutionReport, LegFill, PlanOutcome, RebalanceEngine, RebalancePlan};
pub use scheduler::{
    resolve_budget, CycleAction, CycleKind, CycleOutcome, CycleReport, RebalanceScheduler,
    SchedulerSettings, SchedulerStats,
};
pub use score::{clamp_unit, normalize_log, ScoreBreakdown, ScoreModel};
pub use selector::{
    compare_candidates, pick_leverage, Candidate, HedgeDirection, RankedCandidate, Strategy,
    StrategySelector, DEFAULT_ALLOWED_BASES, MAX_STRATEGY_LEVERAGE, MIN_STRATEGY_SCORE,
};
pub use sizing::{HedgeSizer, HedgeTarget, DEFAULT_HEDGE_RATIO};
