//! Market data for strategy evaluation.
//!
//! - `snapshot`: normalized per-instrument market state
//! - `cache`: last-known-good rows with TTL and static fallback
//! - `schedule`: strategy update boundaries (00:10 / 08:10 / 16:10 UTC)
//! - `stats`: aggregate funding statistics

mod cache;
mod fallback;
mod schedule;
mod snapshot;
mod stats;

pub use cache::{DataOrigin, MarketDataCache, MarketView, DEFAULT_CACHE_TTL};
pub use fallback::fallback_snapshots;
pub use schedule::{align_to_strategy_schedule, next_strategy_boundary, STRATEGY_UPDATE_SCHEDULE};
pub use snapshot::{FundingInterval, MarketSnapshot};
pub use stats::{aggregate_funding_stats, FundingStats};
