//! # Funding Carry
//!
//! Funding-rate carry on Hyperliquid: score and select the best carry among
//! an allow-list of perpetuals, size a delta-neutral spot/perp hedge, and keep
//! it at target with periodic rebalances.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `error`: Typed engine errors
//! - `exchange`: Hyperliquid REST client and the paper exchange
//! - `market`: Market snapshots, caching with fallback, strategy schedule
//! - `notify`: Telegram and log notifications
//! - `strategy`: Scoring, selection, sizing, rebalancing and scheduling
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod exchange;
pub mod market;
pub mod notify;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::EngineError;
