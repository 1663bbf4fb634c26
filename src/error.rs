//! Typed failures of the carry engine.
//!
//! Collaborator traits return `anyhow::Result`; the engine surfaces the cases
//! callers need to tell apart (bad price, missing credentials, partial hedge)
//! through [`EngineError`].

use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

/// One side of the two-leg hedge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Spot,
    Perp,
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Leg::Spot => write!(f, "spot"),
            Leg::Perp => write!(f, "perp"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A price is load-bearing for every notional computation.
    #[error("A positive price is required to compute hedge sizes (got {price})")]
    InvalidPrice { price: Decimal },

    #[error("Invalid reference price for {symbol}: {raw}")]
    UnparsablePrice { symbol: String, raw: String },

    #[error("Exchange credentials are missing. Set API_KEY and API_SECRET in env.")]
    MissingCredentials,

    #[error("No trade data returned for {symbol}")]
    EmptyTrades { symbol: String },

    /// Only sample rows are available; they must not pick a traded instrument.
    #[error("Live market data unavailable: {reason}")]
    MarketDataUnavailable { reason: String },

    /// Nothing was placed this cycle.
    #[error("{leg} order failed: {message}")]
    OrderFailed { leg: Leg, message: String },

    /// One leg went through and the other did not. The placed leg is left as-is.
    #[error("Partial hedge: {placed} leg placed, {failed} leg failed: {message}")]
    PartialHedge {
        placed: Leg,
        failed: Leg,
        message: String,
    },
}

impl EngineError {
    /// True when the book was left with only one leg adjusted.
    pub fn is_partial(&self) -> bool {
        matches!(self, EngineError::PartialHedge { .. })
    }
}
