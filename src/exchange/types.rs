//! Venue-neutral account and order types consumed by the rebalance engine.

use crate::error::EngineError;
use crate::utils::decimal::parse_decimal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote assets accepted as deployable capital, in lookup order.
pub const QUOTE_ASSETS: [&str; 3] = ["USD", "USDC", "USDT"];

/// Wallet balance for one asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Balance {
    pub asset: String,
    /// Amount free to trade
    pub available: Decimal,
}

impl Balance {
    pub fn new(asset: &str, available: Decimal) -> Self {
        Self {
            asset: asset.to_uppercase(),
            available,
        }
    }
}

/// Market a position lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionKind {
    Spot,
    Perp,
}

impl PositionKind {
    /// Classify a venue label. Anything mentioning "perp" is a perpetual.
    pub fn from_label(label: &str) -> Self {
        if label.to_ascii_lowercase().contains("perp") {
            PositionKind::Perp
        } else {
            PositionKind::Spot
        }
    }
}

/// Open position or spot holding, as reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    /// Signed size in base units (negative = short)
    pub size: Decimal,
    pub kind: PositionKind,
}

impl Position {
    pub fn spot(symbol: &str, size: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            size,
            kind: PositionKind::Spot,
        }
    }

    pub fn perp(symbol: &str, size: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            size,
            kind: PositionKind::Perp,
        }
    }
}

/// Recent public trade. Only the price is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Price as sent by the venue
    pub raw_price: String,
}

impl Trade {
    pub fn new(raw_price: impl Into<String>) -> Self {
        Self {
            raw_price: raw_price.into(),
        }
    }

    pub fn price(&self) -> Option<Decimal> {
        parse_decimal(&self.raw_price)
    }
}

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Buy for a positive delta, sell otherwise.
    pub fn for_delta(delta: Decimal) -> Self {
        if delta > Decimal::ZERO {
            OrderSide::Buy
        } else {
            OrderSide::Sell
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Spot limit order at the reference price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpotOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Decimal,
}

/// Perpetual limit order at the reference price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerpOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Decimal,
    pub reduce_only: bool,
}

/// Venue acknowledgement of a placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAck {
    pub order_id: Option<String>,
    pub status: String,
}

/// Reference price for sizing: the first recent trade's price.
pub fn extract_reference_price(symbol: &str, trades: &[Trade]) -> Result<Decimal, EngineError> {
    let first = trades.first().ok_or_else(|| EngineError::EmptyTrades {
        symbol: symbol.to_string(),
    })?;

    match first.price() {
        Some(price) if price > Decimal::ZERO => Ok(price),
        _ => Err(EngineError::UnparsablePrice {
            symbol: symbol.to_string(),
            raw: first.raw_price.clone(),
        }),
    }
}

/// Available quote balance: the first USD/USDC/USDT record, zero when absent.
pub fn select_quote_balance(balances: &[Balance]) -> Decimal {
    balances
        .iter()
        .find(|b| QUOTE_ASSETS.iter().any(|q| b.asset.eq_ignore_ascii_case(q)))
        .map(|b| b.available)
        .unwrap_or(Decimal::ZERO)
}
