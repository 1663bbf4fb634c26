//! Venue-agnostic capabilities the carry engine depends on.
//!
//! The engine never talks HTTP itself: live trading plugs in
//! [`HyperliquidClient`](super::HyperliquidClient), paper trading and tests plug in
//! [`PaperExchange`](super::PaperExchange).

use super::types::{Balance, OrderAck, PerpOrder, Position, SpotOrder, Trade};
use crate::market::MarketSnapshot;
use anyhow::Result;
use async_trait::async_trait;

/// Account queries and order placement on a single venue.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    async fn get_balances(&self) -> Result<Vec<Balance>>;

    /// Spot holdings and perpetual positions, signed.
    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// Most recent trades for `symbol`, newest first.
    async fn get_recent_trades(&self, symbol: &str) -> Result<Vec<Trade>>;

    async fn place_spot_order(&self, order: &SpotOrder) -> Result<OrderAck>;

    async fn place_perp_order(&self, order: &PerpOrder) -> Result<OrderAck>;
}

/// Source of per-instrument market snapshots.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_snapshots(&self) -> Result<Vec<MarketSnapshot>>;
}
