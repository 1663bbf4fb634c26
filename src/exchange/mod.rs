//! Exchange integrations for the carry engine.
//!
//! ## Hyperliquid
//! Signed REST client for market data, balances, positions and orders.
//!
//! ## Paper
//! In-memory [`PaperExchange`] used for paper trading and tests.

pub mod hyperliquid;
pub mod mock;
mod traits;
mod types;

pub use hyperliquid::HyperliquidClient;
pub use mock::{FailPoint, PaperExchange};
pub use traits::{ExchangeClient, MarketDataSource};
pub use types::*;
