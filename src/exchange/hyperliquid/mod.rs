//! Hyperliquid exchange integration.
//!
//! Market data comes from the public `metaAndAssetCtxs` info request; balances,
//! positions and orders go through signed requests.
//!
//! # Funding Rate Notes
//!
//! Hyperliquid funding is paid **hourly**, so snapshots built here use
//! [`FundingInterval::Hourly`](crate::market::FundingInterval::Hourly) and
//! annualize over 8760 periods.

mod client;
mod types;

pub use client::{sign_body, HyperliquidClient};
pub use types::*;
