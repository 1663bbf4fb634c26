//! In-memory paper exchange for paper trading and tests.
//!
//! Orders fill immediately at the order price with a taker fee. There is no
//! margin model: the quote balance simply absorbs spot notionals and fees.

use super::traits::ExchangeClient;
use super::types::*;
use crate::market::MarketDataCache;
use crate::utils::decimal::decimal_from_f64;
use anyhow::{bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Quote asset the paper account is denominated in.
pub const PAPER_QUOTE_ASSET: &str = "USDC";

/// Holdings for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperHolding {
    /// Spot inventory in base units (negative = borrowed)
    pub spot: Decimal,
    /// Perp position in base units (negative = short)
    pub perp: Decimal,
}

/// Paper account state.
#[derive(Debug, Clone)]
pub struct PaperTradingState {
    pub initial_balance: Decimal,
    pub quote_balance: Decimal,
    pub holdings: HashMap<String, PaperHolding>,
    pub total_trading_fees: Decimal,
    pub order_count: u64,
}

impl Default for PaperTradingState {
    fn default() -> Self {
        Self {
            initial_balance: dec!(10000),
            quote_balance: dec!(10000),
            holdings: HashMap::new(),
            total_trading_fees: Decimal::ZERO,
            order_count: 0,
        }
    }
}

/// Calls that can be made to fail once, for exercising error paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    Balances,
    Positions,
    Trades,
    SpotOrder,
    PerpOrder,
}

/// Paper trading client implementing [`ExchangeClient`].
pub struct PaperExchange {
    state: Arc<RwLock<PaperTradingState>>,
    order_id_counter: AtomicU64,
    /// Explicit prices, take precedence over the market cache
    prices: Arc<RwLock<HashMap<String, Decimal>>>,
    market: Option<Arc<MarketDataCache>>,
    /// Trading fee rate (0.04% taker)
    fee_rate: Decimal,
    pending_failures: Mutex<HashSet<FailPoint>>,
}

impl PaperExchange {
    /// Create a paper account holding `initial_balance` of quote.
    pub fn new(initial_balance: Decimal) -> Self {
        let state = PaperTradingState {
            initial_balance,
            quote_balance: initial_balance,
            ..Default::default()
        };

        Self {
            state: Arc::new(RwLock::new(state)),
            order_id_counter: AtomicU64::new(1),
            prices: Arc::new(RwLock::new(HashMap::new())),
            market: None,
            fee_rate: dec!(0.0004),
            pending_failures: Mutex::new(HashSet::new()),
        }
    }

    /// Read reference prices from live market data when none was set explicitly.
    pub fn with_market_data(mut self, market: Arc<MarketDataCache>) -> Self {
        self.market = Some(market);
        self
    }

    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.write().await.insert(symbol.to_uppercase(), price);
    }

    /// Overwrite the holdings for `symbol`.
    pub async fn set_holding(&self, symbol: &str, spot: Decimal, perp: Decimal) {
        self.state
            .write()
            .await
            .holdings
            .insert(symbol.to_uppercase(), PaperHolding { spot, perp });
    }

    /// Make the next call through `point` fail.
    pub async fn fail_next(&self, point: FailPoint) {
        self.pending_failures.lock().await.insert(point);
    }

    pub async fn get_state(&self) -> PaperTradingState {
        self.state.read().await.clone()
    }

    pub async fn holding(&self, symbol: &str) -> PaperHolding {
        self.state
            .read()
            .await
            .holdings
            .get(&symbol.to_uppercase())
            .cloned()
            .unwrap_or_default()
    }

    async fn check_failure(&self, point: FailPoint) -> Result<()> {
        if self.pending_failures.lock().await.remove(&point) {
            bail!("Injected {:?} failure", point);
        }
        Ok(())
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }

    async fn reference_price(&self, symbol: &str) -> Option<Decimal> {
        if let Some(price) = self.prices.read().await.get(&symbol.to_uppercase()) {
            return Some(*price);
        }
        let market = self.market.as_ref()?;
        market.mark_price(symbol).await.and_then(decimal_from_f64)
    }

    fn validate_order(size: Decimal, price: Decimal) -> Result<()> {
        if size <= Decimal::ZERO {
            bail!("Order size must be positive (got {})", size);
        }
        if price <= Decimal::ZERO {
            bail!("Order price must be positive (got {})", price);
        }
        Ok(())
    }

    fn ack(&self) -> OrderAck {
        OrderAck {
            order_id: Some(self.next_order_id().to_string()),
            status: "filled".to_string(),
        }
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        self.check_failure(FailPoint::Balances).await?;
        let state = self.state.read().await;
        Ok(vec![Balance::new(PAPER_QUOTE_ASSET, state.quote_balance)])
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        self.check_failure(FailPoint::Positions).await?;
        let state = self.state.read().await;

        let mut positions = Vec::new();
        for (symbol, holding) in &state.holdings {
            if !holding.spot.is_zero() {
                positions.push(Position::spot(symbol, holding.spot));
            }
            if !holding.perp.is_zero() {
                positions.push(Position::perp(symbol, holding.perp));
            }
        }
        Ok(positions)
    }

    async fn get_recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
        self.check_failure(FailPoint::Trades).await?;
        match self.reference_price(symbol).await {
            Some(price) => Ok(vec![Trade::new(price.to_string())]),
            None => {
                debug!(%symbol, "No paper price available");
                Ok(Vec::new())
            }
        }
    }

    async fn place_spot_order(&self, order: &SpotOrder) -> Result<OrderAck> {
        self.check_failure(FailPoint::SpotOrder).await?;
        Self::validate_order(order.size, order.price)?;

        let mut state = self.state.write().await;
        let notional = order.size * order.price;
        let fee = notional * self.fee_rate;

        let holding = state
            .holdings
            .entry(order.symbol.to_uppercase())
            .or_default();
        match order.side {
            OrderSide::Buy => holding.spot += order.size,
            OrderSide::Sell => holding.spot -= order.size,
        }

        match order.side {
            OrderSide::Buy => state.quote_balance -= notional + fee,
            OrderSide::Sell => state.quote_balance += notional - fee,
        }
        state.total_trading_fees += fee;
        state.order_count += 1;

        if state.quote_balance < Decimal::ZERO {
            warn!(balance = %state.quote_balance, "Paper quote balance is negative");
        }

        let ack = self.ack();
        info!(
            order_id = ?ack.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.size,
            price = %order.price,
            fee = %fee,
            "Paper spot order filled"
        );
        Ok(ack)
    }

    async fn place_perp_order(&self, order: &PerpOrder) -> Result<OrderAck> {
        self.check_failure(FailPoint::PerpOrder).await?;
        Self::validate_order(order.size, order.price)?;

        let mut state = self.state.write().await;
        let signed = match order.side {
            OrderSide::Buy => order.size,
            OrderSide::Sell => -order.size,
        };

        let holding = state
            .holdings
            .entry(order.symbol.to_uppercase())
            .or_default();
        let next = holding.perp + signed;
        if order.reduce_only && (next.abs() > holding.perp.abs() || next * holding.perp < Decimal::ZERO) {
            bail!(
                "Reduce-only perp order would increase or flip the position ({} -> {})",
                holding.perp,
                next
            );
        }
        holding.perp = next;

        let fee = order.size * order.price * self.fee_rate;
        state.quote_balance -= fee;
        state.total_trading_fees += fee;
        state.order_count += 1;

        let ack = self.ack();
        info!(
            order_id = ?ack.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.size,
            price = %order.price,
            reduce_only = order.reduce_only,
            fee = %fee,
            "Paper perp order filled"
        );
        Ok(ack)
    }
}
