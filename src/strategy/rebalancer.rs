//! Order diff between current and target hedge exposure, and its execution.
//!
//! The engine sizes the target with [`HedgeSizer`], diffs it against the
//! signed exposure reported by the venue and places at most one order per leg.
//! The same diff serves initial deployment (flat book) and periodic rebalances.

use super::exposure::Exposure;
use super::sizing::{HedgeSizer, HedgeTarget, DEFAULT_HEDGE_RATIO};
use crate::error::{EngineError, Leg};
use crate::exchange::{ExchangeClient, OrderAck, OrderSide, PerpOrder, SpotOrder};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Order diff for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancePlan {
    pub symbol: String,
    /// Reference price every order is placed at
    pub price: Decimal,
    pub leverage: Decimal,
    pub target: HedgeTarget,
    pub current: Exposure,
    /// `target.spot - current.spot`; positive = buy
    pub spot_delta: Decimal,
    /// `-target.perp - current.perp`; positive = buy
    pub perp_delta: Decimal,
}

impl RebalancePlan {
    /// Spot order closing the spot gap, if any.
    pub fn spot_order(&self) -> Option<SpotOrder> {
        if self.spot_delta.is_zero() {
            return None;
        }
        Some(SpotOrder {
            symbol: self.symbol.clone(),
            side: OrderSide::for_delta(self.spot_delta),
            size: self.spot_delta.abs(),
            price: self.price,
        })
    }

    /// Perp order closing the perp gap, if any.
    ///
    /// Reduce-only when the order shrinks the existing position without
    /// flipping it.
    pub fn perp_order(&self) -> Option<PerpOrder> {
        if self.perp_delta.is_zero() {
            return None;
        }
        let current = self.current.perp;
        let next = current + self.perp_delta;
        let reduce_only = !current.is_zero() && next.abs() < current.abs() && next * current >= Decimal::ZERO;

        Some(PerpOrder {
            symbol: self.symbol.clone(),
            side: OrderSide::for_delta(self.perp_delta),
            size: self.perp_delta.abs(),
            price: self.price,
            reduce_only,
        })
    }

    /// True when both legs already match the target.
    pub fn is_balanced(&self) -> bool {
        self.spot_delta.is_zero() && self.perp_delta.is_zero()
    }
}

/// Result of planning a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Orders(RebalancePlan),
    /// Both target sizes are zero; nothing is placed
    NoDeploy { symbol: String, price: Decimal },
}

/// One placed order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegFill {
    pub side: OrderSide,
    pub size: Decimal,
    pub ack: OrderAck,
}

impl LegFill {
    /// Short human description, e.g. "BUY 1.5 ETH".
    pub fn describe(&self, symbol: &str) -> String {
        format!("{} {} {}", self.side, self.size.normalize(), symbol)
    }
}

/// What an executed plan placed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub symbol: String,
    pub spot: Option<LegFill>,
    pub perp: Option<LegFill>,
}

impl ExecutionReport {
    pub fn orders_placed(&self) -> usize {
        self.spot.iter().count() + self.perp.iter().count()
    }
}

/// Computes and executes rebalance diffs.
#[derive(Debug, Clone, Default)]
pub struct RebalanceEngine {
    sizer: HedgeSizer,
}

impl RebalanceEngine {
    pub fn new() -> Self {
        Self {
            sizer: HedgeSizer::new(),
        }
    }

    /// Diff the target for `budget` at `price` against `current`.
    pub fn plan(
        &self,
        symbol: &str,
        budget: Decimal,
        price: Decimal,
        leverage: Decimal,
        current: Exposure,
    ) -> Result<PlanOutcome, EngineError> {
        let target = self.sizer.size(budget, price, leverage, DEFAULT_HEDGE_RATIO)?;

        if target.is_empty() {
            debug!(%symbol, %budget, "Target notional is zero, nothing to deploy");
            return Ok(PlanOutcome::NoDeploy {
                symbol: symbol.to_string(),
                price,
            });
        }

        let spot_delta = target.spot_size - current.spot;
        let perp_delta = -target.perp_size - current.perp;

        debug!(
            %symbol,
            %price,
            target_spot = %target.spot_size,
            target_perp = %target.perp_size,
            current_spot = %current.spot,
            current_perp = %current.perp,
            %spot_delta,
            %perp_delta,
            "Computed rebalance diff"
        );

        Ok(PlanOutcome::Orders(RebalancePlan {
            symbol: symbol.to_string(),
            price,
            leverage,
            target,
            current,
            spot_delta,
            perp_delta,
        }))
    }

    /// Place the spot leg, then the perp leg.
    ///
    /// A failure stops the remaining leg. An already placed spot leg is not
    /// unwound and the failure is reported as [`EngineError::PartialHedge`].
    pub async fn execute(
        &self,
        client: &dyn ExchangeClient,
        plan: &RebalancePlan,
    ) -> Result<ExecutionReport, EngineError> {
        let mut report = ExecutionReport {
            symbol: plan.symbol.clone(),
            spot: None,
            perp: None,
        };

        if let Some(order) = plan.spot_order() {
            info!(
                symbol = %order.symbol,
                side = %order.side,
                quantity = %order.size,
                price = %order.price,
                "[ORDER] Placing spot order"
            );
            let ack = client
                .place_spot_order(&order)
                .await
                .map_err(|e| EngineError::OrderFailed {
                    leg: Leg::Spot,
                    message: format!("{:#}", e),
                })?;
            report.spot = Some(LegFill {
                side: order.side,
                size: order.size,
                ack,
            });
        }

        if let Some(order) = plan.perp_order() {
            info!(
                symbol = %order.symbol,
                side = %order.side,
                quantity = %order.size,
                price = %order.price,
                reduce_only = order.reduce_only,
                "[ORDER] Placing perp order"
            );
            match client.place_perp_order(&order).await {
                Ok(ack) => {
                    report.perp = Some(LegFill {
                        side: order.side,
                        size: order.size,
                        ack,
                    });
                }
                Err(e) => {
                    let message = format!("{:#}", e);
                    if report.spot.is_some() {
                        warn!(symbol = %plan.symbol, error = %message, "Perp leg failed after spot leg was placed");
                        return Err(EngineError::PartialHedge {
                            placed: Leg::Spot,
                            failed: Leg::Perp,
                            message,
                        });
                    }
                    return Err(EngineError::OrderFailed {
                        leg: Leg::Perp,
                        message,
                    });
                }
            }
        }

        if report.orders_placed() == 0 {
            info!(symbol = %plan.symbol, "Hedge already at target, no orders placed");
        }

        Ok(report)
    }
}
