//! Conversion of a quote budget into delta-neutral hedge sizes.

use crate::error::EngineError;
use rust_decimal::Decimal;
use serde::Serialize;

/// Hedge ratio used by the engine: one unit of perp per unit of spot notional.
pub const DEFAULT_HEDGE_RATIO: Decimal = Decimal::ONE;

/// Target holdings in base units. Both sizes are non-negative; the perp leg
/// is held short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HedgeTarget {
    pub spot_size: Decimal,
    pub perp_size: Decimal,
}

impl HedgeTarget {
    /// True when there is nothing to deploy.
    pub fn is_empty(&self) -> bool {
        self.spot_size <= Decimal::ZERO && self.perp_size <= Decimal::ZERO
    }
}

/// Sizes the two legs of a hedge from a quote budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct HedgeSizer;

impl HedgeSizer {
    pub fn new() -> Self {
        Self
    }

    /// `spot = quote × ratio / price`, `perp = quote × ratio × leverage / price`.
    ///
    /// Leverage scales the perp leg only. A negative quote amount is treated
    /// as zero; a non-positive price is an error.
    pub fn size(
        &self,
        quote_amount: Decimal,
        price: Decimal,
        leverage: Decimal,
        hedge_ratio: Decimal,
    ) -> Result<HedgeTarget, EngineError> {
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidPrice { price });
        }

        let notional = quote_amount.max(Decimal::ZERO) * hedge_ratio;
        Ok(HedgeTarget {
            spot_size: notional / price,
            perp_size: notional * leverage / price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_leverage_scales_perp_only() {
        let target = HedgeSizer::new()
            .size(dec!(10000), dec!(2000), dec!(3), DEFAULT_HEDGE_RATIO)
            .unwrap();
        assert_eq!(target.spot_size, dec!(5));
        assert_eq!(target.perp_size, dec!(15));
    }

    #[test]
    fn test_non_positive_price_fails() {
        let sizer = HedgeSizer::new();
        for price in [dec!(0), dec!(-1)] {
            let err = sizer.size(dec!(100), price, dec!(1), dec!(1)).unwrap_err();
            assert!(matches!(err, EngineError::InvalidPrice { .. }));
        }
    }

    #[test]
    fn test_negative_quote_clamps_to_zero() {
        let target = HedgeSizer::new()
            .size(dec!(-500), dec!(2000), dec!(2), dec!(1))
            .unwrap();
        assert_eq!(target, HedgeTarget::default());
        assert!(target.is_empty());
    }

    #[test]
    fn test_hedge_ratio_scales_both_legs() {
        let target = HedgeSizer::new()
            .size(dec!(1000), dec!(100), dec!(2), dec!(0.5))
            .unwrap();
        assert_eq!(target.spot_size, dec!(5));
        assert_eq!(target.perp_size, dec!(10));
    }
}
