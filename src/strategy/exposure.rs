//! Net spot and perp exposure for one instrument.

use crate::exchange::{Position, PositionKind};
use rust_decimal::Decimal;
use serde::Serialize;

/// Signed exposure in base units. A short perp is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Exposure {
    pub spot: Decimal,
    pub perp: Decimal,
}

/// Sum every non-zero record for `symbol` (case-insensitive) into its leg.
pub fn summarize(positions: &[Position], symbol: &str) -> Exposure {
    let symbol = symbol.trim();
    if symbol.is_empty() {
        return Exposure::default();
    }

    positions
        .iter()
        .filter(|p| p.symbol.eq_ignore_ascii_case(symbol))
        .filter(|p| !p.size.is_zero())
        .fold(Exposure::default(), |mut acc, p| {
            match p.kind {
                PositionKind::Perp => acc.perp += p.size,
                PositionKind::Spot => acc.spot += p.size,
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_positions() {
        assert_eq!(summarize(&[], "ETH"), Exposure::default());
    }

    #[test]
    fn test_empty_symbol() {
        let positions = vec![Position::spot("ETH", dec!(1))];
        assert_eq!(summarize(&positions, ""), Exposure::default());
    }

    #[test]
    fn test_multiple_records_are_summed() {
        let positions = vec![
            Position::perp("ETH", dec!(2)),
            Position::perp("ETH", dec!(3)),
            Position::spot("BTC", dec!(1)),
        ];
        let exposure = summarize(&positions, "ETH");
        assert_eq!(exposure.perp, dec!(5));
        assert_eq!(exposure.spot, dec!(0));
    }

    #[test]
    fn test_case_insensitive_symbol_and_signed_sizes() {
        let positions = vec![
            Position::spot("eth", dec!(4.5)),
            Position::perp("Eth", dec!(-4.5)),
            Position::spot("ETH", dec!(0)),
        ];
        let exposure = summarize(&positions, "ETH");
        assert_eq!(exposure, Exposure { spot: dec!(4.5), perp: dec!(-4.5) });
    }
}
