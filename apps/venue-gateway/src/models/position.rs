//! Position rows as streamed by the venue.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A held position in a single instrument.
///
/// `quantity` is signed: positive for long, negative for short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed share count.
    pub quantity: i64,
    /// Average acquisition cost per share.
    pub avg_cost: Decimal,
    /// Last price the venue reported for this row, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_price: Option<Decimal>,
    /// Settlement currency.
    pub currency: String,
}

impl Position {
    /// Market value at the last known price, `None` without a price.
    #[must_use]
    pub fn market_value(&self) -> Option<Decimal> {
        self.last_price.map(|p| p * Decimal::from(self.quantity))
    }

    /// Unrealized P&L against average cost, `None` without a price.
    #[must_use]
    pub fn unrealized_pnl(&self) -> Option<Decimal> {
        self.last_price
            .map(|p| (p - self.avg_cost) * Decimal::from(self.quantity))
    }

    /// Whether this row is flat.
    #[must_use]
    pub const fn is_flat(&self) -> bool {
        self.quantity == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn long_position() -> Position {
        Position {
            symbol: "AAPL".to_string(),
            quantity: 20,
            avg_cost: dec!(140),
            last_price: Some(dec!(150)),
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn market_value_uses_last_price() {
        assert_eq!(long_position().market_value(), Some(dec!(3000)));
    }

    #[test]
    fn unrealized_pnl_is_signed() {
        assert_eq!(long_position().unrealized_pnl(), Some(dec!(200)));

        let mut short = long_position();
        short.quantity = -20;
        assert_eq!(short.unrealized_pnl(), Some(dec!(-200)));
    }

    #[test]
    fn missing_price_yields_none() {
        let mut pos = long_position();
        pos.last_price = None;
        assert_eq!(pos.market_value(), None);
        assert_eq!(pos.unrealized_pnl(), None);
    }
}
