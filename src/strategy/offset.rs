//! Price adjustment applied to feed prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Percent and absolute offset, optionally on the inverted price.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RateOffset {
    /// Fraction, e.g. `0.01` for +1%
    pub percent: Decimal,
    pub absolute: Decimal,
    /// Apply the percent offset before the absolute one
    pub percent_first: bool,
    pub invert: bool,
}

impl RateOffset {
    pub fn is_modified(&self) -> bool {
        !self.percent.is_zero() || !self.absolute.is_zero() || self.invert
    }

    pub fn apply(&self, price: Decimal) -> Decimal {
        let price = if self.invert && !price.is_zero() {
            Decimal::ONE / price
        } else {
            price
        };
        let factor = Decimal::ONE + self.percent;
        if self.percent_first {
            price * factor + self.absolute
        } else {
            (price + self.absolute) * factor
        }
    }
}
