//! Fixed-precision decimal numbers.
//!
//! Every venue quotes prices and volumes at its own precision. A `Number`
//! carries that precision alongside the value so that comparisons between a
//! live offer and a freshly computed target can be normalized first.

use crate::error::{EngineError, Result};
use crate::utils::decimal::{round_to_precision, truncate_to_precision};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default tolerance used when comparing prices and volumes.
pub const DEFAULT_EPSILON: Decimal = dec!(0.0001);

/// Decimal value with an explicit number of digits after the point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Number {
    value: Decimal,
    precision: u32,
}

impl Number {
    /// Create a number, rounding `value` to `precision` digits.
    pub fn new(value: Decimal, precision: u32) -> Self {
        Self {
            value: round_to_precision(value, precision),
            precision,
        }
    }

    pub fn zero(precision: u32) -> Self {
        Self::new(Decimal::ZERO, precision)
    }

    /// Parse a venue-supplied string at the given precision.
    pub fn parse(field: &'static str, raw: &str, precision: u32) -> Result<Self> {
        let value = Decimal::from_str(raw.trim()).map_err(|e| EngineError::Parse {
            field,
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(value, precision))
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    pub fn add(&self, other: Number) -> Number {
        Number::new(self.value + other.value, self.precision.max(other.precision))
    }

    pub fn subtract(&self, other: Number) -> Number {
        Number::new(self.value - other.value, self.precision.max(other.precision))
    }

    pub fn multiply(&self, other: Number) -> Number {
        Number::new(self.value * other.value, self.precision.max(other.precision))
    }

    /// Multiply by a plain factor, keeping this number's precision.
    pub fn scale(&self, factor: Decimal) -> Number {
        Number::new(self.value * factor, self.precision)
    }

    /// `1 / self` at the same precision; zero inverts to zero.
    pub fn invert(&self) -> Number {
        if self.value.is_zero() {
            return *self;
        }
        Number::new(Decimal::ONE / self.value, self.precision)
    }

    /// Reduce precision to at most `precision` digits, truncating toward zero.
    pub fn cap_precision(&self, precision: u32) -> Number {
        let precision = self.precision.min(precision);
        Number {
            value: truncate_to_precision(self.value, precision),
            precision,
        }
    }

    /// Compare after normalizing both sides to the smaller precision.
    pub fn equals_precision_normalized(&self, other: Number, epsilon: Decimal) -> bool {
        let precision = self.precision.min(other.precision);
        let a = round_to_precision(self.value, precision);
        let b = round_to_precision(other.value, precision);
        (a - b).abs() < epsilon
    }

    /// Render with exactly `precision` digits after the point.
    pub fn as_string(&self) -> String {
        let mut v = self.value;
        v.rescale(self.precision);
        v.to_string()
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}
