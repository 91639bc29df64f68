//! Asset identifiers, trading pairs and per-market order constraints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque asset identifier (e.g. "XLM", "USDC:GA5Z...").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(pub String);

impl Asset {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Asset code without any issuer suffix, used to build issuer-independent
    /// market identifiers.
    pub fn code(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Base/quote pair of a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradingPair {
    pub base: Asset,
    pub quote: Asset,
}

impl TradingPair {
    pub fn new(base: impl Into<Asset>, quote: impl Into<Asset>) -> Self {
        Self {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Render as a venue symbol, e.g. `XLM/USDT`.
    pub fn to_symbol(&self, delimiter: &str) -> String {
        format!("{}{}{}", self.base.code(), delimiter, self.quote.code())
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Per-market limits supplied once by a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConstraints {
    /// Digits after the point for prices
    pub price_precision: u32,
    /// Digits after the point for volumes
    pub volume_precision: u32,
    /// Minimum base-asset volume accepted for an order
    pub min_base_volume: Decimal,
}

impl OrderConstraints {
    pub fn new(price_precision: u32, volume_precision: u32, min_base_volume: Decimal) -> Self {
        Self {
            price_precision,
            volume_precision,
            min_base_volume,
        }
    }
}

impl fmt::Display for OrderConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OrderConstraints[price_precision={}, volume_precision={}, min_base_volume={}]",
            self.price_precision, self.volume_precision, self.min_base_volume
        )
    }
}
