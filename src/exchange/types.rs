//! Wire types for the ccxt-rest bridge.
//!
//! The bridge returns ccxt's unified structures as JSON with numbers as
//! floats; `Decimal` accepts both numbers and strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Request body when creating a bridge instance.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInstanceRequest {
    pub id: String,
}

/// Unified ticker.
#[derive(Debug, Clone, Deserialize)]
pub struct CcxtTicker {
    pub symbol: String,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
}

/// Unified order book; each level is `[price, amount]`.
#[derive(Debug, Clone, Deserialize)]
pub struct CcxtOrderBook {
    #[serde(default)]
    pub bids: Vec<(Decimal, Decimal)>,
    #[serde(default)]
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Unified public trade.
#[derive(Debug, Clone, Deserialize)]
pub struct CcxtTrade {
    pub id: String,
    /// Milliseconds since the epoch
    pub timestamp: i64,
    pub symbol: String,
    pub side: String,
    pub price: Decimal,
    pub amount: Decimal,
    #[serde(default)]
    pub cost: Option<Decimal>,
}

/// Unified order, returned by fetchOpenOrders, createOrder and cancelOrder.
#[derive(Debug, Clone, Deserialize)]
pub struct CcxtOrder {
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub symbol: String,
    #[serde(rename = "type", default)]
    pub order_type: Option<String>,
    pub side: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    pub amount: Decimal,
    #[serde(default)]
    pub filled: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Unified balance; only `total` is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct CcxtBalance {
    #[serde(default)]
    pub total: HashMap<String, Decimal>,
    #[serde(default)]
    pub free: HashMap<String, Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_book_levels_deserialize() {
        let raw = r#"{"bids":[[0.101,250.5],[0.1,1000]],"asks":[["0.102","40"]],"nonce":null}"#;
        let book: CcxtOrderBook = serde_json::from_str(raw).unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.bids[1], (dec!(0.1), dec!(1000)));
        assert_eq!(book.asks[0].0, dec!(0.102));
    }

    #[test]
    fn test_order_type_field_renamed() {
        let raw = r#"{"id":"42","symbol":"XLM/USDT","type":"limit","side":"buy","price":0.1,"amount":10,"filled":2.5}"#;
        let order: CcxtOrder = serde_json::from_str(raw).unwrap();
        assert_eq!(order.order_type.as_deref(), Some("limit"));
        assert_eq!(order.filled, Some(dec!(2.5)));
        assert!(order.timestamp.is_none());
    }
}
