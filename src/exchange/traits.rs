//! Venue-agnostic capability traits.
//!
//! Two kinds of venue take part in market making:
//! - the primary (native-ledger) venue, where our offers rest and where the
//!   reconciler's operations are submitted as one atomic batch
//! - backing venues, reached through a generic trade API, whose order books
//!   are mirrored and on which fills are hedged

use crate::model::{
    Asset, Offer, OfferOp, OpenOrder, Order, OrderAction, OrderBook, OrderConstraints, Number,
    Ticker, Trade, TradingPair,
};
use crate::risk::LiabilityTracker;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Page of trades plus the cursor to resume from.
#[derive(Debug, Clone, Default)]
pub struct TradesResult {
    pub trades: Vec<Trade>,
    pub cursor: Option<String>,
}

/// Outcome of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOrderResult {
    Cancelled,
    Failed,
    NotFound,
}

/// Best bid/ask lookup.
#[async_trait]
pub trait TickerApi: Send + Sync {
    async fn get_ticker_price(
        &self,
        pairs: &[TradingPair],
    ) -> anyhow::Result<HashMap<TradingPair, Ticker>>;
}

/// Source of executed trades, polled by the fill tracker.
#[async_trait]
pub trait TradeFetcher: Send + Sync {
    async fn get_trades(
        &self,
        pair: &TradingPair,
        cursor: Option<String>,
    ) -> anyhow::Result<TradesResult>;
}

/// Order book and order management on a backing venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeApi: Send + Sync {
    /// Precision and minimum size for `pair`.
    fn order_constraints(&self, pair: &TradingPair) -> OrderConstraints;

    async fn get_order_book(&self, pair: &TradingPair, depth: u32) -> anyhow::Result<OrderBook>;

    async fn get_open_orders(&self, pair: &TradingPair) -> anyhow::Result<Vec<OpenOrder>>;

    /// Place a limit order. `Ok(None)` means the venue accepted the call but
    /// returned no transaction identifier.
    async fn add_order(&self, order: &Order) -> anyhow::Result<Option<String>>;

    async fn cancel_order(
        &self,
        order_id: &str,
        pair: &TradingPair,
    ) -> anyhow::Result<CancelOrderResult>;

    async fn get_account_balances(
        &self,
        assets: &[Asset],
    ) -> anyhow::Result<HashMap<Asset, Decimal>>;
}

/// Full backing-venue capability set.
pub trait Exchange: TickerApi + TradeApi + TradeFetcher {}

impl<T: TickerApi + TradeApi + TradeFetcher> Exchange for T {}

/// Builds operations for the primary venue.
///
/// Prices and amounts are given in base/quote terms; implementations convert
/// them to their own representation. `Ok(None)` abandons the operation, for
/// instance when `liabilities` shows insufficient capacity.
pub trait OfferOpBuilder: Send + Sync {
    fn constraints(&self) -> &OrderConstraints;

    /// Reserve-asset amount charged for an offer; new offers may cost more
    /// than modifications of existing ones.
    fn fee_buffer(&self, is_new_offer: bool) -> Decimal;

    fn create_offer(
        &self,
        pair: &TradingPair,
        action: OrderAction,
        price: Number,
        amount: Number,
        liabilities: &LiabilityTracker,
    ) -> crate::error::Result<Option<OfferOp>>;

    fn modify_offer(
        &self,
        offer: &Offer,
        action: OrderAction,
        price: Number,
        amount: Number,
        liabilities: &LiabilityTracker,
    ) -> crate::error::Result<Option<OfferOp>>;

    fn delete_offer(&self, offer: &Offer) -> OfferOp {
        OfferOp::delete(offer)
    }
}

/// Account state and batch submission on the primary venue.
#[async_trait]
pub trait OfferVenue: Send + Sync {
    async fn load_offers(&self, pair: &TradingPair) -> anyhow::Result<Vec<Offer>>;

    async fn load_balances(&self) -> anyhow::Result<HashMap<Asset, Decimal>>;

    /// Submit all operations atomically, deletes applied first.
    /// Returns the transaction hash, if any.
    async fn submit_ops(&self, ops: Vec<OfferOp>) -> anyhow::Result<Option<String>>;
}
