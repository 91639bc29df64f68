//! Simulated backing venue for paper trading and tests.

use super::traits::{CancelOrderResult, TickerApi, TradeApi, TradeFetcher, TradesResult};
use crate::model::{
    Asset, Number, OpenOrder, Order, OrderAction, OrderBook, OrderConstraints, Ticker, Trade,
    TradingPair,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// How the simulated venue answers `add_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Accept and return a fresh order id
    Accept,
    /// Accept but return no identifier
    NoId,
    /// Fail with an error
    Reject,
}

/// Mutable venue contents.
#[derive(Debug, Default)]
pub struct MockExchangeState {
    pub books: HashMap<TradingPair, OrderBook>,
    pub open_orders: HashMap<String, Order>,
    pub placed: Vec<Order>,
    pub trades: Vec<Trade>,
    pub balances: HashMap<Asset, Decimal>,
}

/// In-memory backing venue.
pub struct MockExchange {
    state: Arc<RwLock<MockExchangeState>>,
    order_id_counter: AtomicU64,
    constraints: OrderConstraints,
    outcome: RwLock<SubmitOutcome>,
    /// Simulated network latency for order placement
    latency: Duration,
}

impl MockExchange {
    pub fn new(constraints: OrderConstraints) -> Self {
        Self {
            state: Arc::new(RwLock::new(MockExchangeState::default())),
            order_id_counter: AtomicU64::new(1),
            constraints,
            outcome: RwLock::new(SubmitOutcome::Accept),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub async fn set_outcome(&self, outcome: SubmitOutcome) {
        *self.outcome.write().await = outcome;
    }

    pub async fn set_balances(&self, balances: HashMap<Asset, Decimal>) {
        self.state.write().await.balances = balances;
    }

    /// Replace the book for `pair` from `(price, volume)` levels, best first.
    pub async fn set_order_book(
        &self,
        pair: &TradingPair,
        bids: &[(Decimal, Decimal)],
        asks: &[(Decimal, Decimal)],
    ) {
        let level = |action: OrderAction, (price, volume): &(Decimal, Decimal)| {
            Order::limit(
                pair.clone(),
                action,
                Number::new(*price, self.constraints.price_precision),
                Number::new(*volume, self.constraints.volume_precision),
            )
        };
        let book = OrderBook {
            pair: pair.clone(),
            bids: bids.iter().map(|l| level(OrderAction::Buy, l)).collect(),
            asks: asks.iter().map(|l| level(OrderAction::Sell, l)).collect(),
        };
        self.state.write().await.books.insert(pair.clone(), book);
        debug!(pair = %pair, bids = bids.len(), asks = asks.len(), "Mock order book updated");
    }

    pub async fn push_trade(&self, trade: Trade) {
        self.state.write().await.trades.push(trade);
    }

    /// Every order accepted or attempted so far.
    pub async fn placed_orders(&self) -> Vec<Order> {
        self.state.read().await.placed.clone()
    }
}

#[async_trait]
impl TickerApi for MockExchange {
    async fn get_ticker_price(&self, pairs: &[TradingPair]) -> Result<HashMap<TradingPair, Ticker>> {
        let state = self.state.read().await;
        let mut tickers = HashMap::new();
        for pair in pairs {
            let book = state
                .books
                .get(pair)
                .ok_or_else(|| anyhow!("no market data for {}", pair))?;
            let (Some(bid), Some(ask)) = (book.top_bid(), book.top_ask()) else {
                bail!("empty book for {}", pair);
            };
            tickers.insert(
                pair.clone(),
                Ticker {
                    ask_price: ask.price,
                    bid_price: bid.price,
                    last_price: None,
                },
            );
        }
        Ok(tickers)
    }
}

#[async_trait]
impl TradeApi for MockExchange {
    fn order_constraints(&self, _pair: &TradingPair) -> OrderConstraints {
        self.constraints.clone()
    }

    async fn get_order_book(&self, pair: &TradingPair, depth: u32) -> Result<OrderBook> {
        let state = self.state.read().await;
        let mut book = state.books.get(pair).cloned().unwrap_or(OrderBook {
            pair: pair.clone(),
            asks: Vec::new(),
            bids: Vec::new(),
        });
        book.asks.truncate(depth as usize);
        book.bids.truncate(depth as usize);
        Ok(book)
    }

    async fn get_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>> {
        let state = self.state.read().await;
        Ok(state
            .open_orders
            .iter()
            .filter(|(_, o)| &o.pair == pair)
            .map(|(id, o)| OpenOrder {
                id: id.clone(),
                order: o.clone(),
                volume_executed: Number::zero(self.constraints.volume_precision),
            })
            .collect())
    }

    async fn add_order(&self, order: &Order) -> Result<Option<String>> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let outcome = *self.outcome.read().await;
        let mut state = self.state.write().await;
        state.placed.push(order.clone());

        match outcome {
            SubmitOutcome::Reject => bail!("mock venue rejected {}", order),
            SubmitOutcome::NoId => Ok(None),
            SubmitOutcome::Accept => {
                let id = format!("mock-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst));
                state.open_orders.insert(id.clone(), order.clone());
                info!(%id, order = %order, "Mock order placed");
                Ok(Some(id))
            }
        }
    }

    async fn cancel_order(&self, order_id: &str, _pair: &TradingPair) -> Result<CancelOrderResult> {
        let mut state = self.state.write().await;
        Ok(match state.open_orders.remove(order_id) {
            Some(_) => CancelOrderResult::Cancelled,
            None => CancelOrderResult::NotFound,
        })
    }

    async fn get_account_balances(&self, assets: &[Asset]) -> Result<HashMap<Asset, Decimal>> {
        let state = self.state.read().await;
        Ok(assets
            .iter()
            .map(|a| (a.clone(), state.balances.get(a).copied().unwrap_or_default()))
            .collect())
    }
}

#[async_trait]
impl TradeFetcher for MockExchange {
    async fn get_trades(&self, pair: &TradingPair, cursor: Option<String>) -> Result<TradesResult> {
        let state = self.state.read().await;
        let start = cursor.as_deref().map(str::parse::<usize>).transpose()?.unwrap_or(0);
        Ok(TradesResult {
            trades: state
                .trades
                .iter()
                .skip(start)
                .filter(|t| &t.order.pair == pair)
                .cloned()
                .collect(),
            cursor: Some(state.trades.len().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USDT")
    }

    #[tokio::test]
    async fn test_book_depth_and_ticker() {
        let ex = MockExchange::new(OrderConstraints::new(5, 2, dec!(1)));
        ex.set_order_book(
            &pair(),
            &[(dec!(0.1), dec!(10)), (dec!(0.09), dec!(20))],
            &[(dec!(0.11), dec!(5))],
        )
        .await;

        let book = ex.get_order_book(&pair(), 1).await.unwrap();
        assert_eq!(book.bids.len(), 1);

        let tickers = ex.get_ticker_price(&[pair()]).await.unwrap();
        assert_eq!(tickers[&pair()].bid_price.value(), dec!(0.1));
        assert_eq!(tickers[&pair()].ask_price.value(), dec!(0.11));
    }

    #[tokio::test]
    async fn test_submit_outcomes() {
        let ex = MockExchange::new(OrderConstraints::new(5, 2, dec!(1)));
        let order = Order::limit(
            pair(),
            OrderAction::Buy,
            Number::new(dec!(0.1), 5),
            Number::new(dec!(3), 2),
        );

        let id = ex.add_order(&order).await.unwrap().unwrap();
        assert_eq!(ex.get_open_orders(&pair()).await.unwrap().len(), 1);
        assert_eq!(
            ex.cancel_order(&id, &pair()).await.unwrap(),
            CancelOrderResult::Cancelled
        );

        ex.set_outcome(SubmitOutcome::NoId).await;
        assert!(ex.add_order(&order).await.unwrap().is_none());
        ex.set_outcome(SubmitOutcome::Reject).await;
        assert!(ex.add_order(&order).await.is_err());
        assert_eq!(ex.placed_orders().await.len(), 3);
    }
}
