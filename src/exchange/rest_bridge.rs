//! Generic backing venue reached through a ccxt-rest bridge.
//!
//! Every call is `POST {base_url}/exchanges/{exchange}/{instance}/{method}`
//! with the method's positional arguments as a JSON array.

use super::traits::{CancelOrderResult, TickerApi, TradeApi, TradeFetcher, TradesResult};
use super::types::*;
use crate::model::{
    Asset, Number, OpenOrder, Order, OrderAction, OrderBook, OrderConstraints, Ticker, Trade,
    TradingPair,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

/// Connection settings for one bridge instance.
#[derive(Debug, Clone, Deserialize)]
pub struct RestBridgeConfig {
    /// Bridge root, e.g. `http://localhost:3000`
    pub base_url: String,
    /// ccxt exchange id, e.g. `binance`
    pub exchange: String,
    /// Instance name registered on the bridge
    #[serde(default = "default_instance")]
    pub instance: String,
    #[serde(default = "default_price_precision")]
    pub price_precision: u32,
    #[serde(default = "default_volume_precision")]
    pub volume_precision: u32,
    #[serde(default)]
    pub min_base_volume: Decimal,
}

fn default_instance() -> String {
    "mm".to_string()
}

fn default_price_precision() -> u32 {
    8
}

fn default_volume_precision() -> u32 {
    8
}

/// Backing venue speaking the ccxt-rest protocol.
pub struct RestBridgeExchange {
    http: Client,
    config: RestBridgeConfig,
    constraints: OrderConstraints,
    registered: OnceCell<()>,
}

impl RestBridgeExchange {
    pub fn new(config: RestBridgeConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;
        let constraints = OrderConstraints::new(
            config.price_precision,
            config.volume_precision,
            config.min_base_volume,
        );
        Ok(Self {
            http,
            config,
            constraints,
            registered: OnceCell::new(),
        })
    }

    /// Register this instance on the bridge; an existing instance is fine.
    #[instrument(skip(self), fields(exchange = %self.config.exchange))]
    pub async fn init(&self) -> Result<()> {
        let url = format!(
            "{}/exchanges/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.exchange)
        );
        let response = self
            .http
            .post(&url)
            .json(&CreateInstanceRequest {
                id: self.config.instance.clone(),
            })
            .send()
            .await
            .context("Failed to create bridge instance")?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                debug!(instance = %self.config.instance, "Bridge instance already exists");
                Ok(())
            }
            s => bail!("Bridge instance creation failed with status {}", s),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/exchanges/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.exchange),
            urlencoding::encode(&self.config.instance),
            method
        )
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, args: Value) -> Result<T> {
        self.registered.get_or_try_init(|| self.init()).await?;
        let response = self
            .http
            .post(self.method_url(method))
            .json(&args)
            .send()
            .await
            .with_context(|| format!("Failed to call {}", method))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} failed with status {}: {}", method, status, body);
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))
    }

    fn symbol(pair: &TradingPair) -> String {
        pair.to_symbol("/")
    }

    fn parse_side(side: &str) -> Result<OrderAction> {
        match side {
            "buy" => Ok(OrderAction::Buy),
            "sell" => Ok(OrderAction::Sell),
            other => bail!("unknown order side '{}'", other),
        }
    }

    fn book_side(
        &self,
        pair: &TradingPair,
        action: OrderAction,
        levels: &[(Decimal, Decimal)],
    ) -> Vec<Order> {
        levels
            .iter()
            .map(|(price, amount)| {
                Order::limit(
                    pair.clone(),
                    action,
                    Number::new(*price, self.constraints.price_precision),
                    Number::new(*amount, self.constraints.volume_precision),
                )
            })
            .collect()
    }

    fn convert_trade(&self, pair: &TradingPair, raw: CcxtTrade) -> Result<Trade> {
        let action = Self::parse_side(&raw.side)?;
        let order = Order {
            timestamp: Utc.timestamp_millis_opt(raw.timestamp).single(),
            ..Order::limit(
                pair.clone(),
                action,
                Number::new(raw.price, self.constraints.price_precision),
                Number::new(raw.amount, self.constraints.volume_precision),
            )
        };
        Ok(Trade {
            order,
            transaction_id: Some(raw.id),
            cost: raw
                .cost
                .map(|c| Number::new(c, self.constraints.price_precision)),
        })
    }
}

#[async_trait]
impl TickerApi for RestBridgeExchange {
    #[instrument(skip(self, pairs))]
    async fn get_ticker_price(&self, pairs: &[TradingPair]) -> Result<HashMap<TradingPair, Ticker>> {
        let mut tickers = HashMap::with_capacity(pairs.len());
        for pair in pairs {
            let raw: CcxtTicker = self.call("fetchTicker", json!([Self::symbol(pair)])).await?;
            let (Some(bid), Some(ask)) = (raw.bid, raw.ask) else {
                bail!("ticker for {} is missing bid or ask", raw.symbol);
            };
            let p = self.constraints.price_precision;
            tickers.insert(
                pair.clone(),
                Ticker {
                    ask_price: Number::new(ask, p),
                    bid_price: Number::new(bid, p),
                    last_price: raw.last.map(|l| Number::new(l, p)),
                },
            );
        }
        Ok(tickers)
    }
}

#[async_trait]
impl TradeApi for RestBridgeExchange {
    fn order_constraints(&self, _pair: &TradingPair) -> OrderConstraints {
        self.constraints.clone()
    }

    #[instrument(skip(self), fields(pair = %pair))]
    async fn get_order_book(&self, pair: &TradingPair, depth: u32) -> Result<OrderBook> {
        let raw: CcxtOrderBook = self
            .call("fetchOrderBook", json!([Self::symbol(pair), depth]))
            .await?;
        Ok(OrderBook {
            pair: pair.clone(),
            asks: self.book_side(pair, OrderAction::Sell, &raw.asks),
            bids: self.book_side(pair, OrderAction::Buy, &raw.bids),
        })
    }

    #[instrument(skip(self), fields(pair = %pair))]
    async fn get_open_orders(&self, pair: &TradingPair) -> Result<Vec<OpenOrder>> {
        let raw: Vec<CcxtOrder> = self
            .call("fetchOpenOrders", json!([Self::symbol(pair)]))
            .await?;
        let p = self.constraints.price_precision;
        let v = self.constraints.volume_precision;
        raw.into_iter()
            .map(|o| {
                let action = Self::parse_side(&o.side)?;
                let order = Order {
                    timestamp: o.timestamp.and_then(|t| Utc.timestamp_millis_opt(t).single()),
                    ..Order::limit(
                        pair.clone(),
                        action,
                        Number::new(o.price.unwrap_or_default(), p),
                        Number::new(o.amount, v),
                    )
                };
                Ok(OpenOrder {
                    id: o.id,
                    order,
                    volume_executed: Number::new(o.filled.unwrap_or_default(), v),
                })
            })
            .collect()
    }

    #[instrument(skip(self), fields(order = %order))]
    async fn add_order(&self, order: &Order) -> Result<Option<String>> {
        let raw: CcxtOrder = self
            .call(
                "createOrder",
                json!([
                    Self::symbol(&order.pair),
                    "limit",
                    order.action.as_str(),
                    order.volume.as_string(),
                    order.price.as_string(),
                ]),
            )
            .await?;
        if raw.id.is_empty() {
            warn!("Bridge accepted order without returning an id");
            return Ok(None);
        }
        Ok(Some(raw.id))
    }

    #[instrument(skip(self), fields(pair = %pair))]
    async fn cancel_order(&self, order_id: &str, pair: &TradingPair) -> Result<CancelOrderResult> {
        let raw: CcxtOrder = self
            .call("cancelOrder", json!([order_id, Self::symbol(pair)]))
            .await?;
        Ok(match raw.status.as_deref() {
            Some("canceled") | Some("cancelled") => CancelOrderResult::Cancelled,
            Some("closed") => CancelOrderResult::Failed,
            _ => CancelOrderResult::Cancelled,
        })
    }

    #[instrument(skip(self, assets))]
    async fn get_account_balances(&self, assets: &[Asset]) -> Result<HashMap<Asset, Decimal>> {
        let raw: CcxtBalance = self.call("fetchBalance", json!([])).await?;
        Ok(assets
            .iter()
            .map(|a| {
                let total = raw.total.get(a.code()).copied().unwrap_or(Decimal::ZERO);
                (a.clone(), total)
            })
            .collect())
    }
}

#[async_trait]
impl TradeFetcher for RestBridgeExchange {
    /// The cursor is the millisecond timestamp of the last trade seen.
    #[instrument(skip(self), fields(pair = %pair))]
    async fn get_trades(&self, pair: &TradingPair, cursor: Option<String>) -> Result<TradesResult> {
        let since: Option<i64> = cursor.as_deref().map(str::parse).transpose()?;
        let raw: Vec<CcxtTrade> = self.call("fetchTrades", json!([Self::symbol(pair)])).await?;

        let mut last = since;
        let mut trades = Vec::new();
        for t in raw {
            if since.is_some_and(|s| t.timestamp <= s) {
                continue;
            }
            last = Some(last.map_or(t.timestamp, |l| l.max(t.timestamp)));
            trades.push(self.convert_trade(pair, t)?);
        }
        Ok(TradesResult {
            trades,
            cursor: last.map(|l| l.to_string()),
        })
    }
}
