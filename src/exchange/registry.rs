//! Named backing-venue factories, built once at start-up.

use super::mock::MockExchange;
use super::rest_bridge::{RestBridgeConfig, RestBridgeExchange};
use super::traits::{Exchange, TickerApi, TradeApi, TradeFetcher};
use crate::model::OrderConstraints;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One venue seen through each of its capability traits.
#[derive(Clone)]
pub struct ExchangeHandle {
    pub name: String,
    pub trade_api: Arc<dyn TradeApi>,
    pub ticker_api: Arc<dyn TickerApi>,
    pub trade_fetcher: Arc<dyn TradeFetcher>,
}

impl ExchangeHandle {
    pub fn new<E: Exchange + 'static>(name: impl Into<String>, exchange: Arc<E>) -> Self {
        Self {
            name: name.into(),
            trade_api: exchange.clone(),
            ticker_api: exchange.clone(),
            trade_fetcher: exchange,
        }
    }
}

/// Inputs shared by every venue factory.
#[derive(Debug, Clone)]
pub struct ExchangeParams {
    pub ccxt_base_url: String,
    pub constraints: OrderConstraints,
}

type ExchangeFactory = Box<dyn Fn(&ExchangeParams) -> Result<ExchangeHandle> + Send + Sync>;

/// Registered venue with its metadata.
pub struct ExchangeEntry {
    pub description: &'static str,
    pub trade_enabled: bool,
    factory: ExchangeFactory,
}

/// String-keyed venue factories.
#[derive(Default)]
pub struct ExchangeRegistry {
    entries: BTreeMap<String, ExchangeEntry>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the simulated venue and the ccxt bridge venues.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "sim",
            "Simulated in-memory venue for paper trading",
            true,
            |params| {
                Ok(ExchangeHandle::new(
                    "sim",
                    Arc::new(MockExchange::new(params.constraints.clone())),
                ))
            },
        );
        for (id, description) in [
            ("binance", "Binance via the ccxt-rest bridge"),
            ("kraken", "Kraken via the ccxt-rest bridge"),
            ("poloniex", "Poloniex via the ccxt-rest bridge"),
            ("bittrex", "Bittrex via the ccxt-rest bridge"),
        ] {
            let key = format!("ccxt-{}", id);
            let name = key.clone();
            registry.register(&key, description, true, move |params| {
                let exchange = RestBridgeExchange::new(RestBridgeConfig {
                    base_url: params.ccxt_base_url.clone(),
                    exchange: id.to_string(),
                    instance: "mm".to_string(),
                    price_precision: params.constraints.price_precision,
                    volume_precision: params.constraints.volume_precision,
                    min_base_volume: params.constraints.min_base_volume,
                })?;
                Ok(ExchangeHandle::new(name.clone(), Arc::new(exchange)))
            });
        }
        registry
    }

    pub fn register<F>(
        &mut self,
        key: &str,
        description: &'static str,
        trade_enabled: bool,
        factory: F,
    ) where
        F: Fn(&ExchangeParams) -> Result<ExchangeHandle> + Send + Sync + 'static,
    {
        self.entries.insert(
            key.to_string(),
            ExchangeEntry {
                description,
                trade_enabled,
                factory: Box::new(factory),
            },
        );
    }

    pub fn make(&self, key: &str, params: &ExchangeParams) -> Result<ExchangeHandle> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| anyhow!("unknown exchange '{}'", key))?;
        (entry.factory)(params)
    }

    /// Registered keys with their metadata, sorted by key.
    pub fn list(&self) -> impl Iterator<Item = (&str, &ExchangeEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
