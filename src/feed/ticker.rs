//! Price feed backed by a venue ticker.

use super::PriceFeed;
use crate::exchange::TickerApi;
use crate::model::TradingPair;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Which side of the ticker to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerModifier {
    Ask,
    Bid,
    Mid,
}

impl FromStr for TickerModifier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ask" => Ok(Self::Ask),
            "bid" => Ok(Self::Bid),
            "mid" => Ok(Self::Mid),
            other => bail!("unknown ticker modifier '{}'", other),
        }
    }
}

pub struct TickerFeed {
    name: String,
    ticker_api: Arc<dyn TickerApi>,
    pair: TradingPair,
    modifier: TickerModifier,
}

impl TickerFeed {
    pub fn new(
        name: impl Into<String>,
        ticker_api: Arc<dyn TickerApi>,
        pair: TradingPair,
        modifier: TickerModifier,
    ) -> Self {
        Self {
            name: name.into(),
            ticker_api,
            pair,
            modifier,
        }
    }
}

#[async_trait]
impl PriceFeed for TickerFeed {
    async fn get_price(&self) -> Result<Decimal> {
        let tickers = self
            .ticker_api
            .get_ticker_price(std::slice::from_ref(&self.pair))
            .await
            .with_context(|| format!("error while getting price from exchange feed {}", self.name))?;
        let ticker = tickers
            .get(&self.pair)
            .ok_or_else(|| anyhow!("could not get price for trading pair {}", self.pair))?;

        let bid = ticker.bid_price.value();
        let ask = ticker.ask_price.value();
        let mid = (bid + ask) * dec!(0.5);
        let price = match self.modifier {
            TickerModifier::Ask => ask,
            TickerModifier::Bid => bid,
            TickerModifier::Mid => mid,
        };
        debug!(
            feed = %self.name,
            modifier = ?self.modifier,
            %bid,
            %ask,
            %mid,
            %price,
            "Price from exchange feed"
        );
        Ok(price)
    }
}
