//! Price feeds.
//!
//! A feed is described by a type and a type-specific url:
//! - `fixed` with a literal price, e.g. `0.12`
//! - `fiat` with a currency-rate endpoint returning `{"quotes": {...}}`
//! - `exchange` with `{exchange}/{base}/{quote}/{ask|bid|mid}`

mod fiat;
mod ticker;

pub use fiat::FiatFeed;
pub use ticker::{TickerFeed, TickerModifier};

use crate::exchange::{ExchangeParams, ExchangeRegistry};
use crate::model::TradingPair;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;

/// Source of a single price.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_price(&self) -> Result<Decimal>;
}

/// Feed that always returns the same price.
#[derive(Debug, Clone)]
pub struct FixedFeed {
    price: Decimal,
}

impl FixedFeed {
    pub fn new(price: Decimal) -> Self {
        Self { price }
    }
}

#[async_trait]
impl PriceFeed for FixedFeed {
    async fn get_price(&self) -> Result<Decimal> {
        Ok(self.price)
    }
}

/// Build a feed from its configured type and url.
pub fn make_price_feed(
    feed_type: &str,
    url: &str,
    exchanges: &ExchangeRegistry,
    params: &ExchangeParams,
) -> Result<Arc<dyn PriceFeed>> {
    match feed_type {
        "fixed" => {
            let price = Decimal::from_str(url.trim())
                .with_context(|| format!("invalid fixed price '{}'", url))?;
            Ok(Arc::new(FixedFeed::new(price)))
        }
        "fiat" => Ok(Arc::new(FiatFeed::new(url)?)),
        "exchange" => {
            let parts: Vec<&str> = url.split('/').collect();
            let [exchange, base, quote, modifier] = parts.as_slice() else {
                bail!("exchange feed url must be exchange/base/quote/modifier, got '{}'", url);
            };
            let handle = exchanges.make(exchange, params)?;
            Ok(Arc::new(TickerFeed::new(
                handle.name,
                handle.ticker_api,
                TradingPair::new(*base, *quote),
                modifier.parse()?,
            )))
        }
        other => bail!("unknown price feed type '{}'", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OrderConstraints;
    use rust_decimal_macros::dec;

    fn params() -> ExchangeParams {
        ExchangeParams {
            ccxt_base_url: "http://localhost:3000".to_string(),
            constraints: OrderConstraints::new(7, 7, dec!(1)),
        }
    }

    #[test]
    fn test_fixed_feed() {
        let feed = make_price_feed("fixed", "0.125", &ExchangeRegistry::new(), &params()).unwrap();
        assert_eq!(tokio_test::block_on(feed.get_price()).unwrap(), dec!(0.125));
    }

    #[test]
    fn test_bad_specs_rejected() {
        let registry = ExchangeRegistry::with_defaults();
        assert!(make_price_feed("fixed", "abc", &registry, &params()).is_err());
        assert!(make_price_feed("exchange", "ccxt-binance/XLM", &registry, &params()).is_err());
        assert!(make_price_feed("exchange", "ccxt-binance/XLM/USDT/last", &registry, &params()).is_err());
        assert!(make_price_feed("crypto", "x", &registry, &params()).is_err());
    }

    #[test]
    fn test_exchange_feed_builds() {
        let registry = ExchangeRegistry::with_defaults();
        assert!(make_price_feed("exchange", "sim/XLM/USDT/mid", &registry, &params()).is_ok());
    }
}
