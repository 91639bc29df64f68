//! Fiat exchange-rate feed.

use super::PriceFeed;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Response shape of currency-rate APIs such as currencylayer:
/// `{"source": "USD", "quotes": {"USDPHP": 51.08}}`.
#[derive(Debug, Deserialize)]
struct FiatQuotes {
    quotes: HashMap<String, Decimal>,
}

/// Price of one unit of the quoted currency in the source currency.
pub struct FiatFeed {
    http: Client,
    url: String,
}

impl FiatFeed {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for FiatFeed {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn get_price(&self) -> Result<Decimal> {
        let body: FiatQuotes = self
            .http
            .get(&self.url)
            .send()
            .await
            .context("Failed to fetch fiat rate")?
            .error_for_status()?
            .json()
            .await
            .context("Failed to parse fiat rate response")?;

        let rate = body
            .quotes
            .values()
            .next()
            .copied()
            .ok_or_else(|| anyhow!("fiat response contained no quotes"))?;
        if rate.is_zero() {
            bail!("fiat rate is zero");
        }
        let price = Decimal::ONE / rate;
        debug!(%rate, %price, "Fetched fiat rate");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_quote_is_inverted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/live"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "source": "USD",
                "quotes": {"USDEUR": 0.8}
            })))
            .mount(&server)
            .await;

        let feed = FiatFeed::new(&format!("{}/live", server.uri())).unwrap();
        assert_eq!(feed.get_price().await.unwrap(), dec!(1.25));
    }

    #[tokio::test]
    async fn test_empty_quotes_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"quotes": {}})))
            .mount(&server)
            .await;

        let feed = FiatFeed::new(&server.uri()).unwrap();
        assert!(feed.get_price().await.is_err());
    }
}
