//! Configuration management for the market maker.
//!
//! A bot config file describes the market and the primary venue; each
//! strategy reads its own file. Both are TOML and can be overridden through
//! environment variables (`MM__TICK_INTERVAL_SECONDS=10`,
//! `MM_STRAT__PER_LEVEL_SPREAD=0.01`).

use crate::filter::VolumeFilterMode;
use crate::model::{Asset, OrderConstraints, TradingPair};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Bot-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Base asset of the market, e.g. `XLM` or `USDC:GA5Z...`
    pub asset_base: String,
    /// Quote asset of the market
    pub asset_quote: String,
    /// Seconds between reconciliation passes
    #[serde(default = "default_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    /// Milliseconds between fill checks; 0 disables fill tracking
    #[serde(default)]
    pub fill_tracker_sleep_millis: u64,
    /// Delete all offers before exiting
    #[serde(default)]
    pub delete_offers_on_shutdown: bool,
    /// Primary venue settings
    #[serde(default)]
    pub venue: VenueConfig,
    /// Root of the ccxt-rest bridge
    #[serde(default = "default_ccxt_rest_url")]
    pub ccxt_rest_url: String,
    /// SQLite database of recorded fills
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Submit filters, e.g. `volume/daily/sell/base/1000/exact`
    #[serde(default)]
    pub filters: Vec<String>,
    /// Starting balances for the simulated primary venue
    #[serde(default)]
    pub sim_balances: HashMap<String, Decimal>,
}

/// Primary (native-ledger) venue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    /// Name used to derive market ids
    #[serde(default = "default_venue_name")]
    pub name: String,
    #[serde(default = "default_ledger_precision")]
    pub price_precision: u32,
    #[serde(default = "default_ledger_precision")]
    pub volume_precision: u32,
    #[serde(default)]
    pub min_base_volume: Decimal,
    /// Native asset charged with reserves and fees
    #[serde(default = "default_reserve_asset")]
    pub reserve_asset: Option<String>,
    /// Native balance never made available to offers
    #[serde(default = "default_operational_buffer")]
    pub operational_buffer: Decimal,
    /// Native reserve held by each additional offer
    #[serde(default = "default_new_offer_fee_buffer")]
    pub new_offer_fee_buffer: Decimal,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            name: default_venue_name(),
            price_precision: default_ledger_precision(),
            volume_precision: default_ledger_precision(),
            min_base_volume: Decimal::ZERO,
            reserve_asset: default_reserve_asset(),
            operational_buffer: default_operational_buffer(),
            new_offer_fee_buffer: default_new_offer_fee_buffer(),
        }
    }
}

/// Mirror strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Registry key of the backing venue, e.g. `ccxt-binance`
    pub exchange: String,
    pub exchange_base: String,
    pub exchange_quote: String,
    #[serde(default = "default_orderbook_depth")]
    pub orderbook_depth: u32,
    #[serde(default = "default_volume_divide_by")]
    pub volume_divide_by: Decimal,
    #[serde(default)]
    pub per_level_spread: Decimal,
    /// Hedge primary-venue fills on the backing venue
    #[serde(default)]
    pub offset_trades: bool,
    /// Release reserved hedge volume when a hedge order fails
    #[serde(default)]
    pub release_committed_on_failure: bool,
    #[serde(default = "default_backing_precision")]
    pub backing_price_precision: u32,
    #[serde(default = "default_backing_precision")]
    pub backing_volume_precision: u32,
    #[serde(default)]
    pub backing_min_base_volume: Decimal,
}

impl MirrorConfig {
    pub fn backing_pair(&self) -> TradingPair {
        TradingPair::new(self.exchange_base.as_str(), self.exchange_quote.as_str())
    }

    pub fn backing_constraints(&self) -> OrderConstraints {
        OrderConstraints::new(
            self.backing_price_precision,
            self.backing_volume_precision,
            self.backing_min_base_volume,
        )
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.volume_divide_by > Decimal::ZERO,
            "volume_divide_by must be positive"
        );
        anyhow::ensure!(
            self.per_level_spread >= Decimal::ZERO && self.per_level_spread < Decimal::ONE,
            "per_level_spread must be in [0, 1)"
        );
        anyhow::ensure!(self.orderbook_depth > 0, "orderbook_depth must be positive");
        Ok(())
    }
}

/// Sell-side TWAP strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellTwapConfig {
    /// `fixed`, `fiat` or `exchange`
    pub price_feed_type: String,
    pub price_feed_url: String,
    #[serde(default)]
    pub rate_offset_percent: Decimal,
    #[serde(default)]
    pub rate_offset: Decimal,
    #[serde(default = "default_true")]
    pub rate_offset_percent_first: bool,
    #[serde(default)]
    pub rate_offset_invert: bool,
    /// Base units to sell per day, Sunday first
    pub day_of_week_daily_cap: Vec<Decimal>,
    #[serde(default = "default_volume_filter_mode")]
    pub volume_filter_mode: VolumeFilterMode,
    #[serde(default)]
    pub additional_market_ids: Vec<String>,
    #[serde(default = "default_hours_to_sell")]
    pub num_hours_to_sell: u32,
    #[serde(default = "default_bucket_size_seconds")]
    pub parent_bucket_size_seconds: u32,
    #[serde(default = "default_one")]
    pub distribute_surplus_over_remaining_intervals_percent_ceiling: Decimal,
    #[serde(default = "default_smoothing_factor")]
    pub exponential_smoothing_factor: Decimal,
    #[serde(default = "default_min_child_order_size_percent")]
    pub min_child_order_size_percent_of_parent: Decimal,
    /// Seed for child order sizing; the current time when absent
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl SellTwapConfig {
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.day_of_week_daily_cap.len() == 7,
            "day_of_week_daily_cap needs 7 entries (Sunday first), got {}",
            self.day_of_week_daily_cap.len()
        );
        anyhow::ensure!(
            self.day_of_week_daily_cap.iter().all(|c| !c.is_sign_negative()),
            "daily caps must not be negative"
        );
        Ok(())
    }
}

// Default value functions
fn default_tick_interval_seconds() -> u64 {
    5
}

fn default_ccxt_rest_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_db_path() -> String {
    "data/trades.db".to_string()
}

fn default_venue_name() -> String {
    "sdex".to_string()
}

fn default_ledger_precision() -> u32 {
    7
}

fn default_reserve_asset() -> Option<String> {
    Some("XLM".to_string())
}

fn default_operational_buffer() -> Decimal {
    Decimal::new(20, 0) // 20 units of the native asset
}

fn default_new_offer_fee_buffer() -> Decimal {
    Decimal::new(5, 1) // 0.5, one base reserve per offer entry
}

fn default_orderbook_depth() -> u32 {
    20
}

fn default_volume_divide_by() -> Decimal {
    Decimal::ONE
}

fn default_backing_precision() -> u32 {
    8
}

fn default_true() -> bool {
    true
}

fn default_volume_filter_mode() -> VolumeFilterMode {
    VolumeFilterMode::Exact
}

fn default_hours_to_sell() -> u32 {
    24
}

fn default_bucket_size_seconds() -> u32 {
    3600
}

fn default_one() -> Decimal {
    Decimal::ONE
}

fn default_smoothing_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_min_child_order_size_percent() -> Decimal {
    Decimal::new(1, 1) // 0.1 of the bucket
}

impl BotConfig {
    /// Load the bot config file, then apply `MM__`-prefixed env overrides.
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(true))
            .add_source(config::Environment::default().separator("__").prefix("MM"))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    pub fn pair(&self) -> TradingPair {
        TradingPair::new(self.asset_base.as_str(), self.asset_quote.as_str())
    }

    pub fn primary_constraints(&self) -> OrderConstraints {
        OrderConstraints::new(
            self.venue.price_precision,
            self.venue.volume_precision,
            self.venue.min_base_volume,
        )
    }

    pub fn reserve_asset(&self) -> Option<Asset> {
        self.venue.reserve_asset.as_deref().map(Asset::new)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.asset_base.is_empty() && !self.asset_quote.is_empty(),
            "asset_base and asset_quote are required"
        );
        anyhow::ensure!(
            self.asset_base != self.asset_quote,
            "asset_base and asset_quote must differ"
        );
        anyhow::ensure!(
            self.tick_interval_seconds > 0,
            "tick_interval_seconds must be positive"
        );
        anyhow::ensure!(
            !self.venue.operational_buffer.is_sign_negative()
                && !self.venue.new_offer_fee_buffer.is_sign_negative(),
            "venue buffers must not be negative"
        );
        Ok(())
    }
}

/// Load a strategy config file, then apply `MM_STRAT__`-prefixed overrides.
pub fn load_strategy_config<T: DeserializeOwned>(path: &str) -> Result<T> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path).required(true))
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("MM_STRAT"),
        )
        .build()
        .with_context(|| format!("Failed to build strategy configuration from {}", path))?;

    config
        .try_deserialize()
        .with_context(|| format!("Failed to deserialize strategy configuration {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn from_toml<T: DeserializeOwned>(raw: &str) -> T {
        config::Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_bot_config_defaults() {
        let cfg: BotConfig = from_toml(
            r#"
            asset_base = "XLM"
            asset_quote = "USD"
            filters = ["volume/daily/sell/base/1000/exact"]
            "#,
        );
        assert_eq!(cfg.tick_interval_seconds, 5);
        assert_eq!(cfg.venue.price_precision, 7);
        assert_eq!(cfg.venue.operational_buffer, dec!(20));
        assert_eq!(cfg.reserve_asset(), Some(Asset::new("XLM")));
        assert_eq!(cfg.filters.len(), 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_bot_config_validation() {
        let mut cfg: BotConfig = from_toml("asset_base = \"XLM\"\nasset_quote = \"XLM\"");
        assert!(cfg.validate().is_err());
        cfg.asset_quote = "USD".to_string();
        cfg.tick_interval_seconds = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_mirror_config() {
        let cfg: MirrorConfig = from_toml(
            r#"
            exchange = "ccxt-binance"
            exchange_base = "XLM"
            exchange_quote = "USDT"
            per_level_spread = "0.005"
            offset_trades = true
            "#,
        );
        assert_eq!(cfg.orderbook_depth, 20);
        assert_eq!(cfg.volume_divide_by, Decimal::ONE);
        assert_eq!(cfg.per_level_spread, dec!(0.005));
        assert!(!cfg.release_committed_on_failure);
        assert_eq!(cfg.backing_pair(), TradingPair::new("XLM", "USDT"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_twap_config_needs_seven_caps() {
        let cfg: SellTwapConfig = from_toml(
            r#"
            price_feed_type = "fixed"
            price_feed_url = "0.1"
            day_of_week_daily_cap = ["100", "100", "100"]
            "#,
        );
        assert_eq!(cfg.volume_filter_mode, VolumeFilterMode::Exact);
        assert!(cfg.validate().is_err());
    }
}
