//! Named strategy factories, built once at start-up.

use super::{
    DeleteStrategy, MirrorStrategy, RateOffset, Reconciler, ReconcilerConfig, SellSideStrategy,
    SellTwapLevelProvider, Strategy, TwapParams,
};
use crate::config::{load_strategy_config, MirrorConfig, SellTwapConfig};
use crate::exchange::{ExchangeParams, ExchangeRegistry, OfferOpBuilder};
use crate::feed::make_price_feed;
use crate::filter::{DailyVolumeStore, VolumeFilter, VolumeFilterConfig};
use crate::model::{OrderConstraints, TradingPair};
use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a strategy factory may draw on.
pub struct StrategyContext<'a> {
    pub pair: TradingPair,
    pub builder: Arc<dyn OfferOpBuilder>,
    /// Primary venue name, used to derive market ids
    pub venue_name: String,
    pub config_path: Option<String>,
    pub exchanges: &'a ExchangeRegistry,
    pub ccxt_base_url: String,
    pub volume_store: Arc<dyn DailyVolumeStore>,
}

impl StrategyContext<'_> {
    fn config_path(&self, strategy: &str) -> Result<&str> {
        self.config_path
            .as_deref()
            .ok_or_else(|| anyhow!("strategy '{}' needs a config file", strategy))
    }
}

type StrategyFactory = Box<dyn Fn(&StrategyContext<'_>) -> Result<Box<dyn Strategy>> + Send + Sync>;

/// Registered strategy with its metadata.
pub struct StrategyEntry {
    pub description: &'static str,
    pub needs_config: bool,
    pub complexity: &'static str,
    pub sort_order: u16,
    factory: StrategyFactory,
}

/// String-keyed strategy factories.
#[derive(Default)]
pub struct StrategyRegistry {
    entries: BTreeMap<String, StrategyEntry>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "sell_twap",
            StrategyEntry {
                description: "Sells the base asset at a feed price, paced evenly across the day",
                needs_config: true,
                complexity: "Intermediate",
                sort_order: 0,
                factory: Box::new(make_sell_twap),
            },
        );
        registry.register(
            "delete",
            StrategyEntry {
                description: "Deletes all offers of the market",
                needs_config: false,
                complexity: "Beginner",
                sort_order: 2,
                factory: Box::new(make_delete),
            },
        );
        registry.register(
            "mirror",
            StrategyEntry {
                description: "Mirrors the order book of a backing venue, optionally hedging fills there",
                needs_config: true,
                complexity: "Advanced",
                sort_order: 4,
                factory: Box::new(make_mirror),
            },
        );
        registry
    }

    pub fn register(&mut self, key: &str, entry: StrategyEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    pub fn make(&self, key: &str, ctx: &StrategyContext<'_>) -> Result<Box<dyn Strategy>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| anyhow!("unknown strategy '{}'", key))?;
        (entry.factory)(ctx).with_context(|| format!("could not build strategy '{}'", key))
    }

    /// Registered strategies in display order.
    pub fn list(&self) -> Vec<(&str, &StrategyEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by_key(|(_, e)| e.sort_order);
        entries
    }
}

fn feed_params(ctx: &StrategyContext<'_>) -> ExchangeParams {
    ExchangeParams {
        ccxt_base_url: ctx.ccxt_base_url.clone(),
        constraints: OrderConstraints::new(8, 8, Decimal::ZERO),
    }
}

fn make_sell_twap(ctx: &StrategyContext<'_>) -> Result<Box<dyn Strategy>> {
    let cfg: SellTwapConfig = load_strategy_config(ctx.config_path("sell_twap")?)?;
    cfg.validate()?;

    let feed = make_price_feed(
        &cfg.price_feed_type,
        &cfg.price_feed_url,
        ctx.exchanges,
        &feed_params(ctx),
    )?;
    let offset = RateOffset {
        percent: cfg.rate_offset_percent,
        absolute: cfg.rate_offset,
        percent_first: cfg.rate_offset_percent_first,
        invert: cfg.rate_offset_invert,
    };

    let constraints = ctx.builder.constraints().clone();
    let dow_filters = cfg
        .day_of_week_daily_cap
        .iter()
        .map(|cap| {
            let filter_config = VolumeFilterConfig {
                sell_base_cap_in_base_units: Some(*cap),
                sell_base_cap_in_quote_units: None,
                mode: cfg.volume_filter_mode,
                additional_market_ids: cfg.additional_market_ids.clone(),
            };
            VolumeFilter::new(
                &ctx.venue_name,
                ctx.pair.clone(),
                filter_config,
                constraints.clone(),
                ctx.volume_store.clone(),
            )
            .map(Arc::new)
        })
        .collect::<crate::error::Result<Vec<_>>>()?;

    let params = TwapParams {
        hours_to_sell: cfg.num_hours_to_sell,
        bucket_size_seconds: cfg.parent_bucket_size_seconds,
        distribute_surplus_ceiling: cfg.distribute_surplus_over_remaining_intervals_percent_ceiling,
        smoothing_factor: cfg.exponential_smoothing_factor,
        min_child_fraction: cfg.min_child_order_size_percent_of_parent,
        seed: cfg
            .random_seed
            .unwrap_or_else(|| Utc::now().timestamp_millis().unsigned_abs()),
    };
    let provider = SellTwapLevelProvider::new(feed, offset, constraints, dow_filters, params)?;
    let reconciler = Reconciler::new(ctx.builder.clone(), ReconcilerConfig::new(ctx.pair.clone()))?;
    Ok(Box::new(SellSideStrategy::new(Box::new(provider), reconciler)))
}

fn make_delete(_ctx: &StrategyContext<'_>) -> Result<Box<dyn Strategy>> {
    Ok(Box::new(DeleteStrategy))
}

fn make_mirror(ctx: &StrategyContext<'_>) -> Result<Box<dyn Strategy>> {
    let cfg: MirrorConfig = load_strategy_config(ctx.config_path("mirror")?)?;
    let handle = ctx.exchanges.make(
        &cfg.exchange,
        &ExchangeParams {
            ccxt_base_url: ctx.ccxt_base_url.clone(),
            constraints: cfg.backing_constraints(),
        },
    )?;
    let strategy = MirrorStrategy::new(ctx.builder.clone(), ctx.pair.clone(), handle.trade_api, &cfg)?;
    Ok(Box::new(strategy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::LedgerVenue;
    use crate::persistence::TradeStore;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("mm-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn context<'a>(exchanges: &'a ExchangeRegistry, config_path: Option<String>) -> StrategyContext<'a> {
        StrategyContext {
            pair: TradingPair::new("XLM", "USD"),
            builder: Arc::new(LedgerVenue::new(
                OrderConstraints::new(7, 7, Decimal::ZERO),
                HashMap::new(),
                dec!(0.5),
            )),
            venue_name: "sdex".to_string(),
            config_path,
            exchanges,
            ccxt_base_url: "http://localhost:3000".to_string(),
            volume_store: Arc::new(TradeStore::new(":memory:").unwrap()),
        }
    }

    #[test]
    fn test_list_is_in_display_order() {
        let registry = StrategyRegistry::with_defaults();
        let keys: Vec<&str> = registry.list().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["sell_twap", "delete", "mirror"]);
    }

    #[test]
    fn test_delete_needs_no_config() {
        let exchanges = ExchangeRegistry::with_defaults();
        let registry = StrategyRegistry::with_defaults();
        assert!(registry.make("delete", &context(&exchanges, None)).is_ok());
        assert!(registry.make("mirror", &context(&exchanges, None)).is_err());
        assert!(registry.make("buysell", &context(&exchanges, None)).is_err());
    }

    #[test]
    fn test_builds_from_config_files() {
        let exchanges = ExchangeRegistry::with_defaults();
        let registry = StrategyRegistry::with_defaults();

        let twap = write_config(
            "twap",
            r#"
            price_feed_type = "fixed"
            price_feed_url = "0.1"
            day_of_week_daily_cap = ["1000", "1000", "1000", "1000", "1000", "1000", "500"]
            random_seed = 7
            "#,
        );
        let ctx = context(&exchanges, Some(twap.to_string_lossy().into_owned()));
        assert!(registry.make("sell_twap", &ctx).is_ok());

        let mirror = write_config(
            "mirror",
            r#"
            exchange = "sim"
            exchange_base = "XLM"
            exchange_quote = "USDT"
            offset_trades = true
            "#,
        );
        let ctx = context(&exchanges, Some(mirror.to_string_lossy().into_owned()));
        let strategy = registry.make("mirror", &ctx).unwrap();
        assert_eq!(strategy.fill_handlers().len(), 1);

        std::fs::remove_file(twap).ok();
        std::fs::remove_file(mirror).ok();
    }
}
