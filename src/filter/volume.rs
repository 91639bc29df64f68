//! Daily volume caps.
//!
//! Any single configured cap being reached suspends further selling for the
//! rest of the UTC day. Volumes already sold today ("on the books") come
//! from the daily-volume store; volumes of operations accepted earlier in the
//! same call ("to be booked") are accumulated locally.

use super::{filter_ops, SubmitFilter};
use crate::error::{EngineError, Result};
use crate::model::{ManageOffer, Number, Offer, OfferOp, OrderAction, OrderConstraints, TradingPair};
use crate::utils::decimal::truncate_to_precision;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Market identifier shared by every venue quoting the same pair:
/// the first 10 hex characters of `sha256("{venue}_{base}_{quote}")`.
pub fn make_market_id(venue: &str, base: &str, quote: &str) -> String {
    let digest = Sha256::digest(format!("{}_{}_{}", venue, base, quote).as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(10);
    id
}

/// Base and quote volume traded on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyVolume {
    pub base_vol: Decimal,
    pub quote_vol: Decimal,
}

/// Source of today's realized volume, summed across markets.
#[cfg_attr(test, mockall::automock)]
pub trait DailyVolumeStore: Send + Sync {
    fn daily_volume(
        &self,
        market_ids: &[String],
        action: OrderAction,
        date: NaiveDate,
    ) -> anyhow::Result<DailyVolume>;
}

/// What to do with an order that would breach a cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeFilterMode {
    /// Shrink to exactly the remaining capacity
    Exact,
    /// Drop the order
    Ignore,
}

impl FromStr for VolumeFilterMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "exact" => Ok(Self::Exact),
            "ignore" => Ok(Self::Ignore),
            other => Err(EngineError::config(format!("invalid volume filter mode '{}'", other))),
        }
    }
}

impl fmt::Display for VolumeFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

/// Daily caps on selling the base asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeFilterConfig {
    pub sell_base_cap_in_base_units: Option<Decimal>,
    pub sell_base_cap_in_quote_units: Option<Decimal>,
    pub mode: VolumeFilterMode,
    #[serde(default)]
    pub additional_market_ids: Vec<String>,
}

impl VolumeFilterConfig {
    /// Parse `volume/daily[:id1,id2]/sell/{base|quote}/{cap}/{exact|ignore}`.
    pub fn parse(raw: &str) -> Result<Self> {
        let bad = |why: &str| EngineError::config(format!("invalid volume filter '{}': {}", raw, why));
        let parts: Vec<&str> = raw.split('/').collect();
        let [kind, period, action, unit, cap, mode] = parts.as_slice() else {
            return Err(bad("expected 6 '/'-separated parts"));
        };
        if *kind != "volume" {
            return Err(bad("must start with 'volume'"));
        }

        let (period, ids) = match period.split_once(':') {
            Some((p, ids)) => (p, ids),
            None => (*period, ""),
        };
        if period != "daily" {
            return Err(bad("only 'daily' limits are supported"));
        }
        let additional_market_ids = ids
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        if *action != "sell" {
            return Err(bad("only 'sell' limits are supported"));
        }
        let cap = Decimal::from_str(cap).map_err(|e| bad(&e.to_string()))?;
        let mode: VolumeFilterMode = mode.parse()?;

        let mut config = Self {
            sell_base_cap_in_base_units: None,
            sell_base_cap_in_quote_units: None,
            mode,
            additional_market_ids,
        };
        match *unit {
            "base" => config.sell_base_cap_in_base_units = Some(cap),
            "quote" => config.sell_base_cap_in_quote_units = Some(cap),
            _ => return Err(bad("unit must be 'base' or 'quote'")),
        }
        config.validate()?;
        Ok(config)
    }

    /// Merge several configured strings into one config. Modes must agree.
    pub fn parse_all<S: AsRef<str>>(raw: &[S]) -> Result<Self> {
        let mut merged: Option<Self> = None;
        for r in raw {
            let next = Self::parse(r.as_ref())?;
            merged = Some(match merged {
                None => next,
                Some(mut m) => {
                    if m.mode != next.mode {
                        return Err(EngineError::config("volume filters disagree on mode"));
                    }
                    m.sell_base_cap_in_base_units =
                        next.sell_base_cap_in_base_units.or(m.sell_base_cap_in_base_units);
                    m.sell_base_cap_in_quote_units =
                        next.sell_base_cap_in_quote_units.or(m.sell_base_cap_in_quote_units);
                    m.additional_market_ids.extend(next.additional_market_ids);
                    m
                }
            });
        }
        merged.ok_or_else(|| EngineError::config("the volume filter config was empty"))
    }

    pub fn is_empty(&self) -> bool {
        self.sell_base_cap_in_base_units.is_none() && self.sell_base_cap_in_quote_units.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(EngineError::config("the volume filter config was empty"));
        }
        for cap in [self.sell_base_cap_in_base_units, self.sell_base_cap_in_quote_units]
            .into_iter()
            .flatten()
        {
            if cap.is_sign_negative() {
                return Err(EngineError::config(format!("volume cap must not be negative, was {}", cap)));
            }
        }
        Ok(())
    }
}

impl fmt::Display for VolumeFilterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<Decimal>| v.map_or("<nil>".to_string(), |d| d.to_string());
        write!(
            f,
            "VolumeFilterConfig[base_cap={}, quote_cap={}, mode={}, additional_market_ids={:?}]",
            show(self.sell_base_cap_in_base_units),
            show(self.sell_base_cap_in_quote_units),
            self.mode,
            self.additional_market_ids
        )
    }
}

/// Running totals for one `apply` call.
#[derive(Debug, Default)]
struct Totals {
    on_the_books: DailyVolume,
    to_be_booked: DailyVolume,
}

/// Submit filter enforcing daily sell caps across one or more markets.
pub struct VolumeFilter {
    pair: TradingPair,
    market_ids: Vec<String>,
    config: VolumeFilterConfig,
    constraints: OrderConstraints,
    store: Arc<dyn DailyVolumeStore>,
}

impl VolumeFilter {
    pub fn new(
        venue: &str,
        pair: TradingPair,
        config: VolumeFilterConfig,
        constraints: OrderConstraints,
        store: Arc<dyn DailyVolumeStore>,
    ) -> Result<Self> {
        config.validate()?;
        let mut market_ids = vec![make_market_id(venue, pair.base.code(), pair.quote.code())];
        for id in &config.additional_market_ids {
            if !market_ids.contains(id) {
                market_ids.push(id.clone());
            }
        }
        Ok(Self {
            pair,
            market_ids,
            config,
            constraints,
            store,
        })
    }

    pub fn market_ids(&self) -> &[String] {
        &self.market_ids
    }

    pub fn config(&self) -> &VolumeFilterConfig {
        &self.config
    }

    pub fn is_selling_base(&self) -> bool {
        !self.config.is_empty()
    }

    /// Base-unit cap, required by callers that pace sales against it.
    pub fn must_base_cap_in_base_units(&self) -> Result<Decimal> {
        self.config.sell_base_cap_in_base_units.ok_or_else(|| {
            EngineError::config(format!("volume filter has no base-unit cap: {}", self.config))
        })
    }

    /// Base sold and quote received on `date` across all markets.
    pub fn daily_values(&self, date: NaiveDate) -> Result<DailyVolume> {
        Ok(self
            .store
            .daily_volume(&self.market_ids, OrderAction::Sell, date)?)
    }

    /// Apply the caps to `ops` using today's realized volume.
    pub fn apply(
        &self,
        ops: Vec<OfferOp>,
        selling_offers: &[Offer],
        buying_offers: &[Offer],
    ) -> Result<Vec<OfferOp>> {
        self.apply_on(Utc::now().date_naive(), ops, selling_offers, buying_offers)
    }

    pub fn apply_on(
        &self,
        date: NaiveDate,
        ops: Vec<OfferOp>,
        selling_offers: &[Offer],
        buying_offers: &[Offer],
    ) -> Result<Vec<OfferOp>> {
        let on_the_books = self.daily_values(date)?;
        info!(
            %date,
            base_sold = %on_the_books.base_vol,
            quote_received = %on_the_books.quote_vol,
            config = %self.config,
            "Daily volume on the books"
        );

        let mut totals = Totals {
            on_the_books,
            ..Default::default()
        };
        filter_ops(
            "volume_filter",
            ops,
            selling_offers,
            buying_offers,
            &self.constraints,
            |offer| Ok(self.check(&mut totals, offer)),
        )
    }

    /// Decide one candidate, updating `totals.to_be_booked` when it survives.
    fn check(&self, totals: &mut Totals, offer: &ManageOffer) -> Option<ManageOffer> {
        let is_sell = offer.selling == self.pair.base && offer.buying == self.pair.quote;
        if !is_sell {
            return Some(offer.clone());
        }

        let price = offer.price.value();
        let original = offer.amount.value();
        let mut amount = original;
        let otb = totals.on_the_books;
        let tbb = totals.to_be_booked;

        let keep_base = match self.config.sell_base_cap_in_base_units {
            None => true,
            Some(cap) => {
                let projected = otb.base_vol + tbb.base_vol + amount;
                let mut keep = projected <= cap;
                if !keep && self.config.mode == VolumeFilterMode::Exact {
                    let shrunk = truncate_to_precision(cap - otb.base_vol - tbb.base_vol, self.constraints.volume_precision);
                    if shrunk > Decimal::ZERO {
                        amount = shrunk;
                        keep = true;
                    }
                }
                debug!(%price, %original, %projected, %cap, keep, %amount, "Volume filter base-unit check");
                keep
            }
        };

        let keep_quote = match self.config.sell_base_cap_in_quote_units {
            None => true,
            Some(cap) => {
                let projected = otb.quote_vol + tbb.quote_vol + amount * price;
                let mut keep = projected <= cap;
                if !keep && self.config.mode == VolumeFilterMode::Exact && price > Decimal::ZERO {
                    let shrunk = truncate_to_precision(
                        (cap - otb.quote_vol - tbb.quote_vol) / price,
                        self.constraints.volume_precision,
                    );
                    if shrunk > Decimal::ZERO {
                        amount = shrunk;
                        keep = true;
                    }
                }
                debug!(%price, %original, %projected, %cap, keep, %amount, "Volume filter quote-unit check");
                keep
            }
        };

        if !(keep_base && keep_quote) {
            info!(%price, amount = %original, "Volume filter dropped offer");
            return None;
        }

        totals.to_be_booked.base_vol += amount;
        totals.to_be_booked.quote_vol += amount * price;

        let mut kept = offer.clone();
        if amount != original {
            kept.amount = Number::new(amount, offer.amount.precision());
            info!(%price, from = %original, to = %amount, "Volume filter shrunk offer");
        }
        Some(kept)
    }
}

impl SubmitFilter for VolumeFilter {
    fn name(&self) -> &str {
        "volume_filter"
    }

    fn apply(
        &self,
        ops: Vec<OfferOp>,
        selling_offers: &[Offer],
        buying_offers: &[Offer],
    ) -> Result<Vec<OfferOp>> {
        VolumeFilter::apply(self, ops, selling_offers, buying_offers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Asset;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USD")
    }

    fn constraints() -> OrderConstraints {
        OrderConstraints::new(7, 7, Decimal::ZERO)
    }

    fn store(base: Decimal, quote: Decimal) -> Arc<dyn DailyVolumeStore> {
        let mut mock = MockDailyVolumeStore::new();
        mock.expect_daily_volume().returning(move |_, _, _| {
            Ok(DailyVolume {
                base_vol: base,
                quote_vol: quote,
            })
        });
        Arc::new(mock)
    }

    fn sell(amount: Decimal, price: Decimal) -> OfferOp {
        OfferOp::Create(ManageOffer {
            selling: Asset::new("XLM"),
            buying: Asset::new("USD"),
            amount: Number::new(amount, 7),
            price: Number::new(price, 7),
        })
    }

    fn config(base: Option<Decimal>, quote: Option<Decimal>, mode: VolumeFilterMode) -> VolumeFilterConfig {
        VolumeFilterConfig {
            sell_base_cap_in_base_units: base,
            sell_base_cap_in_quote_units: quote,
            mode,
            additional_market_ids: vec![],
        }
    }

    #[test]
    fn test_market_id_is_stable() {
        let id = make_market_id("sdex", "XLM", "USD");
        assert_eq!(id.len(), 10);
        assert_eq!(id, make_market_id("sdex", "XLM", "USD"));
        assert_ne!(id, make_market_id("sdex", "USD", "XLM"));
    }

    #[test]
    fn test_exact_mode_shrinks_to_cap() {
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(100)), None, VolumeFilterMode::Exact),
            constraints(),
            store(dec!(80), dec!(8)),
        )
        .unwrap();

        let mut totals = Totals {
            on_the_books: DailyVolume {
                base_vol: dec!(80),
                quote_vol: dec!(8),
            },
            ..Default::default()
        };
        let op = sell(dec!(30), dec!(0.1));
        let kept = filter.check(&mut totals, op.manage_offer().unwrap()).unwrap();
        assert_eq!(kept.amount.value(), dec!(20));
        assert_eq!(totals.to_be_booked.base_vol, dec!(20));

        // cap is exhausted for everything after
        let next = sell(dec!(5), dec!(0.2));
        assert!(filter.check(&mut totals, next.manage_offer().unwrap()).is_none());
        assert_eq!(totals.to_be_booked.base_vol, dec!(20));
    }

    #[test]
    fn test_ignore_mode_drops() {
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(100)), None, VolumeFilterMode::Ignore),
            constraints(),
            store(dec!(80), dec!(8)),
        )
        .unwrap();

        let mut totals = Totals {
            on_the_books: DailyVolume {
                base_vol: dec!(80),
                quote_vol: dec!(8),
            },
            ..Default::default()
        };
        let op = sell(dec!(30), dec!(0.1));
        assert!(filter.check(&mut totals, op.manage_offer().unwrap()).is_none());
        assert_eq!(totals.to_be_booked.base_vol, Decimal::ZERO);
        assert_eq!(totals.to_be_booked.quote_vol, Decimal::ZERO);

        let out = filter.apply(vec![sell(dec!(30), dec!(0.1))], &[], &[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_untouched_offer_keeps_its_price_precision() {
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(100)), None, VolumeFilterMode::Exact),
            OrderConstraints::new(7, 2, Decimal::ZERO),
            store(dec!(80), dec!(8)),
        )
        .unwrap();
        let live = Offer {
            id: 9,
            selling: Asset::new("XLM"),
            buying: Asset::new("USD"),
            price: "0.1234567".to_string(),
            amount: "30.00".to_string(),
        };

        let out = filter.apply(vec![], &[live], &[]).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].offer_id(), Some(9));
        assert!(matches!(out[0], OfferOp::Modify { .. }));
        let kept = out[0].manage_offer().unwrap();
        assert_eq!(kept.price.value(), dec!(0.1234567));
        assert_eq!(kept.amount.value(), dec!(20));
        assert_eq!(kept.amount.precision(), 2);
    }

    #[test]
    fn test_quote_cap_uses_shrunk_amount() {
        // base cap shrinks 30 -> 20; 20 * 0.5 = 10 quote fits under 12
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(100)), Some(dec!(12)), VolumeFilterMode::Exact),
            constraints(),
            store(dec!(80), dec!(0)),
        )
        .unwrap();
        let out = filter.apply(vec![sell(dec!(30), dec!(0.5))], &[], &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].manage_offer().unwrap().amount.value(), dec!(20));
    }

    #[test]
    fn test_best_price_consumes_cap_first() {
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(10)), None, VolumeFilterMode::Ignore),
            constraints(),
            store(dec!(0), dec!(0)),
        )
        .unwrap();
        let ops = vec![sell(dec!(8), dec!(0.3)), sell(dec!(8), dec!(0.2))];
        let out = filter.apply(ops, &[], &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].manage_offer().unwrap().price.value(), dec!(0.2));
    }

    #[test]
    fn test_buy_offers_pass() {
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            config(Some(dec!(1)), None, VolumeFilterMode::Ignore),
            constraints(),
            store(dec!(50), dec!(0)),
        )
        .unwrap();
        let buy = OfferOp::Create(ManageOffer {
            selling: Asset::new("USD"),
            buying: Asset::new("XLM"),
            amount: Number::new(dec!(10), 7),
            price: Number::new(dec!(10), 7),
        });
        let out = filter.apply(vec![buy.clone()], &[], &[]).unwrap();
        assert_eq!(out, vec![buy]);
    }

    #[test]
    fn test_parse_config_strings() {
        let c = VolumeFilterConfig::parse("volume/daily:abc,def/sell/base/1000/exact").unwrap();
        assert_eq!(c.sell_base_cap_in_base_units, Some(dec!(1000)));
        assert_eq!(c.additional_market_ids, vec!["abc", "def"]);

        let merged = VolumeFilterConfig::parse_all(&[
            "volume/daily/sell/base/1000/ignore",
            "volume/daily/sell/quote/50.5/ignore",
        ])
        .unwrap();
        assert_eq!(merged.sell_base_cap_in_quote_units, Some(dec!(50.5)));
        assert_eq!(merged.mode, VolumeFilterMode::Ignore);

        assert!(VolumeFilterConfig::parse("volume/weekly/sell/base/1/exact").is_err());
        assert!(VolumeFilterConfig::parse("volume/daily/buy/base/1/exact").is_err());
        assert!(VolumeFilterConfig::parse("volume/daily/sell/base/-1/exact").is_err());
        assert!(VolumeFilterConfig::parse_all::<&str>(&[]).is_err());
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = VolumeFilter::new(
            "sdex",
            pair(),
            config(None, None, VolumeFilterMode::Exact),
            constraints(),
            store(dec!(0), dec!(0)),
        );
        assert!(matches!(err, Err(EngineError::Config(_))));
    }
}
