//! Diff engine between target levels and live offers.
//!
//! Live offers and targets are paired by index, both ordered best price
//! first. A pass emits the fewest operations that turn the live side into
//! the target side, with deletes ahead of everything else so the capital
//! they free is available to the rest of the atomic batch.

use super::Level;
use crate::error::{EngineError, Result};
use crate::exchange::OfferOpBuilder;
use crate::model::{Number, Offer, OfferOp, OrderAction, TradingPair, DEFAULT_EPSILON};
use crate::risk::LiabilityTracker;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How target levels are mapped onto the primary venue.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub pair: TradingPair,
    /// Targets below this base volume are never placed
    pub backing_min_base_volume: Decimal,
    /// Applied to every target price, e.g. `1 + spread` for asks
    pub price_multiplier: Decimal,
    /// Every target volume is divided by this
    pub volume_divide_by: Decimal,
    /// Tolerance for treating a live offer as unchanged
    pub epsilon: Decimal,
}

impl ReconcilerConfig {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            backing_min_base_volume: Decimal::ZERO,
            price_multiplier: Decimal::ONE,
            volume_divide_by: Decimal::ONE,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// A live offer read in base/quote terms.
struct LiveLevel<'a> {
    offer: &'a Offer,
    /// Raw venue amount, units of `offer.selling`
    amount: Number,
    /// Raw venue price, units of `offer.buying` per `offer.selling`
    raw_price: Number,
    price: Number,
    volume: Number,
}

/// Reconciles one side of the book at a time.
pub struct Reconciler {
    builder: Arc<dyn OfferOpBuilder>,
    config: ReconcilerConfig,
    min_base_volume: Decimal,
}

impl Reconciler {
    pub fn new(builder: Arc<dyn OfferOpBuilder>, config: ReconcilerConfig) -> Result<Self> {
        if config.volume_divide_by <= Decimal::ZERO {
            return Err(EngineError::config(format!(
                "volume divisor must be positive, got {}",
                config.volume_divide_by
            )));
        }
        if config.price_multiplier <= Decimal::ZERO {
            return Err(EngineError::config(format!(
                "price multiplier must be positive, got {}",
                config.price_multiplier
            )));
        }
        let min_base_volume = config
            .backing_min_base_volume
            .max(builder.constraints().min_base_volume);
        Ok(Self {
            builder,
            config,
            min_base_volume,
        })
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Operations turning `live` into `targets` for one side.
    ///
    /// Fails without touching `liabilities` if any live offer cannot be read.
    pub fn reconcile(
        &self,
        action: OrderAction,
        live: &[Offer],
        targets: &[Level],
        liabilities: &mut LiabilityTracker,
    ) -> Result<Vec<OfferOp>> {
        let live_levels = live
            .iter()
            .map(|offer| self.read_live(action, offer))
            .collect::<Result<Vec<_>>>()?;

        let mut deletes = Vec::new();
        let mut updates = Vec::new();
        let paired = live_levels.len().min(targets.len());

        for (current, target) in live_levels.iter().zip(targets) {
            let (price, volume) = self.transform(target);
            let unchanged = current
                .price
                .equals_precision_normalized(price, self.config.epsilon)
                && current
                    .volume
                    .equals_precision_normalized(volume, self.config.epsilon);

            if unchanged {
                liabilities.reserve(
                    &current.offer.selling,
                    &current.offer.buying,
                    current.amount.value(),
                    current.amount.value() * current.raw_price.value(),
                    self.builder.fee_buffer(false),
                );
                continue;
            }

            if !volume.is_positive() || volume.value() < self.min_base_volume {
                debug!(offer_id = current.offer.id, %volume, "Target below minimum volume, deleting offer");
                deletes.push(self.builder.delete_offer(current.offer));
                continue;
            }

            match self
                .builder
                .modify_offer(current.offer, action, price, volume, liabilities)?
            {
                Some(op) => {
                    self.reserve_op(&op, false, liabilities);
                    updates.push(op);
                }
                None => {
                    debug!(offer_id = current.offer.id, "Offer no longer viable, deleting");
                    deletes.push(self.builder.delete_offer(current.offer));
                }
            }
        }

        for target in &targets[paired..] {
            let (price, volume) = self.transform(target);
            if !volume.is_positive() || volume.value() < self.min_base_volume {
                info!(
                    action = %action,
                    %price,
                    %volume,
                    min = %self.min_base_volume,
                    "Skipping level below minimum volume"
                );
                continue;
            }
            match self
                .builder
                .create_offer(&self.config.pair, action, price, volume, liabilities)?
            {
                Some(op) => {
                    self.reserve_op(&op, true, liabilities);
                    updates.push(op);
                }
                None => warn!(action = %action, %price, %volume, "Abandoned new offer"),
            }
        }

        for current in &live_levels[paired..] {
            deletes.push(self.builder.delete_offer(current.offer));
        }

        debug!(
            action = %action,
            live = live.len(),
            targets = targets.len(),
            deletes = deletes.len(),
            updates = updates.len(),
            "Reconciled side"
        );
        deletes.extend(updates);
        Ok(deletes)
    }

    fn read_live<'a>(&self, action: OrderAction, offer: &'a Offer) -> Result<LiveLevel<'a>> {
        let constraints = self.builder.constraints();
        let amount = Number::parse("offer amount", &offer.amount, constraints.volume_precision)?;
        let raw_price = Number::parse("offer price", &offer.price, constraints.price_precision)?;
        let (price, volume) = match action {
            OrderAction::Sell => (raw_price, amount),
            // buy offers sell quote for base at base-per-quote prices
            OrderAction::Buy => (raw_price.invert(), amount.multiply(raw_price)),
        };
        Ok(LiveLevel {
            offer,
            amount,
            raw_price,
            price,
            volume,
        })
    }

    /// Target price and volume as they would be placed on the primary venue.
    fn transform(&self, level: &Level) -> (Number, Number) {
        let constraints = self.builder.constraints();
        let price = Number::new(
            level.price.value() * self.config.price_multiplier,
            constraints.price_precision,
        );
        let volume = Number::new(
            level.amount.value() / self.config.volume_divide_by,
            level.amount.precision(),
        )
        .cap_precision(constraints.volume_precision);
        (price, volume)
    }

    fn reserve_op(&self, op: &OfferOp, is_new: bool, liabilities: &mut LiabilityTracker) {
        if let Some(offer) = op.manage_offer() {
            liabilities.reserve(
                &offer.selling,
                &offer.buying,
                offer.amount.value(),
                offer.amount.value() * offer.price.value(),
                self.builder.fee_buffer(is_new),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{LedgerVenue, OfferVenue};
    use crate::model::{split_offers, Asset, OrderConstraints};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USD")
    }

    fn balances() -> HashMap<Asset, Decimal> {
        let mut balances = HashMap::new();
        balances.insert(Asset::new("XLM"), dec!(10000));
        balances.insert(Asset::new("USD"), dec!(1000));
        balances
    }

    fn venue() -> Arc<LedgerVenue> {
        Arc::new(LedgerVenue::new(
            OrderConstraints::new(7, 7, Decimal::ZERO),
            balances(),
            dec!(0.5),
        ))
    }

    fn tracker() -> LiabilityTracker {
        LiabilityTracker::new(balances(), Some(Asset::new("XLM")), dec!(20))
    }

    fn reconciler(venue: &Arc<LedgerVenue>, config: ReconcilerConfig) -> Reconciler {
        Reconciler::new(venue.clone(), config).unwrap()
    }

    fn level(price: Decimal, amount: Decimal) -> Level {
        Level {
            price: Number::new(price, 7),
            amount: Number::new(amount, 7),
        }
    }

    #[test]
    fn test_unchanged_offer_is_kept_and_reserved() {
        let v = venue();
        v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        let r = reconciler(&v, ReconcilerConfig::new(pair()));
        let mut t = tracker();

        let ops = r
            .reconcile(OrderAction::Sell, &v.offers(), &[level(dec!(0.1), dec!(100))], &mut t)
            .unwrap();

        assert!(ops.is_empty());
        assert_eq!(t.liabilities(&Asset::new("XLM")).selling, dec!(100));
        assert_eq!(t.liabilities(&Asset::new("USD")).buying, dec!(10));
    }

    #[test]
    fn test_surplus_targets_are_created() {
        let v = venue();
        v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        let r = reconciler(&v, ReconcilerConfig::new(pair()));
        let mut t = tracker();

        let targets = [
            level(dec!(0.1), dec!(100)),
            level(dec!(0.11), dec!(50)),
            level(dec!(0.12), dec!(25)),
        ];
        let ops = r.reconcile(OrderAction::Sell, &v.offers(), &targets, &mut t).unwrap();

        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| matches!(op, OfferOp::Create(_))));
        // 175 base reserved plus two new-offer fee buffers
        assert_eq!(t.liabilities(&Asset::new("XLM")).selling, dec!(176));
    }

    #[test]
    fn test_deletes_come_first() {
        let v = venue();
        let first = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        let second = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1100000", "100.0000000");
        let third = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1200000", "100.0000000");
        let r = reconciler(
            &v,
            ReconcilerConfig {
                backing_min_base_volume: dec!(10),
                ..ReconcilerConfig::new(pair())
            },
        );
        let mut t = tracker();

        let targets = [level(dec!(0.1), dec!(90)), level(dec!(0.11), dec!(5))];
        let ops = r.reconcile(OrderAction::Sell, &v.offers(), &targets, &mut t).unwrap();

        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0], OfferOp::delete(&v.offers()[1]));
        assert_eq!(ops[0].offer_id(), Some(second));
        assert_eq!(ops[1].offer_id(), Some(third));
        assert!(ops[1].is_delete());
        assert!(matches!(ops[2], OfferOp::Modify { offer_id, .. } if offer_id == first));
    }

    #[test]
    fn test_unaffordable_modify_becomes_delete() {
        let v = venue();
        let id = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        let r = reconciler(&v, ReconcilerConfig::new(pair()));
        let mut small = HashMap::new();
        small.insert(Asset::new("XLM"), dec!(200));
        small.insert(Asset::new("USD"), dec!(10));
        // 200 XLM less the 20 operational buffer cannot back 500
        let mut t = LiabilityTracker::new(small, Some(Asset::new("XLM")), dec!(20));

        let ops = r
            .reconcile(OrderAction::Sell, &v.offers(), &[level(dec!(0.1), dec!(500))], &mut t)
            .unwrap();

        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_delete());
        assert_eq!(ops[0].offer_id(), Some(id));
        assert_eq!(t.liabilities(&Asset::new("XLM")).selling, Decimal::ZERO);
    }

    #[test]
    fn test_levels_below_minimum_are_not_created() {
        let v = venue();
        v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        let r = reconciler(
            &v,
            ReconcilerConfig {
                backing_min_base_volume: dec!(10),
                ..ReconcilerConfig::new(pair())
            },
        );
        let mut t = tracker();

        let targets = [
            level(dec!(0.1), dec!(100)),
            level(dec!(0.11), dec!(5)),
            level(dec!(0.12), dec!(30)),
        ];
        let ops = r.reconcile(OrderAction::Sell, &v.offers(), &targets, &mut t).unwrap();

        // 3 targets - 1 live - 1 below minimum
        assert_eq!(ops.len(), 1);
        assert!(!ops.iter().any(OfferOp::is_delete));
        let created = ops[0].manage_offer().unwrap();
        assert!(matches!(ops[0], OfferOp::Create(_)));
        assert_eq!(created.price.value(), dec!(0.12));
        assert_eq!(created.amount.value(), dec!(30));
    }

    #[test]
    fn test_levels_are_spread_and_divided() {
        let v = venue();
        let r = reconciler(
            &v,
            ReconcilerConfig {
                price_multiplier: dec!(1.01),
                volume_divide_by: dec!(4),
                ..ReconcilerConfig::new(pair())
            },
        );
        let mut t = tracker();

        let ops = r
            .reconcile(OrderAction::Sell, &[], &[level(dec!(2), dec!(10))], &mut t)
            .unwrap();

        let offer = ops[0].manage_offer().unwrap();
        assert_eq!(offer.price.value(), dec!(2.02));
        assert_eq!(offer.amount.value(), dec!(2.5));
    }

    #[test]
    fn test_unreadable_offer_aborts_pass() {
        let v = venue();
        v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1000000", "100.0000000");
        v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "n/a", "100.0000000");
        let r = reconciler(&v, ReconcilerConfig::new(pair()));
        let mut t = tracker();

        let targets = [level(dec!(0.1), dec!(100)), level(dec!(0.2), dec!(1))];
        let err = r
            .reconcile(OrderAction::Sell, &v.offers(), &targets, &mut t)
            .unwrap_err();

        assert!(matches!(err, EngineError::Parse { field: "offer price", .. }));
        assert_eq!(t.liabilities(&Asset::new("XLM")).selling, Decimal::ZERO);
    }

    #[test]
    fn test_invalid_divisor_rejected() {
        let v = venue();
        let config = ReconcilerConfig {
            volume_divide_by: Decimal::ZERO,
            ..ReconcilerConfig::new(pair())
        };
        assert!(matches!(
            Reconciler::new(v, config),
            Err(EngineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_second_pass_is_idempotent() {
        let v = venue();
        let asks = reconciler(&v, ReconcilerConfig::new(pair()));
        let bids = reconciler(&v, ReconcilerConfig::new(pair()));
        let ask_levels = [level(dec!(0.1012), dec!(120)), level(dec!(0.1025), dec!(80))];
        let bid_levels = [level(dec!(0.0995), dec!(150)), level(dec!(0.098), dec!(60))];

        let mut t = tracker();
        let mut ops = asks.reconcile(OrderAction::Sell, &[], &ask_levels, &mut t).unwrap();
        ops.extend(bids.reconcile(OrderAction::Buy, &[], &bid_levels, &mut t).unwrap());
        assert_eq!(ops.len(), 4);
        v.submit_ops(ops).await.unwrap();

        let offers = v.load_offers(&pair()).await.unwrap();
        let (selling, buying) = split_offers(&offers, &pair());
        let mut t = tracker();
        let mut again = asks.reconcile(OrderAction::Sell, &selling, &ask_levels, &mut t).unwrap();
        again.extend(bids.reconcile(OrderAction::Buy, &buying, &bid_levels, &mut t).unwrap());

        assert!(again.is_empty(), "unexpected ops: {:?}", again);
    }
}
