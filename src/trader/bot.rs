//! The reconciliation loop.

use crate::error::{EngineError, Result};
use crate::exchange::OfferVenue;
use crate::filter::SubmitFilter;
use crate::model::{split_offers, Asset, OfferOp, TradingPair};
use crate::risk::LiabilityTracker;
use crate::strategy::Strategy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickStats {
    pub ops: usize,
    pub tx_hash: Option<String>,
}

/// Runs a strategy against the primary venue once per tick.
pub struct Trader {
    pair: TradingPair,
    venue: Arc<dyn OfferVenue>,
    strategy: Box<dyn Strategy>,
    filters: Vec<Arc<dyn SubmitFilter>>,
    liabilities: LiabilityTracker,
    tick_interval: Duration,
}

impl Trader {
    pub fn new(
        pair: TradingPair,
        venue: Arc<dyn OfferVenue>,
        strategy: Box<dyn Strategy>,
        filters: Vec<Arc<dyn SubmitFilter>>,
        reserve_asset: Option<Asset>,
        operational_buffer: Decimal,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pair,
            venue,
            strategy,
            filters,
            liabilities: LiabilityTracker::new(HashMap::new(), reserve_asset, operational_buffer),
            tick_interval,
        }
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    /// One pass: load state, compute operations, filter and submit them.
    ///
    /// When the strategy fails, every offer is deleted so nothing stale stays
    /// on the books, and the strategy error is returned.
    #[instrument(skip(self), fields(pair = %self.pair))]
    pub async fn tick(&mut self) -> Result<TickStats> {
        let balances = self.venue.load_balances().await?;
        let offers = self.venue.load_offers(&self.pair).await?;
        let (selling, buying) = split_offers(&offers, &self.pair);
        self.liabilities.reset(balances);

        let max_base = self.liabilities.remaining(&self.pair.base).max(Decimal::ZERO);
        let max_quote = self.liabilities.remaining(&self.pair.quote).max(Decimal::ZERO);
        debug!(
            %max_base,
            %max_quote,
            selling = selling.len(),
            buying = buying.len(),
            "Loaded account state"
        );

        let update = match self.strategy.pre_update(max_base, max_quote).await {
            Ok(()) => self
                .strategy
                .update_with_ops(&buying, &selling, &mut self.liabilities),
            Err(e) => Err(e),
        };
        let mut ops = match update {
            Ok(ops) => ops,
            Err(e) => {
                error!(error = %e, "❌ [STRATEGY] Update failed, deleting all offers");
                let deletes: Vec<OfferOp> = selling.iter().chain(&buying).map(OfferOp::delete).collect();
                if let Err(delete_err) = self.submit(deletes).await {
                    error!(error = %delete_err, "Could not delete offers after strategy failure");
                }
                return Err(e);
            }
        };

        for filter in &self.filters {
            ops = filter.apply(ops, &selling, &buying)?;
        }
        self.submit(ops).await
    }

    /// Delete every offer of the market.
    pub async fn delete_all_offers(&self) -> Result<TickStats> {
        let offers = self.venue.load_offers(&self.pair).await?;
        let ops: Vec<OfferOp> = offers.iter().map(OfferOp::delete).collect();
        info!(count = ops.len(), "🧹 Deleting all offers");
        self.submit(ops).await
    }

    async fn submit(&self, ops: Vec<OfferOp>) -> Result<TickStats> {
        if ops.is_empty() {
            debug!("No operations to submit");
            return Ok(TickStats::default());
        }
        for op in &ops {
            debug!(op = %op, "Submitting operation");
        }
        let count = ops.len();
        let tx_hash = self
            .venue
            .submit_ops(ops)
            .await
            .map_err(|e| EngineError::Submission(e.to_string()))?;
        info!(ops = count, tx_hash = tx_hash.as_deref().unwrap_or("<none>"), "✅ [SUBMIT] Operations submitted");
        Ok(TickStats {
            ops: count,
            tx_hash,
        })
    }

    /// Tick until `shutdown` is set. Failed passes are retried on the next tick.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(
            pair = %self.pair,
            interval_secs = self.tick_interval.as_secs(),
            "🚀 Starting trader loop"
        );
        while !shutdown.load(Ordering::SeqCst) {
            match self.tick().await {
                Ok(stats) => debug!(ops = stats.ops, "Tick complete"),
                Err(e) => warn!(error = %e, "Tick failed, retrying next tick"),
            }
            tokio::time::sleep(self.tick_interval).await;
        }
        info!("Trader loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{LedgerVenue, OfferVenue};
    use crate::filter::{VolumeFilter, VolumeFilterConfig};
    use crate::model::{Number, Offer, OrderConstraints};
    use crate::persistence::TradeStore;
    use crate::strategy::{DeleteStrategy, Level, Reconciler, ReconcilerConfig, SellSideStrategy};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USD")
    }

    fn ledger() -> Arc<LedgerVenue> {
        let mut balances = HashMap::new();
        balances.insert(Asset::new("XLM"), dec!(1000));
        balances.insert(Asset::new("USD"), dec!(100));
        Arc::new(LedgerVenue::new(
            OrderConstraints::new(7, 7, Decimal::ZERO),
            balances,
            dec!(0.5),
        ))
    }

    struct Levels(crate::error::Result<Vec<Level>>);

    #[async_trait]
    impl crate::strategy::LevelProvider for Levels {
        async fn get_levels(&mut self, _max_base: Decimal, _max_quote: Decimal) -> Result<Vec<Level>> {
            match &self.0 {
                Ok(levels) => Ok(levels.clone()),
                Err(e) => Err(EngineError::InvariantViolation(e.to_string())),
            }
        }
    }

    fn sell_side(venue: &Arc<LedgerVenue>, levels: crate::error::Result<Vec<Level>>) -> Box<dyn Strategy> {
        let reconciler = Reconciler::new(venue.clone(), ReconcilerConfig::new(pair())).unwrap();
        Box::new(SellSideStrategy::new(Box::new(Levels(levels)), reconciler))
    }

    fn trader(venue: &Arc<LedgerVenue>, strategy: Box<dyn Strategy>, filters: Vec<Arc<dyn SubmitFilter>>) -> Trader {
        Trader::new(
            pair(),
            venue.clone(),
            strategy,
            filters,
            Some(Asset::new("XLM")),
            dec!(20),
            Duration::from_millis(10),
        )
    }

    fn level(price: Decimal, amount: Decimal) -> Level {
        Level {
            price: Number::new(price, 7),
            amount: Number::new(amount, 7),
        }
    }

    #[tokio::test]
    async fn test_tick_places_then_keeps_offers() {
        let venue = ledger();
        let mut t = trader(&venue, sell_side(&venue, Ok(vec![level(dec!(0.12), dec!(50))])), vec![]);

        let first = t.tick().await.unwrap();
        assert_eq!(first.ops, 1);
        assert_eq!(venue.offers().len(), 1);

        let second = t.tick().await.unwrap();
        assert_eq!(second, TickStats::default());
        assert_eq!(venue.submissions(), 1);
    }

    #[tokio::test]
    async fn test_filters_run_before_submit() {
        let venue = ledger();
        let store = Arc::new(TradeStore::new(":memory:").unwrap());
        let filter = VolumeFilter::new(
            "sdex",
            pair(),
            VolumeFilterConfig::parse("volume/daily/sell/base/30/exact").unwrap(),
            OrderConstraints::new(7, 7, Decimal::ZERO),
            store,
        )
        .unwrap();
        let mut t = trader(
            &venue,
            sell_side(&venue, Ok(vec![level(dec!(0.12), dec!(50))])),
            vec![Arc::new(filter)],
        );

        t.tick().await.unwrap();

        let offers: Vec<Offer> = venue.load_offers(&pair()).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].amount, "30.0000000");
    }

    #[tokio::test]
    async fn test_strategy_failure_deletes_offers() {
        let venue = ledger();
        venue.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1200000", "50.0000000");
        let failing = sell_side(&venue, Err(EngineError::InvariantViolation("bucket jump".into())));
        let mut t = trader(&venue, failing, vec![]);

        let err = t.tick().await.unwrap_err();

        assert!(matches!(err, EngineError::InvariantViolation(_)));
        assert!(venue.offers().is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_offers() {
        let venue = ledger();
        venue.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1200000", "50.0000000");
        venue.insert_offer(Asset::new("USD"), Asset::new("XLM"), "9.0000000", "5.0000000");
        let t = trader(&venue, Box::new(DeleteStrategy), vec![]);

        let stats = t.delete_all_offers().await.unwrap();

        assert_eq!(stats.ops, 2);
        assert!(venue.offers().is_empty());
    }
}
