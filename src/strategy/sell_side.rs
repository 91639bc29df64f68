//! One-sided selling driven by a level provider.

use super::{Level, LevelProvider, Reconciler, Strategy};
use crate::error::Result;
use crate::model::{Offer, OfferOp, OrderAction};
use crate::risk::LiabilityTracker;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::debug;

/// Keeps the provider's levels on the sell side and nothing on the buy side.
pub struct SellSideStrategy {
    provider: Box<dyn LevelProvider>,
    reconciler: Reconciler,
    levels: Vec<Level>,
}

impl SellSideStrategy {
    pub fn new(provider: Box<dyn LevelProvider>, reconciler: Reconciler) -> Self {
        Self {
            provider,
            reconciler,
            levels: Vec::new(),
        }
    }
}

#[async_trait]
impl Strategy for SellSideStrategy {
    async fn pre_update(&mut self, max_base: Decimal, max_quote: Decimal) -> Result<()> {
        self.levels = self.provider.get_levels(max_base, max_quote).await?;
        debug!(levels = self.levels.len(), "Sell levels refreshed");
        Ok(())
    }

    fn update_with_ops(
        &mut self,
        buying_offers: &[Offer],
        selling_offers: &[Offer],
        liabilities: &mut LiabilityTracker,
    ) -> Result<Vec<OfferOp>> {
        let mut ops: Vec<OfferOp> = buying_offers.iter().map(OfferOp::delete).collect();
        ops.extend(self.reconciler.reconcile(
            OrderAction::Sell,
            selling_offers,
            &self.levels,
            liabilities,
        )?);
        ops.sort_by_key(|op| !op.is_delete());
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::LedgerVenue;
    use crate::model::{Asset, Number, OrderConstraints, TradingPair};
    use crate::strategy::ReconcilerConfig;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct FixedLevels(Vec<Level>);

    #[async_trait]
    impl LevelProvider for FixedLevels {
        async fn get_levels(&mut self, _max_base: Decimal, _max_quote: Decimal) -> Result<Vec<Level>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_sells_levels_and_clears_bids() {
        let mut balances = HashMap::new();
        balances.insert(Asset::new("XLM"), dec!(1000));
        let ledger = Arc::new(LedgerVenue::new(
            OrderConstraints::new(7, 7, Decimal::ZERO),
            balances.clone(),
            dec!(0.5),
        ));
        ledger.insert_offer(Asset::new("USD"), Asset::new("XLM"), "10.0000000", "5.0000000");
        let pair = TradingPair::new("XLM", "USD");
        let reconciler = Reconciler::new(ledger.clone(), ReconcilerConfig::new(pair)).unwrap();
        let level = Level {
            price: Number::new(dec!(0.12), 7),
            amount: Number::new(dec!(40), 7),
        };
        let mut s = SellSideStrategy::new(Box::new(FixedLevels(vec![level])), reconciler);

        s.pre_update(dec!(1000), Decimal::ZERO).await.unwrap();
        let mut tracker = LiabilityTracker::new(balances, Some(Asset::new("XLM")), dec!(20));
        let ops = s.update_with_ops(&ledger.offers(), &[], &mut tracker).unwrap();

        assert_eq!(ops.len(), 2);
        assert!(ops[0].is_delete());
        assert!(matches!(&ops[1], OfferOp::Create(o) if o.amount.value() == dec!(40)));
    }
}
