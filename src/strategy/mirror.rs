//! Mirrors a backing venue's order book onto the primary venue.

use super::{FillHandler, FillOffsetTracker, Level, Reconciler, ReconcilerConfig, Strategy};
use crate::config::MirrorConfig;
use crate::error::{EngineError, Result};
use crate::exchange::{OfferOpBuilder, TradeApi};
use crate::model::{Offer, OfferOp, Order, OrderAction, OrderBook, TradingPair};
use crate::risk::LiabilityTracker;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

/// Upper bound on levels per side, keeping a batch within ledger limits.
const MAX_LEVELS_PER_SIDE: usize = 50;

pub struct MirrorStrategy {
    backing: Arc<dyn TradeApi>,
    backing_pair: TradingPair,
    orderbook_depth: u32,
    bids: Reconciler,
    asks: Reconciler,
    offset_tracker: Option<Arc<FillOffsetTracker>>,
    book: Option<OrderBook>,
}

impl MirrorStrategy {
    pub fn new(
        builder: Arc<dyn OfferOpBuilder>,
        pair: TradingPair,
        backing: Arc<dyn TradeApi>,
        config: &MirrorConfig,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| EngineError::config(e.to_string()))?;
        let backing_pair = config.backing_pair();
        let backing_constraints = backing.order_constraints(&backing_pair);

        let side = |multiplier: Decimal| {
            Reconciler::new(
                builder.clone(),
                ReconcilerConfig {
                    backing_min_base_volume: backing_constraints.min_base_volume,
                    price_multiplier: multiplier,
                    volume_divide_by: config.volume_divide_by,
                    ..ReconcilerConfig::new(pair.clone())
                },
            )
        };
        let bids = side(Decimal::ONE - config.per_level_spread)?;
        let asks = side(Decimal::ONE + config.per_level_spread)?;

        let offset_tracker = config.offset_trades.then(|| {
            Arc::new(FillOffsetTracker::new(
                backing.clone(),
                backing_pair.clone(),
                backing_constraints.clone(),
                config.release_committed_on_failure,
            ))
        });

        info!(
            pair = %pair,
            backing_pair = %backing_pair,
            spread = %config.per_level_spread,
            divide_by = %config.volume_divide_by,
            offset_trades = config.offset_trades,
            "Mirror strategy configured"
        );
        Ok(Self {
            backing,
            backing_pair,
            orderbook_depth: config.orderbook_depth,
            bids,
            asks,
            offset_tracker,
            book: None,
        })
    }

    fn levels(orders: &[Order]) -> Vec<Level> {
        orders
            .iter()
            .take(MAX_LEVELS_PER_SIDE)
            .map(|o| Level {
                price: o.price,
                amount: o.volume,
            })
            .collect()
    }
}

#[async_trait]
impl Strategy for MirrorStrategy {
    #[instrument(skip(self), fields(backing_pair = %self.backing_pair))]
    async fn pre_update(&mut self, _max_base: Decimal, _max_quote: Decimal) -> Result<()> {
        self.book = None;
        let book = self
            .backing
            .get_order_book(&self.backing_pair, self.orderbook_depth)
            .await?;
        self.book = Some(book);
        Ok(())
    }

    fn update_with_ops(
        &mut self,
        buying_offers: &[Offer],
        selling_offers: &[Offer],
        liabilities: &mut LiabilityTracker,
    ) -> Result<Vec<OfferOp>> {
        let book = self.book.as_ref().ok_or_else(|| {
            EngineError::InvariantViolation("no backing order book fetched for this pass".into())
        })?;

        let buy_ops = self.bids.reconcile(
            OrderAction::Buy,
            buying_offers,
            &Self::levels(&book.bids),
            liabilities,
        )?;
        info!(count = buy_ops.len(), "Buy ops in this update");
        let sell_ops = self.asks.reconcile(
            OrderAction::Sell,
            selling_offers,
            &Self::levels(&book.asks),
            liabilities,
        )?;
        info!(count = sell_ops.len(), "Sell ops in this update");

        let lowest_ask = match selling_offers.first() {
            Some(offer) => Some(
                offer
                    .price
                    .parse::<Decimal>()
                    .map_err(|e| EngineError::Parse {
                        field: "offer price",
                        value: offer.price.clone(),
                        reason: e.to_string(),
                    })?,
            ),
            None => None,
        };
        // a backing bid crossing our lowest ask means asks have to move first
        let sells_first = match (book.top_bid(), lowest_ask) {
            (Some(bid), Some(ask)) => bid.price.value() >= ask,
            _ => false,
        };

        let mut ops = if sells_first {
            [sell_ops, buy_ops].concat()
        } else {
            [buy_ops, sell_ops].concat()
        };
        ops.sort_by_key(|op| !op.is_delete());
        Ok(ops)
    }

    fn fill_handlers(&self) -> Vec<Arc<dyn FillHandler>> {
        match &self.offset_tracker {
            Some(tracker) => vec![tracker.clone() as Arc<dyn FillHandler>],
            None => Vec::new(),
        }
    }
}
