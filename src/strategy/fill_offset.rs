//! Hedging of primary-venue fills on the backing venue.
//!
//! Fills accumulate per direction until there is enough to place an order
//! the backing venue accepts. Every fill is handled under one lock that is
//! held across the hedge submission, so at most one hedge is in flight and
//! no fill can observe a half-updated surplus.

use super::FillHandler;
use crate::error::{EngineError, Result};
use crate::exchange::TradeApi;
use crate::model::{Number, Order, OrderAction, OrderConstraints, Trade, TradingPair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Base volume waiting to be hedged in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetSurplus {
    /// Filled volume not yet hedged
    pub total: Decimal,
    /// Part of `total` claimed by a hedge order in flight
    pub committed: Decimal,
}

impl AssetSurplus {
    pub fn uncommitted(&self) -> Decimal {
        self.total - self.committed
    }
}

/// Places reverse orders on the backing venue for fills on the primary one.
pub struct FillOffsetTracker {
    trade_api: Arc<dyn TradeApi>,
    backing_pair: TradingPair,
    backing_constraints: OrderConstraints,
    surplus: Mutex<HashMap<OrderAction, AssetSurplus>>,
    release_committed_on_failure: bool,
}

impl FillOffsetTracker {
    pub fn new(
        trade_api: Arc<dyn TradeApi>,
        backing_pair: TradingPair,
        backing_constraints: OrderConstraints,
        release_committed_on_failure: bool,
    ) -> Self {
        Self {
            trade_api,
            backing_pair,
            backing_constraints,
            surplus: Mutex::new(HashMap::new()),
            release_committed_on_failure,
        }
    }

    /// Current surplus for hedge orders in direction `action`.
    pub async fn surplus(&self, action: OrderAction) -> AssetSurplus {
        self.surplus
            .lock()
            .await
            .get(&action)
            .copied()
            .unwrap_or_default()
    }

    fn volume_to_offset(&self, surplus: &AssetSurplus) -> Option<Number> {
        let min = self.backing_constraints.min_base_volume;
        let uncommitted = surplus.uncommitted();
        if uncommitted <= Decimal::ZERO || uncommitted < min * dec!(0.5) {
            return None;
        }
        let volume = if uncommitted > min { uncommitted } else { min };
        let volume = Number::new(volume, self.backing_constraints.volume_precision);
        volume.is_positive().then_some(volume)
    }

    #[instrument(skip(self, trade), fields(trade_id = trade.id()))]
    async fn offset(&self, trade: &Trade) -> Result<()> {
        let mut surplus = self.surplus.lock().await;
        let action = trade.order.action.reverse();
        let entry = surplus.entry(action).or_default();
        entry.total += trade.order.volume.value();

        let Some(volume) = self.volume_to_offset(entry) else {
            info!(
                action = %action,
                total = %entry.total,
                committed = %entry.committed,
                min_base_volume = %self.backing_constraints.min_base_volume,
                "offset-skip"
            );
            return Ok(());
        };
        entry.committed += volume.value();

        let order = Order::limit(
            self.backing_pair.clone(),
            action,
            Number::new(trade.order.price.value(), self.backing_constraints.price_precision),
            volume,
        );
        info!(
            action = %action,
            total = %entry.total,
            committed = %entry.committed,
            volume = %volume,
            price = %order.price,
            "offset-attempt"
        );

        let failure = match self.trade_api.add_order(&order).await {
            Ok(Some(txid)) => {
                entry.total -= volume.value();
                entry.committed -= volume.value();
                info!(
                    %txid,
                    total = %entry.total,
                    committed = %entry.committed,
                    "offset-success"
                );
                return Ok(());
            }
            Ok(None) => format!("error when offsetting trade ({}): transaction id was empty", order),
            Err(e) => format!("error when offsetting trade ({}): {}", order, e),
        };

        if self.release_committed_on_failure {
            entry.committed -= volume.value();
        }
        warn!(
            committed = %entry.committed,
            released = self.release_committed_on_failure,
            "{}",
            failure
        );
        Err(EngineError::Submission(failure))
    }
}

#[async_trait]
impl FillHandler for FillOffsetTracker {
    async fn handle_fill(&self, trade: &Trade) -> Result<()> {
        self.offset(trade).await
    }
}
