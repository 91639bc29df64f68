//! Market-making strategies.
//!
//! Contains the core logic for:
//! - Reconciling target levels against live offers
//! - Mirroring a backing venue's order book and hedging fills there
//! - Pacing a daily sell target across time buckets (TWAP)
//! - Clearing all offers on shutdown

mod delete;
mod fill_offset;
mod mirror;
mod offset;
mod reconciler;
mod registry;
mod sell_side;
mod twap;

pub use delete::DeleteStrategy;
pub use fill_offset::{AssetSurplus, FillOffsetTracker};
pub use mirror::MirrorStrategy;
pub use offset::RateOffset;
pub use reconciler::{Reconciler, ReconcilerConfig};
pub use registry::{StrategyContext, StrategyEntry, StrategyRegistry};
pub use sell_side::SellSideStrategy;
pub use twap::{SellTwapLevelProvider, TwapParams};

use crate::error::Result;
use crate::model::{Number, Offer, OfferOp, Trade};
use crate::risk::LiabilityTracker;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// One price level in base/quote terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Level {
    /// Quote units per base unit
    pub price: Number,
    /// Base units
    pub amount: Number,
}

/// Produces the target levels for one side of the book.
#[async_trait]
pub trait LevelProvider: Send {
    /// Levels to place, best price first. `max_base` and `max_quote` are
    /// the balances still available to the side.
    async fn get_levels(&mut self, max_base: Decimal, max_quote: Decimal) -> Result<Vec<Level>>;
}

/// Handles a fill observed on the primary venue.
#[async_trait]
pub trait FillHandler: Send + Sync {
    async fn handle_fill(&self, trade: &Trade) -> Result<()>;
}

/// A strategy run once per tick by the trader.
#[async_trait]
pub trait Strategy: Send {
    /// Refresh external state before operations are computed.
    async fn pre_update(&mut self, _max_base: Decimal, _max_quote: Decimal) -> Result<()> {
        Ok(())
    }

    /// Corrective operations for the current live offers. Capital used by
    /// kept and new offers is recorded in `liabilities`.
    fn update_with_ops(
        &mut self,
        buying_offers: &[Offer],
        selling_offers: &[Offer],
        liabilities: &mut LiabilityTracker,
    ) -> Result<Vec<OfferOp>>;

    /// Handlers to notify about fills on the primary venue.
    fn fill_handlers(&self) -> Vec<Arc<dyn FillHandler>> {
        Vec::new()
    }
}
