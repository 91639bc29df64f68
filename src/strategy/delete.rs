//! Removes every offer of the market.

use super::Strategy;
use crate::error::Result;
use crate::model::{Offer, OfferOp};
use crate::risk::LiabilityTracker;
use async_trait::async_trait;
use tracing::info;

#[derive(Debug, Default)]
pub struct DeleteStrategy;

#[async_trait]
impl Strategy for DeleteStrategy {
    fn update_with_ops(
        &mut self,
        buying_offers: &[Offer],
        selling_offers: &[Offer],
        _liabilities: &mut LiabilityTracker,
    ) -> Result<Vec<OfferOp>> {
        let ops: Vec<OfferOp> = selling_offers
            .iter()
            .chain(buying_offers)
            .map(OfferOp::delete)
            .collect();
        info!(count = ops.len(), "Deleting all offers");
        Ok(ops)
    }
}
