//! Capital liability tracking for a single reconciliation pass.
//!
//! Every operation built during a pass earmarks capital before the venue has
//! confirmed anything. The tracker keeps running per-asset totals so later
//! operations in the same batch cannot overcommit the account.

use crate::model::Asset;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, trace};

/// Committed totals for one asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Liabilities {
    /// Units of the asset promised to offers that sell it
    pub selling: Decimal,
    /// Units of the asset that offers would buy if filled
    pub buying: Decimal,
}

/// Running capital commitments, rebuilt from balances before each pass.
#[derive(Debug, Clone)]
pub struct LiabilityTracker {
    balances: HashMap<Asset, Decimal>,
    committed: HashMap<Asset, Liabilities>,
    /// Asset charged with per-offer fee buffers (the venue's native asset)
    reserve_asset: Option<Asset>,
    /// Amount of the reserve asset that is never made available to offers
    operational_buffer: Decimal,
}

impl LiabilityTracker {
    /// Create a tracker for a fresh pass.
    pub fn new(
        balances: HashMap<Asset, Decimal>,
        reserve_asset: Option<Asset>,
        operational_buffer: Decimal,
    ) -> Self {
        Self {
            balances,
            committed: HashMap::new(),
            reserve_asset,
            operational_buffer,
        }
    }

    /// Discard all commitments and load new balances.
    pub fn reset(&mut self, balances: HashMap<Asset, Decimal>) {
        self.balances = balances;
        self.committed.clear();
        debug!(assets = self.balances.len(), "Liabilities reset for new pass");
    }

    /// Record capital committed by an operation. Never rejects: callers check
    /// [`remaining`](Self::remaining) first.
    pub fn reserve(
        &mut self,
        selling_asset: &Asset,
        buying_asset: &Asset,
        sell_amount: Decimal,
        buy_amount: Decimal,
        fee_buffer: Decimal,
    ) {
        self.committed
            .entry(selling_asset.clone())
            .or_default()
            .selling += sell_amount;
        self.committed
            .entry(buying_asset.clone())
            .or_default()
            .buying += buy_amount;

        if fee_buffer > Decimal::ZERO {
            if let Some(reserve) = &self.reserve_asset {
                self.committed.entry(reserve.clone()).or_default().selling += fee_buffer;
            }
        }

        trace!(
            selling = %selling_asset,
            buying = %buying_asset,
            %sell_amount,
            %buy_amount,
            %fee_buffer,
            "Reserved liabilities"
        );
    }

    /// Committed totals for `asset` so far in this pass.
    pub fn liabilities(&self, asset: &Asset) -> Liabilities {
        self.committed.get(asset).copied().unwrap_or_default()
    }

    pub fn balance(&self, asset: &Asset) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Capacity still available to sell `asset` in this pass.
    ///
    /// May be negative when the caller overcommitted through `reserve`.
    pub fn remaining(&self, asset: &Asset) -> Decimal {
        let buffer = match &self.reserve_asset {
            Some(reserve) if reserve == asset => self.operational_buffer,
            _ => Decimal::ZERO,
        };
        self.balance(asset) - self.liabilities(asset).selling - buffer
    }

    /// Fee buffer charged per offer against the reserve asset.
    pub fn reserve_asset(&self) -> Option<&Asset> {
        self.reserve_asset.as_ref()
    }
}
