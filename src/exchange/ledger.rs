//! Native-ledger venue.
//!
//! Offers on the ledger are expressed as "sell `amount` of `selling` at
//! `price` units of `buying` each", so a buy order for the base asset is
//! placed as an offer selling the quote asset at the inverted price.
//!
//! This implementation keeps the ledger in memory. It is what the bot runs
//! against in simulation mode and what the reconciliation tests apply their
//! operations to.

use super::traits::{OfferOpBuilder, OfferVenue, TradeFetcher, TradesResult};
use crate::error::{EngineError, Result as EngineResult};
use crate::model::{
    Asset, ManageOffer, Number, Offer, OfferOp, Order, OrderAction, OrderConstraints, Trade,
    TradingPair,
};
use crate::risk::LiabilityTracker;
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Mutable ledger contents.
#[derive(Debug, Default)]
struct LedgerState {
    offers: BTreeMap<u64, Offer>,
    balances: HashMap<Asset, Decimal>,
    trades: Vec<Trade>,
    submissions: u64,
}

/// In-memory native-ledger venue.
pub struct LedgerVenue {
    state: Mutex<LedgerState>,
    next_offer_id: AtomicU64,
    constraints: OrderConstraints,
    /// Reserve charged for each new offer entry
    new_offer_fee_buffer: Decimal,
}

impl LedgerVenue {
    pub fn new(
        constraints: OrderConstraints,
        balances: HashMap<Asset, Decimal>,
        new_offer_fee_buffer: Decimal,
    ) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                balances,
                ..Default::default()
            }),
            next_offer_id: AtomicU64::new(1),
            constraints,
            new_offer_fee_buffer,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // a poisoned ledger is still internally consistent: every mutation
        // is applied after validation
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of all live offers.
    pub fn offers(&self) -> Vec<Offer> {
        self.lock().offers.values().cloned().collect()
    }

    pub fn submissions(&self) -> u64 {
        self.lock().submissions
    }

    /// Place an offer directly, bypassing the op builder.
    pub fn insert_offer(&self, selling: Asset, buying: Asset, price: &str, amount: &str) -> u64 {
        let id = self.next_offer_id.fetch_add(1, Ordering::SeqCst);
        self.lock().offers.insert(
            id,
            Offer {
                id,
                selling,
                buying,
                price: price.to_string(),
                amount: amount.to_string(),
            },
        );
        id
    }

    /// Execute `amount` (selling units) of a resting offer against a taker.
    ///
    /// Balances move, the offer shrinks or disappears and a trade is
    /// recorded from the point of view of `pair`.
    pub fn simulate_fill(&self, offer_id: u64, amount: Decimal, pair: &TradingPair) -> Result<Trade> {
        let mut state = self.lock();
        let Some(offer) = state.offers.get(&offer_id).cloned() else {
            bail!("offer {} not found", offer_id);
        };
        let offer_amount: Decimal = offer.amount.parse()?;
        let offer_price: Decimal = offer.price.parse()?;
        let filled = amount.min(offer_amount);
        let received = filled * offer_price;

        *state.balances.entry(offer.selling.clone()).or_default() -= filled;
        *state.balances.entry(offer.buying.clone()).or_default() += received;

        let left = offer_amount - filled;
        if left.is_zero() {
            state.offers.remove(&offer_id);
        } else if let Some(o) = state.offers.get_mut(&offer_id) {
            o.amount = Number::new(left, self.constraints.volume_precision).as_string();
        }

        let (action, price, volume) = if offer.is_selling_base(pair) {
            (OrderAction::Sell, offer_price, filled)
        } else {
            let price = if offer_price.is_zero() {
                Decimal::ZERO
            } else {
                Decimal::ONE / offer_price
            };
            (OrderAction::Buy, price, received)
        };

        let trade = Trade {
            order: Order {
                timestamp: Some(Utc::now()),
                ..Order::limit(
                    pair.clone(),
                    action,
                    Number::new(price, self.constraints.price_precision),
                    Number::new(volume, self.constraints.volume_precision),
                )
            },
            transaction_id: Some(format!("fill-{}-{}", offer_id, state.trades.len())),
            cost: None,
        };
        state.trades.push(trade.clone());
        info!(offer_id, %filled, action = %action, "Simulated fill");
        Ok(trade)
    }

    /// Convert base/quote terms into the ledger's selling/buying terms.
    fn to_manage_offer(
        &self,
        pair: &TradingPair,
        action: OrderAction,
        price: Number,
        amount: Number,
    ) -> ManageOffer {
        match action {
            OrderAction::Sell => ManageOffer {
                selling: pair.base.clone(),
                buying: pair.quote.clone(),
                amount: amount.cap_precision(self.constraints.volume_precision),
                price: Number::new(price.value(), self.constraints.price_precision),
            },
            OrderAction::Buy => ManageOffer {
                selling: pair.quote.clone(),
                buying: pair.base.clone(),
                amount: Number::new(
                    amount.value() * price.value(),
                    self.constraints.volume_precision,
                ),
                price: Number::new(price.value(), self.constraints.price_precision).invert(),
            },
        }
    }

    /// `Some(offer)` when the tracker can still cover selling `offer.amount`.
    fn check_capacity(
        &self,
        offer: ManageOffer,
        fee_buffer: Decimal,
        liabilities: &LiabilityTracker,
    ) -> Option<ManageOffer> {
        let remaining = liabilities.remaining(&offer.selling);
        let mut needed = offer.amount.value();
        if liabilities.reserve_asset() == Some(&offer.selling) {
            needed += fee_buffer;
        }
        if needed > remaining {
            warn!(
                selling = %offer.selling,
                %needed,
                %remaining,
                "Insufficient capacity for offer, abandoning operation"
            );
            return None;
        }
        if let Some(reserve) = liabilities.reserve_asset() {
            if reserve != &offer.selling && fee_buffer > liabilities.remaining(reserve) {
                warn!(reserve = %reserve, %fee_buffer, "Insufficient reserve for offer fee buffer");
                return None;
            }
        }
        Some(offer)
    }

    fn apply_op(state: &mut LedgerState, op: OfferOp, id: u64) -> Result<()> {
        match op {
            OfferOp::Delete { offer_id, .. } => {
                if state.offers.remove(&offer_id).is_none() {
                    bail!("cannot delete unknown offer {}", offer_id);
                }
            }
            OfferOp::Modify { offer_id, offer } => {
                let Some(live) = state.offers.get_mut(&offer_id) else {
                    bail!("cannot modify unknown offer {}", offer_id);
                };
                live.selling = offer.selling;
                live.buying = offer.buying;
                live.amount = offer.amount.as_string();
                live.price = offer.price.as_string();
            }
            OfferOp::Create(offer) => {
                state.offers.insert(
                    id,
                    Offer {
                        id,
                        selling: offer.selling,
                        buying: offer.buying,
                        amount: offer.amount.as_string(),
                        price: offer.price.as_string(),
                    },
                );
            }
        }
        Ok(())
    }
}

impl OfferOpBuilder for LedgerVenue {
    fn constraints(&self) -> &OrderConstraints {
        &self.constraints
    }

    fn fee_buffer(&self, is_new_offer: bool) -> Decimal {
        if is_new_offer {
            self.new_offer_fee_buffer
        } else {
            Decimal::ZERO
        }
    }

    fn create_offer(
        &self,
        pair: &TradingPair,
        action: OrderAction,
        price: Number,
        amount: Number,
        liabilities: &LiabilityTracker,
    ) -> EngineResult<Option<OfferOp>> {
        if !price.is_positive() {
            return Err(EngineError::InvariantViolation(format!(
                "cannot create offer with non-positive price {}",
                price
            )));
        }
        let offer = self.to_manage_offer(pair, action, price, amount);
        Ok(self
            .check_capacity(offer, self.fee_buffer(true), liabilities)
            .map(OfferOp::Create))
    }

    fn modify_offer(
        &self,
        offer: &Offer,
        action: OrderAction,
        price: Number,
        amount: Number,
        liabilities: &LiabilityTracker,
    ) -> EngineResult<Option<OfferOp>> {
        if !price.is_positive() {
            return Ok(None);
        }
        let pair = match action {
            OrderAction::Sell => TradingPair::new(offer.selling.clone(), offer.buying.clone()),
            OrderAction::Buy => TradingPair::new(offer.buying.clone(), offer.selling.clone()),
        };
        let manage = self.to_manage_offer(&pair, action, price, amount);
        Ok(self
            .check_capacity(manage, self.fee_buffer(false), liabilities)
            .map(|m| OfferOp::Modify {
                offer_id: offer.id,
                offer: m,
            }))
    }
}

#[async_trait]
impl OfferVenue for LedgerVenue {
    async fn load_offers(&self, pair: &TradingPair) -> Result<Vec<Offer>> {
        Ok(self
            .lock()
            .offers
            .values()
            .filter(|o| o.is_selling_base(pair) || o.is_buying_base(pair))
            .cloned()
            .collect())
    }

    async fn load_balances(&self) -> Result<HashMap<Asset, Decimal>> {
        Ok(self.lock().balances.clone())
    }

    async fn submit_ops(&self, ops: Vec<OfferOp>) -> Result<Option<String>> {
        if ops.is_empty() {
            return Ok(None);
        }
        let mut state = self.lock();

        // validate against a copy so a bad batch leaves the ledger untouched
        let mut staged = LedgerState {
            offers: state.offers.clone(),
            ..Default::default()
        };
        let mut ids = Vec::with_capacity(ops.len());
        for op in &ops {
            let id = match op {
                OfferOp::Create(_) => self.next_offer_id.fetch_add(1, Ordering::SeqCst),
                _ => 0,
            };
            Self::apply_op(&mut staged, op.clone(), id)?;
            ids.push(id);
        }

        state.offers = staged.offers;
        state.submissions += 1;
        let hash = format!("tx-{}", state.submissions);
        debug!(ops = ops.len(), %hash, "Submitted operations to ledger");
        Ok(Some(hash))
    }
}

#[async_trait]
impl TradeFetcher for LedgerVenue {
    async fn get_trades(&self, _pair: &TradingPair, cursor: Option<String>) -> Result<TradesResult> {
        let state = self.lock();
        let start = match cursor {
            Some(c) => c.parse::<usize>()?,
            None => 0,
        };
        let trades: Vec<Trade> = state.trades.iter().skip(start).cloned().collect();
        Ok(TradesResult {
            trades,
            cursor: Some(state.trades.len().to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> TradingPair {
        TradingPair::new("XLM", "USD")
    }

    fn venue() -> LedgerVenue {
        let mut balances = HashMap::new();
        balances.insert(Asset::new("XLM"), dec!(1000));
        balances.insert(Asset::new("USD"), dec!(100));
        LedgerVenue::new(OrderConstraints::new(7, 7, dec!(1)), balances, dec!(0.5))
    }

    fn tracker(venue: &LedgerVenue) -> LiabilityTracker {
        let balances = venue.lock().balances.clone();
        LiabilityTracker::new(balances, Some(Asset::new("XLM")), dec!(20))
    }

    #[test]
    fn test_buy_offer_is_inverted() {
        let v = venue();
        let t = tracker(&v);
        let op = v
            .create_offer(
                &pair(),
                OrderAction::Buy,
                Number::new(dec!(0.25), 7),
                Number::new(dec!(100), 7),
                &t,
            )
            .unwrap()
            .unwrap();
        let m = op.manage_offer().unwrap();
        assert_eq!(m.selling, Asset::new("USD"));
        assert_eq!(m.buying, Asset::new("XLM"));
        assert_eq!(m.amount.value(), dec!(25));
        assert_eq!(m.price.value(), dec!(4));
    }

    #[test]
    fn test_create_abandoned_without_capacity() {
        let v = venue();
        let t = tracker(&v);
        // 990 XLM + 0.5 fee buffer > 1000 - 20 operational buffer
        let op = v
            .create_offer(
                &pair(),
                OrderAction::Sell,
                Number::new(dec!(0.1), 7),
                Number::new(dec!(990), 7),
                &t,
            )
            .unwrap();
        assert!(op.is_none());
    }

    #[tokio::test]
    async fn test_submit_is_atomic() {
        let v = venue();
        let id = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1", "10");
        let good = OfferOp::delete(&v.offers()[0]);
        let bad = OfferOp::Delete {
            offer_id: 999,
            selling: Asset::new("XLM"),
            buying: Asset::new("USD"),
        };

        assert!(v.submit_ops(vec![good.clone(), bad]).await.is_err());
        assert_eq!(v.offers().len(), 1);
        assert_eq!(v.offers()[0].id, id);

        assert!(v.submit_ops(vec![good]).await.unwrap().is_some());
        assert!(v.offers().is_empty());
    }

    #[tokio::test]
    async fn test_simulated_fill_records_trade() {
        let v = venue();
        let id = v.insert_offer(Asset::new("XLM"), Asset::new("USD"), "0.1", "10");
        let trade = v.simulate_fill(id, dec!(4), &pair()).unwrap();
        assert_eq!(trade.order.action, OrderAction::Sell);
        assert_eq!(trade.order.volume.value(), dec!(4));
        assert_eq!(v.offers()[0].amount, "6.0000000");

        let balances = v.load_balances().await.unwrap();
        assert_eq!(balances[&Asset::new("XLM")], dec!(996));
        assert_eq!(balances[&Asset::new("USD")], dec!(100.4));

        let page = v.get_trades(&pair(), None).await.unwrap();
        assert_eq!(page.trades.len(), 1);
        let next = v.get_trades(&pair(), page.cursor).await.unwrap();
        assert!(next.trades.is_empty());
    }
}
