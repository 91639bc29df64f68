//! Submit filters, applied to the full operation list after a strategy ran.
//!
//! A filter sees every create or modify operation and also every live offer
//! that no operation touches, since leaving an offer on the books is itself
//! a decision to keep it. Filter outcomes map back onto operations:
//! - kept unchanged: the operation (or the untouched offer) stays as is
//! - shrunk: the operation carries the new offer; an untouched offer becomes
//!   a modify
//! - dropped: creates vanish, modifies and untouched offers become deletes

mod volume;

pub use volume::{
    make_market_id, DailyVolume, DailyVolumeStore, VolumeFilter, VolumeFilterConfig,
    VolumeFilterMode,
};

#[cfg(test)]
pub use volume::MockDailyVolumeStore;

use crate::error::{EngineError, Result};
use crate::model::{ManageOffer, Number, Offer, OfferOp, OrderConstraints};
use std::collections::HashSet;
use tracing::debug;

/// Decision function applied to one candidate offer.
pub trait SubmitFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(
        &self,
        ops: Vec<OfferOp>,
        selling_offers: &[Offer],
        buying_offers: &[Offer],
    ) -> Result<Vec<OfferOp>>;
}

enum Candidate {
    Op(usize),
    Live(Offer),
}

fn live_as_manage_offer(offer: &Offer, constraints: &OrderConstraints) -> Result<ManageOffer> {
    Ok(ManageOffer {
        selling: offer.selling.clone(),
        buying: offer.buying.clone(),
        amount: Number::parse("offer amount", &offer.amount, constraints.volume_precision)?,
        price: Number::parse("offer price", &offer.price, constraints.price_precision)?,
    })
}

/// Run `decide` over every candidate, best (lowest) price first, and
/// rebuild the operation list with deletes ahead of everything else.
///
/// Untouched live offers are read at the venue's `constraints`.
pub fn filter_ops<F>(
    filter_name: &str,
    ops: Vec<OfferOp>,
    selling_offers: &[Offer],
    buying_offers: &[Offer],
    constraints: &OrderConstraints,
    mut decide: F,
) -> Result<Vec<OfferOp>>
where
    F: FnMut(&ManageOffer) -> Result<Option<ManageOffer>>,
{
    let touched: HashSet<u64> = ops.iter().filter_map(OfferOp::offer_id).collect();

    let mut candidates: Vec<(ManageOffer, Candidate)> = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        if let Some(offer) = op.manage_offer() {
            candidates.push((offer.clone(), Candidate::Op(i)));
        }
    }
    for live in selling_offers.iter().chain(buying_offers) {
        if !touched.contains(&live.id) {
            candidates.push((live_as_manage_offer(live, constraints)?, Candidate::Live(live.clone())));
        }
    }
    candidates.sort_by(|a, b| a.0.price.value().cmp(&b.0.price.value()));

    let mut results: Vec<Option<OfferOp>> = ops.into_iter().map(Some).collect();
    let mut extra: Vec<OfferOp> = Vec::new();

    for (offer, candidate) in candidates {
        let decision = decide(&offer)?;
        match candidate {
            Candidate::Op(i) => {
                let slot = results
                    .get_mut(i)
                    .ok_or_else(|| EngineError::InvariantViolation(format!("missing op {}", i)))?;
                *slot = match (slot.take(), decision) {
                    (Some(OfferOp::Create(_)), Some(kept)) => Some(OfferOp::Create(kept)),
                    (Some(OfferOp::Modify { offer_id, .. }), Some(kept)) => Some(OfferOp::Modify {
                        offer_id,
                        offer: kept,
                    }),
                    (Some(OfferOp::Create(_)), None) => None,
                    (Some(OfferOp::Modify { offer_id, offer }), None) => Some(OfferOp::Delete {
                        offer_id,
                        selling: offer.selling,
                        buying: offer.buying,
                    }),
                    (other, _) => other,
                };
            }
            Candidate::Live(live) => match decision {
                None => extra.push(OfferOp::delete(&live)),
                Some(kept) if kept != offer => extra.push(OfferOp::Modify {
                    offer_id: live.id,
                    offer: kept,
                }),
                Some(_) => {}
            },
        }
    }

    let mut all: Vec<OfferOp> = results.into_iter().flatten().chain(extra).collect();
    // stable: relative order within each group is preserved
    all.sort_by_key(|op| !op.is_delete());
    debug!(filter = filter_name, ops = all.len(), "Applied submit filter");
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Asset;
    use rust_decimal_macros::dec;

    fn constraints() -> OrderConstraints {
        OrderConstraints::new(7, 7, rust_decimal::Decimal::ZERO)
    }

    fn live(id: u64, price: &str, amount: &str) -> Offer {
        Offer {
            id,
            selling: Asset::new("XLM"),
            buying: Asset::new("USD"),
            price: price.to_string(),
            amount: amount.to_string(),
        }
    }

    fn create(price: rust_decimal::Decimal, amount: rust_decimal::Decimal) -> OfferOp {
        OfferOp::Create(ManageOffer {
            selling: Asset::new("XLM"),
            buying: Asset::new("USD"),
            amount: Number::new(amount, 7),
            price: Number::new(price, 7),
        })
    }

    #[test]
    fn test_dropping_maps_onto_operations() {
        let offers = vec![live(1, "0.10", "10"), live(2, "0.20", "10")];
        let ops = vec![
            OfferOp::Modify {
                offer_id: 1,
                offer: live_as_manage_offer(&offers[0], &constraints()).unwrap(),
            },
            create(dec!(0.3), dec!(5)),
        ];

        // drop everything
        let out = filter_ops("drop", ops, &offers, &[], &constraints(), |_| Ok(None)).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(OfferOp::is_delete));
        let mut ids: Vec<u64> = out.iter().filter_map(OfferOp::offer_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_candidates_processed_best_price_first() {
        let offers = vec![live(1, "0.30", "10")];
        let ops = vec![create(dec!(0.2), dec!(5)), create(dec!(0.1), dec!(5))];
        let mut seen = Vec::new();
        filter_ops("order", ops, &offers, &[], &constraints(), |o| {
            seen.push(o.price.value());
            Ok(Some(o.clone()))
        })
        .unwrap();
        assert_eq!(seen, vec![dec!(0.1), dec!(0.2), dec!(0.3)]);
    }

    #[test]
    fn test_shrunk_untouched_offer_becomes_modify() {
        let offers = vec![live(4, "0.10", "10")];
        let out = filter_ops("shrink", vec![], &offers, &[], &constraints(), |o| {
            let mut kept = o.clone();
            kept.amount = Number::new(dec!(4), 7);
            Ok(Some(kept))
        })
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].offer_id(), Some(4));
        assert_eq!(out[0].manage_offer().unwrap().amount.value(), dec!(4));
    }

    #[test]
    fn test_unparseable_live_offer_aborts() {
        let offers = vec![live(1, "zero point one", "10")];
        assert!(filter_ops("bad", vec![], &offers, &[], &constraints(), |o| Ok(Some(o.clone()))).is_err());
    }
}
