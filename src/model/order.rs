//! Orders, live offers, trades and the operations sent to the primary venue.

use super::asset::{Asset, TradingPair};
use super::number::Number;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn reverse(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Self::Buy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order type. Only limit orders are placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
}

/// A target or venue order, always expressed in base/quote terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub pair: TradingPair,
    pub action: OrderAction,
    pub order_type: OrderType,
    /// Quote units per base unit
    pub price: Number,
    /// Base units
    pub volume: Number,
    pub timestamp: Option<DateTime<Utc>>,
}

impl Order {
    pub fn limit(pair: TradingPair, action: OrderAction, price: Number, volume: Number) -> Self {
        Self {
            pair,
            action,
            order_type: OrderType::Limit,
            price,
            volume,
            timestamp: None,
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order[pair={}, action={}, price={}, volume={}]",
            self.pair, self.action, self.price, self.volume
        )
    }
}

/// Order resting on a venue with its venue-assigned identity.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub id: String,
    pub order: Order,
    pub volume_executed: Number,
}

/// Live offer on the primary (native-ledger) venue.
///
/// `price` is units of `buying` per unit of `selling` and `amount` is in
/// units of `selling`, both as the raw strings the venue reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: u64,
    pub selling: Asset,
    pub buying: Asset,
    pub price: String,
    pub amount: String,
}

impl Offer {
    /// True when this offer sells the base asset of `pair`.
    pub fn is_selling_base(&self, pair: &TradingPair) -> bool {
        self.selling == pair.base && self.buying == pair.quote
    }

    /// True when this offer buys the base asset of `pair`.
    pub fn is_buying_base(&self, pair: &TradingPair) -> bool {
        self.selling == pair.quote && self.buying == pair.base
    }
}

/// Split live offers into (selling base, buying base) for `pair`, each
/// sorted best price first from the market's point of view.
pub fn split_offers(offers: &[Offer], pair: &TradingPair) -> (Vec<Offer>, Vec<Offer>) {
    let mut selling: Vec<Offer> = offers
        .iter()
        .filter(|o| o.is_selling_base(pair))
        .cloned()
        .collect();
    let mut buying: Vec<Offer> = offers
        .iter()
        .filter(|o| o.is_buying_base(pair))
        .cloned()
        .collect();

    let price_key = |o: &Offer| o.price.parse::<rust_decimal::Decimal>().unwrap_or_default();
    // asks: lowest first. bids are stored inverted (base per quote), so the
    // best bid has the lowest inverted price as well.
    selling.sort_by_key(price_key);
    buying.sort_by_key(price_key);
    (selling, buying)
}

/// Offer parameters in the native-ledger representation.
#[derive(Debug, Clone, PartialEq)]
pub struct ManageOffer {
    pub selling: Asset,
    pub buying: Asset,
    /// Units of `selling`
    pub amount: Number,
    /// Units of `buying` per unit of `selling`
    pub price: Number,
}

/// A single corrective operation against the primary venue.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOp {
    Create(ManageOffer),
    Modify { offer_id: u64, offer: ManageOffer },
    Delete { offer_id: u64, selling: Asset, buying: Asset },
}

impl OfferOp {
    pub fn offer_id(&self) -> Option<u64> {
        match self {
            Self::Create(_) => None,
            Self::Modify { offer_id, .. } | Self::Delete { offer_id, .. } => Some(*offer_id),
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Delete { .. })
    }

    pub fn manage_offer(&self) -> Option<&ManageOffer> {
        match self {
            Self::Create(offer) | Self::Modify { offer, .. } => Some(offer),
            Self::Delete { .. } => None,
        }
    }

    /// Delete operation for a live offer.
    pub fn delete(offer: &Offer) -> Self {
        Self::Delete {
            offer_id: offer.id,
            selling: offer.selling.clone(),
            buying: offer.buying.clone(),
        }
    }
}

impl fmt::Display for OfferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(o) => write!(
                f,
                "create(selling={}, buying={}, amount={}, price={})",
                o.selling, o.buying, o.amount, o.price
            ),
            Self::Modify { offer_id, offer: o } => write!(
                f,
                "modify(id={}, selling={}, buying={}, amount={}, price={})",
                offer_id, o.selling, o.buying, o.amount, o.price
            ),
            Self::Delete { offer_id, .. } => write!(f, "delete(id={})", offer_id),
        }
    }
}

/// A fill reported by a venue.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub order: Order,
    pub transaction_id: Option<String>,
    /// Quote units, when the venue reports it
    pub cost: Option<Number>,
}

impl Trade {
    pub fn id(&self) -> &str {
        self.transaction_id.as_deref().unwrap_or("<none>")
    }
}

/// Order book snapshot, both sides best price first.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBook {
    pub pair: TradingPair,
    pub asks: Vec<Order>,
    pub bids: Vec<Order>,
}

impl OrderBook {
    pub fn top_bid(&self) -> Option<&Order> {
        self.bids.first()
    }

    pub fn top_ask(&self) -> Option<&Order> {
        self.asks.first()
    }
}

/// Best bid/ask snapshot for a pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub ask_price: Number,
    pub bid_price: Number,
    pub last_price: Option<Number>,
}
