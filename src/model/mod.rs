//! Domain model shared by every component: assets, fixed-precision numbers,
//! orders, live offers and the operations sent to the primary venue.

mod asset;
mod number;
mod order;

pub use asset::{Asset, OrderConstraints, TradingPair};
pub use number::{Number, DEFAULT_EPSILON};
pub use order::{
    split_offers, ManageOffer, Offer, OfferOp, OpenOrder, Order, OrderAction, OrderBook,
    OrderType, Ticker, Trade,
};
