//! Venue integrations.
//!
//! ## Primary venue
//! The native-ledger venue holds our resting offers. Operations against it
//! are built with liability checks and submitted as one atomic batch.
//!
//! ## Backing venues
//! Reached through a generic trade API for:
//! - Order books to mirror
//! - Hedge orders for fills on the primary venue
//! - Ticker prices for price feeds

mod ledger;
pub mod mock;
mod registry;
mod rest_bridge;
mod traits;
mod types;

pub use ledger::LedgerVenue;
pub use mock::{MockExchange, SubmitOutcome};
pub use registry::{ExchangeEntry, ExchangeHandle, ExchangeParams, ExchangeRegistry};
pub use rest_bridge::{RestBridgeConfig, RestBridgeExchange};
pub use traits::*;
pub use types::*;
