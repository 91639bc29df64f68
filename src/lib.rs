//! # Market Maker Engine
//!
//! Automated market making on a native-ledger venue: strategies compute the
//! offers they want resting on the books, and the engine reconciles them
//! against live offers while respecting capital and daily volume limits.
//!
//! ## Architecture
//!
//! - `config`: Bot and strategy configuration loading and validation
//! - `error`: Error taxonomy of the engine core
//! - `exchange`: Primary ledger venue, REST-bridge backing venues, registry
//! - `feed`: Price feeds (fixed, fiat, exchange ticker)
//! - `filter`: Submit filters, including the daily volume cap
//! - `model`: Assets, pairs, numbers, orders and offer operations
//! - `persistence`: SQLite store of fills serving daily volume queries
//! - `risk`: Capital liability tracking
//! - `strategy`: Reconciler, TWAP scheduler, mirror and fill hedging
//! - `trader`: The tick loop and fill tracker
//! - `utils`: Shared decimal helpers

pub mod config;
pub mod error;
pub mod exchange;
pub mod feed;
pub mod filter;
pub mod model;
pub mod persistence;
pub mod risk;
pub mod strategy;
pub mod trader;
pub mod utils;

pub use config::BotConfig;
pub use error::{EngineError, Result};
