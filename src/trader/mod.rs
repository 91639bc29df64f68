//! Trading loop: one reconciliation pass per tick, plus fill tracking.

mod bot;
mod fill_tracker;

pub use bot::{TickStats, Trader};
pub use fill_tracker::FillTracker;
