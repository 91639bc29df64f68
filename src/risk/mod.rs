//! Capital risk controls.
//!
//! Tracks capital earmarked by operations built during a reconciliation pass
//! so that a batch never commits more than the account holds.

mod liabilities;

pub use liabilities::{Liabilities, LiabilityTracker};
