//! Risk policy
//!
//! Pure position sizing, exit-level and circuit-breaker arithmetic. Loss
//! totals always come from the trade journal; nothing here keeps a running
//! counter.

pub mod policy;

pub use policy::{DailyLossCheck, ExitLevels, RiskPolicy, SizingError};
