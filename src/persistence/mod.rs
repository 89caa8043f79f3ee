//! Persistence Layer
//!
//! The trade journal is the single source of truth for realized outcomes:
//! daily loss totals used by the circuit breaker are derived from it, never
//! kept in memory.

pub mod journal;

pub use journal::{JournalIter, JournalReplay, JournalSummary, TradeJournal};
