//! Trade signal sources
//!
//! The engine treats signals as an unbounded, externally driven sequence of
//! `TradeIntent`s and makes no assumption about their quality.

mod channel;
mod jsonl;

use async_trait::async_trait;

use crate::domain::TradeIntent;

pub use channel::ChannelSignalSource;
pub use jsonl::JsonlSignalSource;

/// Producer of trade intents
#[async_trait]
pub trait TradeSignalSource: Send {
    /// Next intent, or `None` once the source is exhausted.
    ///
    /// Must be cancel-safe: a dropped call may not lose an intent.
    async fn next_intent(&mut self) -> Option<TradeIntent>;
}
