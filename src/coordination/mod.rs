//! Coordination layer
//!
//! The lifecycle manager gates intents through the risk policy and hands
//! accepted positions to the position monitor.

pub mod lifecycle;

pub use lifecycle::{LifecycleEvent, LifecycleManager, LifecycleStatus, SignalRunStats};
