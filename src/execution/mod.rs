//! Order execution
//!
//! `OrderGateway` wraps an `ExchangeClient` with per-call timeouts, bounded
//! exponential backoff for transient failures, and request-id deduplication.

pub mod gateway;
pub mod idempotency;
pub mod retry;

pub use gateway::OrderGateway;
pub use idempotency::IdempotencyCache;
pub use retry::RetryPolicy;
