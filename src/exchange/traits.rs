use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::{OrderRequest, OrderUpdate};
use crate::error::ExchangeError;

/// Exchange capability consumed by the order gateway.
///
/// Implementations own transport and authentication; they classify failures
/// through `ExchangeError` so the gateway knows what to retry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Place an order, returning the exchange order id.
    ///
    /// `request.request_id` is forwarded as the client order id so venues
    /// with native idempotency can deduplicate on their side as well.
    async fn submit(&self, request: &OrderRequest) -> Result<String, ExchangeError>;

    /// Exchange order id of an order placed with `client_order_id`, if any.
    ///
    /// Lets a submit whose outcome is unknown be reconciled before it is sent again.
    async fn order_by_client_id(&self, client_order_id: &str) -> Result<Option<String>, ExchangeError>;

    async fn cancel(&self, order_id: &str) -> Result<bool, ExchangeError>;

    async fn status(&self, order_id: &str) -> Result<OrderUpdate, ExchangeError>;

    /// Last traded price for `symbol`
    async fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError>;

    /// Available quote-currency balance
    async fn balance(&self) -> Result<Decimal, ExchangeError>;
}
