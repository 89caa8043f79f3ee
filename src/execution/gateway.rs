use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{IdempotencyCache, RetryPolicy};
use crate::config::ExecutionConfig;
use crate::domain::{OrderHandle, OrderRequest, OrderUpdate};
use crate::error::OrderError;
use crate::exchange::ExchangeClient;

/// Single entry point for every exchange call made by the engine
///
/// Transient failures and timeouts are retried with capped exponential
/// backoff. Semantic rejects surface immediately. Submissions are
/// deduplicated by `request_id`, which is also forwarded to the venue as the
/// client order id; before a submit is sent again the venue is asked whether
/// an order with that client id already exists.
pub struct OrderGateway {
    client: Arc<dyn ExchangeClient>,
    retry: RetryPolicy,
    dedup: IdempotencyCache,
}

impl OrderGateway {
    pub fn new(client: Arc<dyn ExchangeClient>, config: &ExecutionConfig) -> Self {
        Self::with_policy(
            client,
            RetryPolicy::from(config),
            Duration::from_secs(config.dedup_ttl_secs),
        )
    }

    pub fn with_policy(client: Arc<dyn ExchangeClient>, retry: RetryPolicy, dedup_ttl: Duration) -> Self {
        Self {
            client,
            retry,
            dedup: IdempotencyCache::new(dedup_ttl),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Submit an order, returning the existing handle if `request_id` was seen
    pub async fn submit(&self, request: &OrderRequest) -> Result<OrderHandle, OrderError> {
        let slot = self.dedup.slot(&request.request_id);

        if let Some(existing) = slot.get() {
            debug!(
                request_id = %request.request_id,
                order_id = %existing.order_id,
                "Duplicate submit, returning existing order"
            );
            return Ok(existing.clone());
        }

        let handle = slot
            .get_or_try_init(|| async {
                // An attempt that failed or timed out may still have landed
                let mut resend = false;
                let order_id = self
                    .retry
                    .run("submit", || {
                        let reconcile = std::mem::replace(&mut resend, true);
                        async move {
                            if reconcile {
                                if let Some(order_id) =
                                    self.client.order_by_client_id(&request.request_id).await?
                                {
                                    info!(
                                        request_id = %request.request_id,
                                        order_id = %order_id,
                                        "Earlier submit attempt reached the exchange, not resending"
                                    );
                                    return Ok(order_id);
                                }
                            }
                            self.client.submit(request).await
                        }
                    })
                    .await?;

                info!(
                    request_id = %request.request_id,
                    order_id = %order_id,
                    symbol = %request.symbol,
                    side = %request.side,
                    size = %request.size,
                    "Order submitted"
                );

                Ok::<_, OrderError>(OrderHandle {
                    order_id,
                    request_id: request.request_id.clone(),
                    symbol: request.symbol.clone(),
                    submitted_at: Utc::now(),
                })
            })
            .await
            .map_err(|e| {
                warn!(request_id = %request.request_id, "Order submit failed: {}", e);
                e
            })?;

        Ok(handle.clone())
    }

    /// Cancel an order; `Ok(false)` when it was no longer working
    pub async fn cancel(&self, handle: &OrderHandle) -> Result<bool, OrderError> {
        let cancelled = self
            .retry
            .run("cancel", || self.client.cancel(&handle.order_id))
            .await?;

        debug!(order_id = %handle.order_id, cancelled, "Cancel request completed");
        Ok(cancelled)
    }

    pub async fn status(&self, handle: &OrderHandle) -> Result<OrderUpdate, OrderError> {
        self.retry
            .run("status", || self.client.status(&handle.order_id))
            .await
    }

    pub async fn price(&self, symbol: &str) -> Result<Decimal, OrderError> {
        self.retry.run("price", || self.client.price(symbol)).await
    }

    pub async fn balance(&self) -> Result<Decimal, OrderError> {
        self.retry.run("balance", || self.client.balance()).await
    }
}
