use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::domain::OrderHandle;

struct CacheEntry {
    created: Instant,
    cell: Arc<OnceCell<OrderHandle>>,
}

/// Request-id deduplication for order submission
///
/// Every request id maps to a single-assignment slot. Concurrent submits with
/// the same id share the slot, so at most one of them reaches the exchange
/// and the rest get its handle. A failed submit leaves the slot empty and the
/// next caller may try again.
///
/// Entries are kept for `ttl` and purged lazily on access.
pub struct IdempotencyCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Slot for `request_id`, created on first use
    pub fn slot(&self, request_id: &str) -> Arc<OnceCell<OrderHandle>> {
        self.purge_expired();

        self.entries
            .entry(request_id.to_string())
            .or_insert_with(|| CacheEntry {
                created: Instant::now(),
                cell: Arc::new(OnceCell::new()),
            })
            .cell
            .clone()
    }

    /// Handle already recorded for `request_id`, if any
    pub fn get(&self, request_id: &str) -> Option<OrderHandle> {
        self.entries
            .get(request_id)
            .filter(|e| e.created.elapsed() < self.ttl)
            .and_then(|e| e.cell.get().cloned())
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, e| e.created.elapsed() < ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Purged {} expired idempotency entries", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
