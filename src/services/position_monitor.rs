//! Position monitoring background service
//!
//! Every registered position gets its own supervisory task that polls the
//! exchange and walks the position through
//! `Pending -> Open -> Closing -> Closed`, or `Pending -> Rejected`:
//! - entry fills are confirmed and exit levels recomputed from the fill price
//! - stop-loss / take-profit breaches trigger one closing order
//! - closing fills are journaled before the position is marked closed
//!
//! The task owns the only `watch::Sender` for its position and drops it once
//! the position is terminal. Tasks are never aborted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{ExecutionConfig, RiskConfig};
use crate::domain::{
    ExitReason, OrderRequest, OrderStatus, OrderUpdate, Position, PositionState, TradeRecord,
};
use crate::error::{GuardError, OrderError, Result};
use crate::execution::OrderGateway;
use crate::persistence::TradeJournal;
use crate::risk::{ExitLevels, RiskPolicy};

/// Configuration for the position monitor
#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    /// Interval between polls of a single position
    pub poll_interval: Duration,
    /// Price feed outage tolerated before the position is flagged degraded
    pub price_grace: Duration,
    /// Unfilled entry orders older than this are cancelled
    pub entry_timeout: Duration,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            price_grace: Duration::from_secs(30),
            entry_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl From<&ExecutionConfig> for PositionMonitorConfig {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            price_grace: config.price_grace(),
            entry_timeout: config.entry_timeout(),
        }
    }
}

/// Position monitoring statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    /// Positions currently under supervision
    pub supervised: usize,
    pub positions_opened: u64,
    pub positions_closed: u64,
    pub positions_rejected: u64,
    pub close_orders_submitted: u64,
    pub price_errors: u64,
    /// Positions whose price feed has been stale beyond the grace period
    pub degraded_positions: usize,
    pub last_poll: Option<DateTime<Utc>>,
}

/// Position monitoring service
pub struct PositionMonitor {
    gateway: Arc<OrderGateway>,
    journal: Arc<TradeJournal>,
    risk: watch::Receiver<RiskConfig>,
    config: PositionMonitorConfig,
    stats: Arc<RwLock<MonitorStats>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PositionMonitor {
    pub fn new(
        gateway: Arc<OrderGateway>,
        journal: Arc<TradeJournal>,
        risk: watch::Receiver<RiskConfig>,
        config: PositionMonitorConfig,
    ) -> Self {
        Self {
            gateway,
            journal,
            risk,
            config,
            stats: Arc::new(RwLock::new(MonitorStats::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start supervising `position`, returning a read-only view of its state
    pub async fn register(&self, position: Position) -> watch::Receiver<Position> {
        let (tx, rx) = watch::channel(position.clone());

        info!(
            position_id = %position.id,
            symbol = %position.symbol,
            order_id = %position.order.order_id,
            "Supervising position"
        );

        self.stats.write().await.supervised += 1;

        let supervisor = Supervisor {
            gateway: self.gateway.clone(),
            journal: self.journal.clone(),
            risk: self.risk.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
            tx,
            position,
            registered_at: Instant::now(),
            last_price_at: Instant::now(),
            last_price: None,
            degraded: false,
            pending_exit: None,
            close_attempts: 0,
            exit_filled_size: Decimal::ZERO,
            exit_filled_value: Decimal::ZERO,
        };

        let handle = tokio::spawn(supervisor.run());

        let mut tasks = self.tasks.lock().await;
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);

        rx
    }

    /// Get current statistics
    pub async fn get_stats(&self) -> MonitorStats {
        self.stats.read().await.clone()
    }

    /// Wait until every supervised position has reached a terminal state
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().await);
            if handles.is_empty() {
                return;
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    error!("Position supervisor task failed: {}", e);
                }
            }
        }
    }
}

/// Per-position state machine; the single writer for its position
struct Supervisor {
    gateway: Arc<OrderGateway>,
    journal: Arc<TradeJournal>,
    risk: watch::Receiver<RiskConfig>,
    config: PositionMonitorConfig,
    stats: Arc<RwLock<MonitorStats>>,
    tx: watch::Sender<Position>,
    position: Position,
    registered_at: Instant,
    last_price_at: Instant,
    last_price: Option<Decimal>,
    degraded: bool,
    /// Exit latch: set on the first breach, never cleared
    pending_exit: Option<ExitReason>,
    close_attempts: u32,
    exit_filled_size: Decimal,
    exit_filled_value: Decimal,
}

impl Supervisor {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.position.state.is_terminal() {
            ticker.tick().await;

            let state = self.position.state;
            let result = match state {
                PositionState::Pending => self.poll_entry().await,
                PositionState::Open => self.poll_open().await,
                PositionState::Closing => self.poll_exit().await,
                PositionState::Closed | PositionState::Rejected => break,
            };

            if let Err(e) = result {
                warn!(
                    position_id = %self.position.id,
                    state = %state,
                    "Position poll failed: {}",
                    e
                );
            }

            self.stats.write().await.last_poll = Some(Utc::now());
        }

        {
            let mut stats = self.stats.write().await;
            stats.supervised = stats.supervised.saturating_sub(1);
            if self.degraded {
                stats.degraded_positions = stats.degraded_positions.saturating_sub(1);
            }
        }

        info!(
            position_id = %self.position.id,
            state = %self.position.state,
            "Released position"
        );
    }

    fn risk_config(&self) -> RiskConfig {
        self.risk.borrow().clone()
    }

    fn transition(&mut self, to: PositionState, reason: impl Into<String>) -> Result<()> {
        let change = self.position.transition(to, reason)?;
        info!(
            position_id = %self.position.id,
            symbol = %self.position.symbol,
            from = %change.from,
            to = %change.to,
            reason = %change.reason,
            "Position state change"
        );
        self.tx.send_replace(self.position.clone());
        Ok(())
    }

    /// Pending: wait for the entry order to fill, be refused, or time out
    async fn poll_entry(&mut self) -> Result<()> {
        let update = self.gateway.status(&self.position.order).await?;

        match update.status {
            OrderStatus::Filled => self.open_with(&update).await,
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                if update.filled_size > Decimal::ZERO {
                    self.open_with(&update).await
                } else {
                    self.reject_entry(update.status).await
                }
            }
            OrderStatus::Pending | OrderStatus::PartiallyFilled => {
                if self.registered_at.elapsed() < self.config.entry_timeout {
                    return Ok(());
                }

                warn!(
                    position_id = %self.position.id,
                    order_id = %self.position.order.order_id,
                    filled = %update.filled_size,
                    "Entry order timed out, cancelling"
                );
                self.gateway.cancel(&self.position.order).await?;

                let update = self.gateway.status(&self.position.order).await?;
                if update.status.is_active() {
                    // Cancel not yet reflected; check again next poll
                    return Ok(());
                }
                if update.filled_size > Decimal::ZERO {
                    self.open_with(&update).await
                } else {
                    self.reject_entry(update.status).await
                }
            }
        }
    }

    async fn open_with(&mut self, update: &OrderUpdate) -> Result<()> {
        let config = self.risk_config();
        let fill_price = RiskPolicy::round_price(
            update.avg_fill_price.unwrap_or(self.position.entry_price),
            &config,
        );
        let levels = match RiskPolicy::compute_exit_levels(fill_price, self.position.side, &config) {
            Some(levels) => levels,
            None => {
                error!(
                    position_id = %self.position.id,
                    %fill_price,
                    "Exit levels overflow at fill price, keeping provisional levels"
                );
                ExitLevels {
                    stop_loss: self.position.stop_loss_price,
                    take_profit: self.position.take_profit_price,
                }
            }
        };

        if update.filled_size > Decimal::ZERO {
            self.position.size = update.filled_size;
        }
        self.position.entry_price = fill_price;
        self.position.stop_loss_price = levels.stop_loss;
        self.position.take_profit_price = levels.take_profit;
        self.last_price_at = Instant::now();

        self.transition(
            PositionState::Open,
            format!(
                "entry filled {} @ {} (sl {}, tp {})",
                self.position.size, fill_price, levels.stop_loss, levels.take_profit
            ),
        )?;
        self.stats.write().await.positions_opened += 1;
        Ok(())
    }

    async fn reject_entry(&mut self, status: OrderStatus) -> Result<()> {
        self.journal
            .append(TradeRecord::rejected(&self.position))
            .await?;
        self.transition(PositionState::Rejected, format!("entry order {:?}", status))?;
        self.stats.write().await.positions_rejected += 1;
        Ok(())
    }

    /// Open: watch the price and latch an exit on the first breach
    async fn poll_open(&mut self) -> Result<()> {
        if self.pending_exit.is_none() {
            let price = match self.gateway.price(&self.position.symbol).await {
                Ok(price) => {
                    self.price_recovered().await;
                    price
                }
                Err(e) => {
                    self.price_failed(e).await;
                    return Ok(());
                }
            };
            self.last_price = Some(price);

            match RiskPolicy::exit_trigger(&self.position, price) {
                Some(reason) => {
                    info!(
                        position_id = %self.position.id,
                        symbol = %self.position.symbol,
                        %price,
                        %reason,
                        "Exit level breached"
                    );
                    self.pending_exit = Some(reason);
                }
                None => {
                    debug!(position_id = %self.position.id, %price, "Within exit levels");
                    return Ok(());
                }
            }
        }

        self.submit_close().await
    }

    async fn price_failed(&mut self, err: OrderError) {
        let mut stats = self.stats.write().await;
        stats.price_errors += 1;

        let stale_for = self.last_price_at.elapsed();
        if !self.degraded && stale_for >= self.config.price_grace {
            self.degraded = true;
            stats.degraded_positions += 1;
            warn!(
                position_id = %self.position.id,
                symbol = %self.position.symbol,
                stale_secs = stale_for.as_secs(),
                "Price feed unavailable beyond grace period, monitoring degraded (no forced close): {}",
                err
            );
        } else {
            debug!(position_id = %self.position.id, "Price fetch failed: {}", err);
        }
    }

    async fn price_recovered(&mut self) {
        self.last_price_at = Instant::now();
        if self.degraded {
            self.degraded = false;
            let mut stats = self.stats.write().await;
            stats.degraded_positions = stats.degraded_positions.saturating_sub(1);
            info!(position_id = %self.position.id, "Price feed recovered");
        }
    }

    /// Submit the closing order for the latched exit.
    ///
    /// The request id is derived from the position id and attempt number, so
    /// resubmitting after a failed call never opens a second closing order.
    async fn submit_close(&mut self) -> Result<()> {
        let Some(reason) = self.pending_exit else {
            return Ok(());
        };

        let request_id = match self.close_attempts {
            0 => format!("{}-close", self.position.id),
            n => format!("{}-close-{}", self.position.id, n),
        };
        let remaining = self.position.size - self.exit_filled_size;
        let request = OrderRequest::market(
            request_id,
            self.position.symbol.clone(),
            self.position.side.exit_order_side(),
            remaining,
        );

        let handle = self.gateway.submit(&request).await?;
        self.stats.write().await.close_orders_submitted += 1;

        self.position.close_order = Some(handle);
        self.position.exit_reason = Some(reason);

        if self.position.state == PositionState::Open {
            self.transition(PositionState::Closing, reason.to_string())?;
        } else {
            self.tx.send_replace(self.position.clone());
        }
        Ok(())
    }

    /// Closing: wait for the exit fill, replacing the order if it dies
    async fn poll_exit(&mut self) -> Result<()> {
        let Some(close_order) = self.position.close_order.clone() else {
            return self.submit_close().await;
        };

        let update = self.gateway.status(&close_order).await?;

        match update.status {
            OrderStatus::Filled => self.finish_close(&update).await,
            OrderStatus::Cancelled | OrderStatus::Rejected
                if self.exit_filled_size + update.filled_size >= self.position.size =>
            {
                // Died after filling everything; nothing left to replace
                self.finish_close(&update).await
            }
            OrderStatus::Cancelled | OrderStatus::Rejected => {
                self.exit_filled_size += update.filled_size;
                self.exit_filled_value += self.fill_value(&update);
                self.close_attempts += 1;
                self.position.close_order = None;

                warn!(
                    position_id = %self.position.id,
                    order_id = %close_order.order_id,
                    status = ?update.status,
                    attempt = self.close_attempts,
                    "Closing order ended unfilled, submitting replacement"
                );
                self.tx.send_replace(self.position.clone());
                self.submit_close().await
            }
            OrderStatus::Pending | OrderStatus::PartiallyFilled => Ok(()),
        }
    }

    fn fill_value(&self, update: &OrderUpdate) -> Decimal {
        match (update.avg_fill_price, self.last_price) {
            (Some(_), _) => update.fill_value(),
            (None, Some(price)) => price * update.filled_size,
            (None, None) => self.position.entry_price * update.filled_size,
        }
    }

    async fn finish_close(&mut self, update: &OrderUpdate) -> Result<()> {
        let filled_size = self.exit_filled_size + update.filled_size;
        let filled_value = self.exit_filled_value + self.fill_value(update);

        if filled_size <= Decimal::ZERO {
            return Err(GuardError::Internal(format!(
                "closing order for {} filled without size",
                self.position.id
            )));
        }

        let config = self.risk_config();
        let exit_price = RiskPolicy::round_price(filled_value / filled_size, &config);
        let pnl = RiskPolicy::round_price(self.position.pnl_at(exit_price), &config);

        self.journal
            .append(TradeRecord::closed(&self.position, exit_price, pnl))
            .await?;

        self.position.exit_price = Some(exit_price);
        self.position.pnl = Some(pnl);
        self.transition(PositionState::Closed, format!("exit filled @ {} pnl {}", exit_price, pnl))?;

        self.stats.write().await.positions_closed += 1;
        Ok(())
    }
}
