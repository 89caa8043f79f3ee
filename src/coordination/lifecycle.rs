//! Position Lifecycle Management
//!
//! Accepts trade intents, gates them through the risk policy, opens them via
//! the order gateway and hands the resulting positions to the position
//! monitor. Owns the table of live positions; supervision itself is done by
//! the monitor's per-position tasks, which are the only writers.

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::{ExecutionConfig, RiskConfig};
use crate::domain::{OrderRequest, OrderType, Position, PositionId, TradeIntent, TradeRecord};
use crate::error::{GuardError, RejectCode, Rejection, Result};
use crate::execution::OrderGateway;
use crate::persistence::TradeJournal;
use crate::risk::{DailyLossCheck, RiskPolicy};
use crate::services::{MonitorStats, PositionMonitor, PositionMonitorConfig};
use crate::signals::TradeSignalSource;

/// Lifecycle events broadcast to listeners
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// New intents are being accepted
    Started,
    /// New intents are refused; open positions keep being supervised
    Stopped,
    /// Risk limits replaced at runtime
    RiskConfigReloaded,
    IntentAccepted {
        position_id: PositionId,
        symbol: String,
    },
    IntentRejected {
        symbol: String,
        rejection: Rejection,
    },
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleStatus {
    pub accepting: bool,
    pub live_positions: usize,
    pub archived_positions: usize,
    /// Today's realized losses; `None` when the journal could not be read
    pub daily_loss: Option<Decimal>,
    pub daily_pnl: Option<Decimal>,
    pub monitor: MonitorStats,
}

/// Intents pumped by `run_signals`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SignalRunStats {
    pub received: u64,
    pub accepted: u64,
    pub rejected: u64,
}

/// Orchestrates intent acceptance and owns the live-position table
pub struct LifecycleManager {
    gateway: Arc<OrderGateway>,
    journal: Arc<TradeJournal>,
    monitor: PositionMonitor,
    risk_tx: watch::Sender<RiskConfig>,
    entry_order_type: OrderType,
    live: DashMap<PositionId, watch::Receiver<Position>>,
    archive: DashMap<PositionId, Position>,
    accepting: AtomicBool,
    /// Serializes admission so concurrent intents cannot overrun position limits
    admission: Mutex<()>,
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleManager {
    pub fn new(
        gateway: Arc<OrderGateway>,
        journal: Arc<TradeJournal>,
        risk: RiskConfig,
        execution: &ExecutionConfig,
    ) -> Self {
        Self::with_monitor_config(
            gateway,
            journal,
            risk,
            PositionMonitorConfig::from(execution),
            execution.entry_order_type,
        )
    }

    pub fn with_monitor_config(
        gateway: Arc<OrderGateway>,
        journal: Arc<TradeJournal>,
        risk: RiskConfig,
        monitor_config: PositionMonitorConfig,
        entry_order_type: OrderType,
    ) -> Self {
        let (risk_tx, risk_rx) = watch::channel(risk);
        let (event_tx, _) = broadcast::channel(64);
        let monitor = PositionMonitor::new(gateway.clone(), journal.clone(), risk_rx, monitor_config);

        Self {
            gateway,
            journal,
            monitor,
            risk_tx,
            entry_order_type,
            live: DashMap::new(),
            archive: DashMap::new(),
            accepting: AtomicBool::new(false),
            admission: Mutex::new(()),
            event_tx,
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Begin accepting new intents
    pub fn start(&self) {
        if !self.accepting.swap(true, Ordering::SeqCst) {
            info!("Lifecycle manager accepting intents");
            let _ = self.event_tx.send(LifecycleEvent::Started);
        }
    }

    /// Stop accepting new intents; in-flight positions keep being supervised
    pub fn stop(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!(
                live_positions = self.live.len(),
                "Lifecycle manager stopped accepting intents"
            );
            let _ = self.event_tx.send(LifecycleEvent::Stopped);
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// `stop()`, then wait for every supervised position to reach a terminal state
    pub async fn shutdown(&self) {
        self.stop();
        info!("Waiting for {} live positions to finish", self.live.len());
        self.monitor.wait_idle().await;
        self.sweep();
        info!("All positions terminal, shutdown complete");
    }

    /// Current risk limits (a copy)
    pub fn risk_config(&self) -> RiskConfig {
        self.risk_tx.borrow().clone()
    }

    /// Replace the risk limits used for future evaluations
    pub fn reload_risk_config(&self, config: RiskConfig) -> Result<()> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(GuardError::InvalidConfig(errors.join("; ")));
        }

        self.risk_tx.send_replace(config);
        info!("Risk configuration reloaded");
        let _ = self.event_tx.send(LifecycleEvent::RiskConfigReloaded);
        Ok(())
    }

    /// Risk-check, size and open `intent`, returning the id of its position.
    ///
    /// Not cancel-safe: dropping the future after the entry order was sent
    /// but before the position is registered leaves that order unsupervised.
    /// Drive it to completion; `run_signals_until` does.
    pub async fn accept(&self, intent: TradeIntent) -> std::result::Result<PositionId, Rejection> {
        let result = self.try_accept(&intent).await;

        match &result {
            Ok(position_id) => {
                let _ = self.event_tx.send(LifecycleEvent::IntentAccepted {
                    position_id: *position_id,
                    symbol: intent.symbol.clone(),
                });
            }
            Err(rejection) => {
                warn!(
                    symbol = %intent.symbol,
                    side = %intent.side,
                    code = %rejection.code,
                    "Intent rejected: {}",
                    rejection.message
                );
                let _ = self.event_tx.send(LifecycleEvent::IntentRejected {
                    symbol: intent.symbol.clone(),
                    rejection: rejection.clone(),
                });
            }
        }

        result
    }

    async fn try_accept(&self, intent: &TradeIntent) -> std::result::Result<PositionId, Rejection> {
        if !self.is_accepting() {
            return Err(Rejection::new(
                RejectCode::NotAccepting,
                "lifecycle manager is stopped",
            ));
        }

        let config = self.risk_config();
        RiskPolicy::validate_intent(intent, &config)?;

        let _admission = self.admission.lock().await;

        match RiskPolicy::check_daily_loss_limit(&self.journal, &config, Utc::now().date_naive()).await {
            DailyLossCheck::Allowed { loss } => {
                debug!(%loss, "Daily loss within limit");
            }
            DailyLossCheck::LimitReached { loss, limit } => {
                return Err(Rejection::new(
                    RejectCode::DailyLossLimitReached,
                    format!("daily loss {} reached limit {}", loss, limit),
                ));
            }
            DailyLossCheck::Unknown { reason } => {
                return Err(Rejection::new(
                    RejectCode::DailyLossUnknown,
                    format!("daily loss could not be determined: {}", reason),
                ));
            }
        }

        if config.max_open_positions > 0 {
            let live = self.live_count();
            if live >= config.max_open_positions as usize {
                return Err(Rejection::new(
                    RejectCode::TooManyPositions,
                    format!("{} positions open, limit {}", live, config.max_open_positions),
                ));
            }
        }

        let balance = self
            .gateway
            .balance()
            .await
            .map_err(|e| Rejection::new(RejectCode::BalanceUnavailable, e.to_string()))?;

        let size = RiskPolicy::size(intent, balance, &config)?;
        let levels = RiskPolicy::compute_exit_levels(intent.entry_price, intent.side, &config)
            .ok_or_else(|| {
                Rejection::new(
                    RejectCode::InvalidIntent,
                    format!("entry price {} is out of range", intent.entry_price),
                )
            })?;

        if let Some(min_ratio) = config.min_reward_risk_ratio {
            match RiskPolicy::reward_risk_ratio(intent.entry_price, intent.side, &levels) {
                Some(ratio) if ratio >= min_ratio => {}
                ratio => {
                    return Err(Rejection::new(
                        RejectCode::RewardRiskTooLow,
                        format!(
                            "reward/risk {} below minimum {}",
                            ratio.map_or_else(|| "undefined".to_string(), |r| r.round_dp(2).to_string()),
                            min_ratio
                        ),
                    ));
                }
            }
        }

        self.journal
            .ensure_writable()
            .await
            .map_err(|e| Rejection::new(RejectCode::JournalUnavailable, e.to_string()))?;

        let position_id = PositionId::new();
        let order_side = intent.side.entry_order_side();
        let request = match self.entry_order_type {
            OrderType::Market => {
                OrderRequest::market(position_id.to_string(), intent.symbol.clone(), order_side, size)
            }
            OrderType::Limit => OrderRequest::limit(
                position_id.to_string(),
                intent.symbol.clone(),
                order_side,
                size,
                RiskPolicy::round_price(intent.entry_price, &config),
            ),
        };

        let handle = self
            .gateway
            .submit(&request)
            .await
            .map_err(|e| Rejection::new(RejectCode::SubmissionFailed, e.to_string()))?;

        let position = Position::pending(
            position_id,
            intent.symbol.clone(),
            intent.side,
            intent.entry_price,
            size,
            levels.stop_loss,
            levels.take_profit,
            handle,
        );

        if let Err(e) = self.journal.append(TradeRecord::opened(&position)).await {
            return Err(self.abandon_unrecorded(position, e).await);
        }

        info!(
            position_id = %position_id,
            symbol = %position.symbol,
            side = %position.side,
            %size,
            stop_loss = %levels.stop_loss,
            take_profit = %levels.take_profit,
            order_id = %position.order.order_id,
            "Intent accepted"
        );

        let rx = self.monitor.register(position).await;
        self.live.insert(position_id, rx);
        Ok(position_id)
    }

    /// The opening record could not be written: cancel the entry and refuse the intent.
    ///
    /// If the entry cannot be confirmed cancelled it may already carry
    /// exposure, so the position is still handed to the monitor.
    async fn abandon_unrecorded(&self, position: Position, err: GuardError) -> Rejection {
        error!(
            position_id = %position.id,
            order_id = %position.order.order_id,
            "Journal append failed after submission: {}",
            err
        );

        match self.gateway.cancel(&position.order).await {
            Ok(true) => {
                info!(order_id = %position.order.order_id, "Entry order cancelled");
            }
            Ok(false) | Err(_) => {
                error!(
                    position_id = %position.id,
                    order_id = %position.order.order_id,
                    "Entry order could not be cancelled, supervising unrecorded position"
                );
                let id = position.id;
                let rx = self.monitor.register(position).await;
                self.live.insert(id, rx);
            }
        }

        Rejection::new(
            RejectCode::JournalUnavailable,
            format!("trade journal unavailable: {}", err),
        )
    }

    /// Move positions that reached a terminal state into the archive
    fn sweep(&self) {
        let finished: Vec<PositionId> = self
            .live
            .iter()
            .filter(|entry| entry.value().borrow().state.is_terminal())
            .map(|entry| *entry.key())
            .collect();

        for id in finished {
            if let Some((id, rx)) = self.live.remove(&id) {
                let position = rx.borrow().clone();
                debug!(position_id = %id, state = %position.state, "Archived position");
                self.archive.insert(id, position);
            }
        }
    }

    fn live_count(&self) -> usize {
        self.sweep();
        self.live.len()
    }

    /// Snapshot of a live or archived position
    pub fn status(&self, id: PositionId) -> Result<Position> {
        self.sweep();

        if let Some(rx) = self.live.get(&id) {
            return Ok(rx.borrow().clone());
        }

        self.archive
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or_else(|| GuardError::PositionNotFound(id.to_string()))
    }

    /// Snapshots of all live positions
    pub fn positions(&self) -> Vec<Position> {
        self.sweep();
        let mut positions: Vec<Position> = self
            .live
            .iter()
            .map(|entry| entry.value().borrow().clone())
            .collect();
        positions.sort_by_key(|p| p.created_at);
        positions
    }

    /// Snapshots of positions that reached a terminal state
    pub fn archived(&self) -> Vec<Position> {
        self.sweep();
        let mut positions: Vec<Position> = self.archive.iter().map(|p| p.value().clone()).collect();
        positions.sort_by_key(|p| p.updated_at);
        positions
    }

    pub async fn status_summary(&self) -> LifecycleStatus {
        let today = Utc::now().date_naive();
        let live_positions = self.live_count();

        LifecycleStatus {
            accepting: self.is_accepting(),
            live_positions,
            archived_positions: self.archive.len(),
            daily_loss: self.journal.daily_loss(today).await.ok(),
            daily_pnl: self.journal.daily_pnl(today).await.ok(),
            monitor: self.monitor.get_stats().await,
        }
    }

    /// Feed intents from `source` into `accept` until it ends or the manager stops
    pub async fn run_signals<S>(&self, source: &mut S) -> SignalRunStats
    where
        S: TradeSignalSource + ?Sized,
    {
        self.run_signals_until(source, std::future::pending()).await
    }

    /// Like `run_signals`, but `stop()`s once `shutdown` completes.
    ///
    /// Only the wait for the next intent races `shutdown`; an `accept` already
    /// in progress always runs to completion.
    pub async fn run_signals_until<S, F>(&self, source: &mut S, shutdown: F) -> SignalRunStats
    where
        S: TradeSignalSource + ?Sized,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stats = SignalRunStats::default();

        loop {
            let next = tokio::select! {
                intent = source.next_intent() => intent,
                _ = &mut shutdown => {
                    warn!("Shutdown requested, no new intents accepted");
                    self.stop();
                    None
                }
            };
            let Some(intent) = next else {
                break;
            };

            if !self.is_accepting() {
                info!("Lifecycle manager stopped, no longer reading signals");
                break;
            }

            stats.received += 1;
            match self.accept(intent).await {
                Ok(_) => stats.accepted += 1,
                Err(_) => stats.rejected += 1,
            }
        }

        info!(
            received = stats.received,
            accepted = stats.accepted,
            rejected = stats.rejected,
            "Signal source finished"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderSide, OrderStatus, OrderUpdate, PositionState, Side, TradeOutcome};
    use crate::error::ExchangeError;
    use crate::exchange::{ExchangeClient, PaperExchange};
    use crate::execution::RetryPolicy;
    use crate::signals::ChannelSignalSource;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn risk() -> RiskConfig {
        RiskConfig {
            stop_loss_pct: dec!(2),
            take_profit_pct: dec!(5),
            max_risk_per_trade_pct: dec!(1),
            max_daily_loss_abs: dec!(500),
            ..RiskConfig::default()
        }
    }

    fn paper() -> Arc<PaperExchange> {
        let exchange = Arc::new(PaperExchange::new(dec!(10000)));
        exchange.set_price("BTCUSDT", dec!(100));
        exchange
    }

    async fn manager(dir: &TempDir) -> (Arc<PaperExchange>, LifecycleManager) {
        let exchange = paper();
        let manager = manager_with(dir, exchange.clone()).await;
        (exchange, manager)
    }

    async fn manager_with(dir: &TempDir, exchange: Arc<dyn ExchangeClient>) -> LifecycleManager {
        let retry = RetryPolicy {
            max_attempts: 2,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            call_timeout: Duration::from_millis(200),
        };
        let gateway = Arc::new(OrderGateway::with_policy(
            exchange,
            retry,
            Duration::from_secs(60),
        ));
        let journal = Arc::new(
            TradeJournal::open(dir.path().join("journal.jsonl"))
                .await
                .unwrap(),
        );
        let monitor_config = PositionMonitorConfig {
            poll_interval: Duration::from_millis(10),
            price_grace: Duration::from_millis(50),
            entry_timeout: Duration::from_secs(60),
        };
        LifecycleManager::with_monitor_config(
            gateway,
            journal,
            risk(),
            monitor_config,
            OrderType::Market,
        )
    }

    /// Paper exchange with a slow submit acknowledgement and an optional
    /// journal breakage injected during the first submit
    struct HookedExchange {
        inner: Arc<PaperExchange>,
        ack_delay: Duration,
        break_journal: std::sync::Mutex<Option<PathBuf>>,
    }

    impl HookedExchange {
        fn new(inner: Arc<PaperExchange>) -> Self {
            Self {
                inner,
                ack_delay: Duration::ZERO,
                break_journal: std::sync::Mutex::new(None),
            }
        }

        fn with_ack_delay(mut self, delay: Duration) -> Self {
            self.ack_delay = delay;
            self
        }

        /// Swap the journal file for a directory so the next append fails
        fn breaking_journal(self, path: PathBuf) -> Self {
            *self.break_journal.lock().unwrap() = Some(path);
            self
        }
    }

    #[async_trait]
    impl ExchangeClient for HookedExchange {
        async fn submit(&self, request: &OrderRequest) -> std::result::Result<String, ExchangeError> {
            let order_id = self.inner.submit(request).await?;
            let broken = self.break_journal.lock().unwrap().take();
            if let Some(path) = broken {
                let _ = std::fs::remove_file(&path);
                std::fs::create_dir(&path).unwrap();
            }
            tokio::time::sleep(self.ack_delay).await;
            Ok(order_id)
        }

        async fn order_by_client_id(
            &self,
            client_order_id: &str,
        ) -> std::result::Result<Option<String>, ExchangeError> {
            self.inner.order_by_client_id(client_order_id).await
        }

        async fn cancel(&self, order_id: &str) -> std::result::Result<bool, ExchangeError> {
            self.inner.cancel(order_id).await
        }

        async fn status(&self, order_id: &str) -> std::result::Result<OrderUpdate, ExchangeError> {
            self.inner.status(order_id).await
        }

        async fn price(&self, symbol: &str) -> std::result::Result<Decimal, ExchangeError> {
            self.inner.price(symbol).await
        }

        async fn balance(&self) -> std::result::Result<Decimal, ExchangeError> {
            self.inner.balance().await
        }
    }

    fn intent() -> TradeIntent {
        TradeIntent::new("BTCUSDT", Side::Long, dec!(100), dec!(0.8))
    }

    #[tokio::test]
    async fn test_rejects_until_started() {
        let dir = TempDir::new().unwrap();
        let (exchange, manager) = manager(&dir).await;

        let rejection = manager.accept(intent()).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::NotAccepting);
        assert_eq!(exchange.submission_count(), 0);

        manager.start();
        assert!(manager.accept(intent()).await.is_ok());
    }

    #[tokio::test]
    async fn test_accept_sizes_and_journals_opened() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        manager.start();

        let id = manager.accept(intent()).await.unwrap();
        let position = manager.status(id).unwrap();
        // risk 100 / stop distance 2
        assert_eq!(position.size, dec!(50));
        assert_eq!(position.stop_loss_price, dec!(98));
        assert_eq!(position.take_profit_price, dec!(105));

        let records = manager.journal.read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, TradeOutcome::Opened);
        assert_eq!(records[0].position_id, id);
    }

    #[tokio::test]
    async fn test_unknown_position_is_not_found() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        assert!(matches!(
            manager.status(PositionId::new()),
            Err(GuardError::PositionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_max_open_positions() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        manager
            .reload_risk_config(RiskConfig {
                max_open_positions: 1,
                ..risk()
            })
            .unwrap();
        manager.start();

        manager.accept(intent()).await.unwrap();
        let rejection = manager.accept(intent()).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::TooManyPositions);
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        let mut events = manager.subscribe();

        let bad = RiskConfig {
            stop_loss_pct: dec!(-1),
            ..risk()
        };
        assert!(manager.reload_risk_config(bad).is_err());
        assert_eq!(manager.risk_config(), risk());

        let tighter = RiskConfig {
            take_profit_pct: dec!(3),
            ..risk()
        };
        manager.reload_risk_config(tighter.clone()).unwrap();
        assert_eq!(manager.risk_config(), tighter);
        assert!(matches!(
            events.recv().await.unwrap(),
            LifecycleEvent::RiskConfigReloaded
        ));
    }

    #[tokio::test]
    async fn test_reward_risk_floor() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        manager
            .reload_risk_config(RiskConfig {
                min_reward_risk_ratio: Some(dec!(3)),
                ..risk()
            })
            .unwrap();
        manager.start();

        let rejection = manager.accept(intent()).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::RewardRiskTooLow);
    }

    #[tokio::test]
    async fn test_run_signals_counts_outcomes() {
        let dir = TempDir::new().unwrap();
        let (_exchange, manager) = manager(&dir).await;
        manager.start();

        let (tx, mut source) = ChannelSignalSource::channel(8);
        tx.send(intent()).await.unwrap();
        tx.send(TradeIntent::new("", Side::Long, dec!(100), dec!(0.8)))
            .await
            .unwrap();
        drop(tx);

        let stats = manager.run_signals(&mut source).await;
        assert_eq!(
            stats,
            SignalRunStats {
                received: 2,
                accepted: 1,
                rejected: 1
            }
        );

        let summary = manager.status_summary().await;
        assert!(summary.accepting);
        assert_eq!(summary.live_positions + summary.archived_positions, 1);
    }

    #[tokio::test]
    async fn test_shutdown_archives_finished_positions() {
        let dir = TempDir::new().unwrap();
        let (exchange, manager) = manager(&dir).await;
        manager.start();

        let id = manager.accept(intent()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        exchange.set_price("BTCUSDT", dec!(106));

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .unwrap();

        assert!(manager.positions().is_empty());
        let archived = manager.status(id).unwrap();
        assert_eq!(archived.state, PositionState::Closed);
        assert_eq!(manager.archived().len(), 1);
    }

    #[tokio::test]
    async fn test_unrecorded_entry_is_cancelled_and_rejected() {
        let dir = TempDir::new().unwrap();
        let exchange = paper();
        exchange.set_auto_fill(false);
        let hooked = HookedExchange::new(exchange.clone()).breaking_journal(dir.path().join("journal.jsonl"));
        let manager = manager_with(&dir, Arc::new(hooked)).await;
        manager.start();

        let rejection = manager.accept(intent()).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::JournalUnavailable);
        assert!(manager.positions().is_empty());
        assert_eq!(manager.status_summary().await.monitor.supervised, 0);

        let buys = exchange.orders_for("BTCUSDT", OrderSide::Buy);
        assert_eq!(buys.len(), 1);
        let order_id = exchange
            .order_by_client_id(&buys[0].request_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            exchange.status(&order_id).await.unwrap().status,
            OrderStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn test_unrecorded_filled_entry_stays_supervised() {
        let dir = TempDir::new().unwrap();
        let journal_path = dir.path().join("journal.jsonl");
        let exchange = paper();
        let hooked = HookedExchange::new(exchange.clone()).breaking_journal(journal_path.clone());
        let manager = manager_with(&dir, Arc::new(hooked)).await;
        manager.start();

        // Market entry fills at once, so the cancel is not confirmed
        let rejection = manager.accept(intent()).await.unwrap_err();
        assert_eq!(rejection.code, RejectCode::JournalUnavailable);

        let live = manager.positions();
        assert_eq!(live.len(), 1);
        let id = live[0].id;

        std::fs::remove_dir(&journal_path).unwrap();
        exchange.set_price("BTCUSDT", dec!(106));

        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .unwrap();

        let closed = manager.status(id).unwrap();
        assert_eq!(closed.state, PositionState::Closed);
        let records = manager.journal.read_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].position_id, id);
        assert_eq!(records[0].outcome, TradeOutcome::TakeProfit);
    }

    #[tokio::test]
    async fn test_shutdown_during_accept_keeps_the_position() {
        let dir = TempDir::new().unwrap();
        let exchange = paper();
        let hooked = HookedExchange::new(exchange.clone()).with_ack_delay(Duration::from_millis(100));
        let manager = manager_with(&dir, Arc::new(hooked)).await;
        manager.start();

        let (tx, mut source) = ChannelSignalSource::channel(8);
        tx.send(intent()).await.unwrap();

        // Fires while the entry acknowledgement is still outstanding
        let stats = manager
            .run_signals_until(&mut source, tokio::time::sleep(Duration::from_millis(20)))
            .await;

        assert_eq!(stats.accepted, 1);
        assert!(!manager.is_accepting());
        assert_eq!(exchange.orders_for("BTCUSDT", OrderSide::Buy).len(), 1);
        let live = manager.positions();
        assert_eq!(live.len(), 1);

        exchange.set_price("BTCUSDT", dec!(106));
        tokio::time::timeout(Duration::from_secs(5), manager.shutdown())
            .await
            .unwrap();
        assert_eq!(manager.status(live[0].id).unwrap().state, PositionState::Closed);
        drop(tx);
    }
}
