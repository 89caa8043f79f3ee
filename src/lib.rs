pub mod cli;
pub mod config;
pub mod coordination;
pub mod domain;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod persistence;
pub mod risk;
pub mod services;
pub mod signals;

pub use config::{AppConfig, RiskConfig};
pub use coordination::{LifecycleEvent, LifecycleManager, LifecycleStatus};
pub use domain::{Position, PositionId, PositionState, Side, TradeIntent, TradeOutcome, TradeRecord};
pub use error::{GuardError, OrderError, RejectCode, Rejection, Result};
pub use exchange::{ExchangeClient, PaperExchange};
pub use execution::OrderGateway;
pub use persistence::{JournalSummary, TradeJournal};
pub use risk::{DailyLossCheck, ExitLevels, RiskPolicy};
pub use services::{MonitorStats, PositionMonitor, PositionMonitorConfig};
pub use signals::{ChannelSignalSource, JsonlSignalSource, TradeSignalSource};
