use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::OrderType;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub risk: RiskConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub journal: JournalConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Risk limits applied to every intent.
///
/// Percent fields are in percent units (`2` = 2%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Distance from entry to stop-loss, in percent
    pub stop_loss_pct: Decimal,
    /// Distance from entry to take-profit, in percent
    pub take_profit_pct: Decimal,
    /// Share of account balance risked per trade, in percent
    pub max_risk_per_trade_pct: Decimal,
    /// Realized same-day losses (absolute) that halt new entries
    pub max_daily_loss_abs: Decimal,
    /// Decimal places for prices and pnl
    #[serde(default = "default_precision")]
    pub price_precision: u32,
    /// Decimal places for order sizes
    #[serde(default = "default_precision")]
    pub size_precision: u32,
    /// Minimum reward/risk ratio (None = disabled)
    #[serde(default)]
    pub min_reward_risk_ratio: Option<Decimal>,
    /// Minimum signal confidence in [0, 1]
    #[serde(default)]
    pub min_confidence: Decimal,
    /// Maximum concurrent live positions (0 = unlimited)
    #[serde(default)]
    pub max_open_positions: u32,
}

fn default_precision() -> u32 {
    8
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: dec!(2),
            take_profit_pct: dec!(5),
            max_risk_per_trade_pct: dec!(1),
            max_daily_loss_abs: dec!(500),
            price_precision: default_precision(),
            size_precision: default_precision(),
            min_reward_risk_ratio: None,
            min_confidence: Decimal::ZERO,
            max_open_positions: 0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.stop_loss_pct <= Decimal::ZERO || self.stop_loss_pct >= dec!(100) {
            errors.push("risk.stop_loss_pct must be between 0 and 100".to_string());
        }
        if self.take_profit_pct <= Decimal::ZERO {
            errors.push("risk.take_profit_pct must be positive".to_string());
        }
        if self.max_risk_per_trade_pct <= Decimal::ZERO || self.max_risk_per_trade_pct > dec!(100)
        {
            errors.push("risk.max_risk_per_trade_pct must be in (0, 100]".to_string());
        }
        if self.max_daily_loss_abs <= Decimal::ZERO {
            errors.push("risk.max_daily_loss_abs must be positive".to_string());
        }
        if self.min_confidence < Decimal::ZERO || self.min_confidence > Decimal::ONE {
            errors.push("risk.min_confidence must be between 0 and 1".to_string());
        }
        if let Some(ratio) = self.min_reward_risk_ratio {
            if ratio <= Decimal::ZERO {
                errors.push("risk.min_reward_risk_ratio must be positive".to_string());
            }
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Position monitor polling interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Maximum attempts for a single exchange call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay in milliseconds
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Per-call timeout in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Lifetime of request-id dedup entries
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    /// Price feed outage tolerated before monitoring is flagged degraded
    #[serde(default = "default_price_grace_secs")]
    pub price_grace_secs: u64,
    /// Age after which an unfilled entry order is cancelled
    #[serde(default = "default_entry_timeout_secs")]
    pub entry_timeout_secs: u64,
    #[serde(default = "default_entry_order_type")]
    pub entry_order_type: OrderType,
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    8_000
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_dedup_ttl_secs() -> u64 {
    3600
}

fn default_price_grace_secs() -> u64 {
    30
}

fn default_entry_timeout_secs() -> u64 {
    300
}

fn default_entry_order_type() -> OrderType {
    OrderType::Market
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            price_grace_secs: default_price_grace_secs(),
            entry_timeout_secs: default_entry_timeout_secs(),
            entry_order_type: default_entry_order_type(),
        }
    }
}

impl ExecutionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn price_grace(&self) -> Duration {
        Duration::from_secs(self.price_grace_secs)
    }

    pub fn entry_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// JSONL file holding the trade journal
    #[serde(default = "default_journal_path")]
    pub path: PathBuf,
}

fn default_journal_path() -> PathBuf {
    PathBuf::from("data/trade_journal.jsonl")
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_journal_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    /// Quote-currency balance of the simulated account
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
    /// Random-walk step per price query, in basis points (0 = static prices)
    #[serde(default)]
    pub volatility_bps: u32,
}

fn default_starting_balance() -> Decimal {
    dec!(10000)
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            volatility_bps: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("risk.stop_loss_pct", "2")?
            .set_default("risk.take_profit_pct", "5")?
            .set_default("risk.max_risk_per_trade_pct", "1")?
            .set_default("risk.max_daily_loss_abs", "500")?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific overlay (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TRADEGUARD_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TRADEGUARD_RISK__STOP_LOSS_PCT, etc.)
            .add_source(
                Environment::with_prefix("TRADEGUARD")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Configuration used when no files are present
    pub fn default_config() -> Self {
        Self {
            risk: RiskConfig::default(),
            execution: ExecutionConfig::default(),
            journal: JournalConfig::default(),
            paper: PaperConfig::default(),
            logging: LoggingConfig {
                level: default_log_level(),
                json: false,
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = self.risk.validate();

        if self.execution.poll_interval_secs == 0 {
            errors.push("execution.poll_interval_secs must be positive".to_string());
        }
        if self.execution.max_retries == 0 {
            errors.push("execution.max_retries must be at least 1".to_string());
        }
        if self.execution.backoff_cap_ms < self.execution.backoff_base_ms {
            errors.push("execution.backoff_cap_ms must be >= backoff_base_ms".to_string());
        }
        if self.execution.call_timeout_ms == 0 {
            errors.push("execution.call_timeout_ms must be positive".to_string());
        }
        if self.paper.starting_balance < Decimal::ZERO {
            errors.push("paper.starting_balance must not be negative".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
