use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the lifecycle engine
#[derive(Error, Debug)]
pub enum GuardError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Journal errors
    #[error("Journal write failed: {0}")]
    JournalWrite(String),

    #[error("Journal read failed: {0}")]
    JournalRead(String),

    // Order execution errors
    #[error(transparent)]
    Order(#[from] OrderError),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GuardError
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors reported by an `ExchangeClient` implementation.
///
/// The variant decides whether the gateway retries: transport problems and
/// server-side failures are transient, semantic rejects are final.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown order: {0}")]
    UnknownOrder(String),

    #[error("price unavailable for {0}")]
    PriceUnavailable(String),
}

/// Specific error types for order execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    #[error("Transient exchange failure: {0}")]
    Transient(String),

    #[error("Timeout after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Order rejected by exchange: {0}")]
    Rejected(String),

    #[error("Exchange authentication failed: {0}")]
    Auth(String),

    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },

    #[error("Max retries exceeded after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl OrderError {
    /// Transient failures and timeouts are retried; everything else surfaces at once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrderError::Transient(_) | OrderError::Timeout { .. })
    }
}

impl From<ExchangeError> for OrderError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::Network(msg) => OrderError::Transient(msg),
            ExchangeError::Server { status, message } => {
                OrderError::Transient(format!("{status}: {message}"))
            }
            ExchangeError::PriceUnavailable(symbol) => {
                OrderError::Transient(format!("price unavailable for {symbol}"))
            }
            ExchangeError::Rejected { status, message } => {
                OrderError::Rejected(format!("{status}: {message}"))
            }
            ExchangeError::Auth(msg) => OrderError::Auth(msg),
            ExchangeError::UnknownOrder(order_id) => OrderError::NotFound { order_id },
        }
    }
}

/// Machine-readable reason attached to every refused intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    InvalidIntent,
    LowConfidence,
    NotAccepting,
    DailyLossLimitReached,
    DailyLossUnknown,
    InvalidStopDistance,
    SizeExceedsBalance,
    RewardRiskTooLow,
    TooManyPositions,
    BalanceUnavailable,
    JournalUnavailable,
    SubmissionFailed,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::InvalidIntent => "invalid_intent",
            RejectCode::LowConfidence => "low_confidence",
            RejectCode::NotAccepting => "not_accepting",
            RejectCode::DailyLossLimitReached => "daily_loss_limit_reached",
            RejectCode::DailyLossUnknown => "daily_loss_unknown",
            RejectCode::InvalidStopDistance => "invalid_stop_distance",
            RejectCode::SizeExceedsBalance => "size_exceeds_balance",
            RejectCode::RewardRiskTooLow => "reward_risk_too_low",
            RejectCode::TooManyPositions => "too_many_positions",
            RejectCode::BalanceUnavailable => "balance_unavailable",
            RejectCode::JournalUnavailable => "journal_unavailable",
            RejectCode::SubmissionFailed => "submission_failed",
        }
    }
}

impl std::fmt::Display for RejectCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An intent refused by the lifecycle manager
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
}

impl Rejection {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_error_classification() {
        let transient: OrderError = ExchangeError::Server {
            status: 503,
            message: "unavailable".into(),
        }
        .into();
        assert!(transient.is_retryable());

        let network: OrderError = ExchangeError::Network("reset".into()).into();
        assert!(network.is_retryable());

        let rejected: OrderError = ExchangeError::Rejected {
            status: 400,
            message: "insufficient funds".into(),
        }
        .into();
        assert!(!rejected.is_retryable());

        let auth: OrderError = ExchangeError::Auth("bad key".into()).into();
        assert!(!auth.is_retryable());
        assert!(OrderError::Timeout { elapsed_ms: 10 }.is_retryable());
    }

    #[test]
    fn test_rejection_display_carries_code() {
        let rejection = Rejection::new(RejectCode::DailyLossLimitReached, "loss 550 >= 500");
        assert_eq!(rejection.to_string(), "daily_loss_limit_reached: loss 550 >= 500");
        assert_eq!(
            serde_json::to_string(&rejection.code).unwrap(),
            "\"daily_loss_limit_reached\""
        );
    }
}
