use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ExitReason, Position, PositionId, Side};

/// What a journal record documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Entry order accepted by the exchange
    Opened,
    StopLoss,
    TakeProfit,
    /// Exited for another reason
    Closed,
    /// Entry order cancelled or refused, no exposure was taken
    Rejected,
}

impl TradeOutcome {
    /// One terminal record exists per finished position
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TradeOutcome::Opened)
    }
}

impl From<Option<ExitReason>> for TradeOutcome {
    fn from(reason: Option<ExitReason>) -> Self {
        match reason {
            Some(ExitReason::StopLoss) => TradeOutcome::StopLoss,
            Some(ExitReason::TakeProfit) => TradeOutcome::TakeProfit,
            None => TradeOutcome::Closed,
        }
    }
}

/// One line of the trade journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub position_id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Option<Decimal>,
    pub size: Decimal,
    pub pnl: Decimal,
    pub outcome: TradeOutcome,
}

impl TradeRecord {
    pub fn opened(position: &Position) -> Self {
        Self {
            timestamp: Utc::now(),
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: None,
            size: position.size,
            pnl: Decimal::ZERO,
            outcome: TradeOutcome::Opened,
        }
    }

    pub fn closed(position: &Position, exit_price: Decimal, pnl: Decimal) -> Self {
        Self {
            timestamp: Utc::now(),
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: Some(exit_price),
            size: position.size,
            pnl,
            outcome: position.exit_reason.into(),
        }
    }

    pub fn rejected(position: &Position) -> Self {
        Self {
            timestamp: Utc::now(),
            position_id: position.id,
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            exit_price: None,
            size: Decimal::ZERO,
            pnl: Decimal::ZERO,
            outcome: TradeOutcome::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_exit_reason() {
        assert_eq!(TradeOutcome::from(Some(ExitReason::StopLoss)), TradeOutcome::StopLoss);
        assert_eq!(TradeOutcome::from(Some(ExitReason::TakeProfit)), TradeOutcome::TakeProfit);
        assert_eq!(TradeOutcome::from(None), TradeOutcome::Closed);
        assert!(!TradeOutcome::Opened.is_terminal());
        assert!(TradeOutcome::Rejected.is_terminal());
    }

    #[test]
    fn test_record_serializes_iso_timestamp() {
        let record = TradeRecord {
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            position_id: PositionId::new(),
            symbol: "SOLUSDT".into(),
            side: Side::Short,
            entry_price: Decimal::new(1500, 1),
            exit_price: Some(Decimal::new(1450, 1)),
            size: Decimal::ONE,
            pnl: Decimal::new(50, 1),
            outcome: TradeOutcome::TakeProfit,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"timestamp\":\"2026-03-01T12:00:00Z\""));
        assert!(json.contains("\"outcome\":\"take_profit\""));
        assert!(json.contains("\"side\":\"short\""));
    }
}
