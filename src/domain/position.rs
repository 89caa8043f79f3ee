use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{OrderHandle, Side};
use crate::error::{GuardError, Result};

/// Opaque, unique position identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionState {
    /// Entry order submitted, not confirmed
    Pending,
    /// Entry order filled, exposure live
    Open,
    /// Exit order submitted
    Closing,
    /// Exit order filled and journaled
    Closed,
    /// Entry order never filled
    Rejected,
}

impl PositionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionState::Pending => "PENDING",
            PositionState::Open => "OPEN",
            PositionState::Closing => "CLOSING",
            PositionState::Closed => "CLOSED",
            PositionState::Rejected => "REJECTED",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: PositionState) -> bool {
        use PositionState::*;

        matches!(
            (self, target),
            (Pending, Open) | (Pending, Rejected) | (Open, Closing) | (Closing, Closed)
        )
    }

    /// Get valid next states from current state
    pub fn valid_transitions(&self) -> Vec<PositionState> {
        use PositionState::*;

        match self {
            Pending => vec![Open, Rejected],
            Open => vec![Closing],
            Closing => vec![Closed],
            Closed | Rejected => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PositionState::Closed | PositionState::Rejected)
    }

    /// Is there market exposure the monitor must not abandon?
    pub fn has_exposure(&self) -> bool {
        matches!(self, PositionState::Open | PositionState::Closing)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a position was exited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
        }
    }
}

/// State transition event (for logging/debugging)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PositionState,
    pub to: PositionState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A tracked market exposure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    /// Suggested entry until filled, then the actual fill price
    pub entry_price: Decimal,
    pub size: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub order: OrderHandle,
    pub close_order: Option<OrderHandle>,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<Decimal>,
    pub pnl: Option<Decimal>,
    pub state: PositionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: PositionId,
        symbol: impl Into<String>,
        side: Side,
        entry_price: Decimal,
        size: Decimal,
        stop_loss_price: Decimal,
        take_profit_price: Decimal,
        order: OrderHandle,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            symbol: symbol.into(),
            side,
            entry_price,
            size,
            stop_loss_price,
            take_profit_price,
            order,
            close_order: None,
            exit_reason: None,
            exit_price: None,
            pnl: None,
            state: PositionState::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to`, refusing anything outside the lifecycle graph.
    ///
    /// Terminal states have no outgoing edges, so they are sticky.
    pub fn transition(&mut self, to: PositionState, reason: impl Into<String>) -> Result<StateTransition> {
        if !self.state.can_transition_to(to) {
            return Err(GuardError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }

        let transition = StateTransition {
            from: self.state,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
        };
        self.state = to;
        self.updated_at = transition.timestamp;
        Ok(transition)
    }

    /// Size with the direction applied (+ long, - short)
    pub fn signed_size(&self) -> Decimal {
        self.size * self.side.sign()
    }

    /// `(exit - entry) * signed_size`
    pub fn pnl_at(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.signed_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: Side) -> Position {
        let handle = OrderHandle {
            order_id: "o-1".into(),
            request_id: "r-1".into(),
            symbol: "BTCUSDT".into(),
            submitted_at: Utc::now(),
        };
        Position::pending(
            PositionId::new(),
            "BTCUSDT",
            side,
            dec!(100),
            dec!(2),
            dec!(98),
            dec!(105),
            handle,
        )
    }

    #[test]
    fn test_valid_transitions() {
        use PositionState::*;

        assert!(Pending.can_transition_to(Open));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Open.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Closed));

        assert!(!Pending.can_transition_to(Closing));
        assert!(!Open.can_transition_to(Closed));
        assert!(!Open.can_transition_to(Rejected));
        assert!(!Closing.can_transition_to(Open));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        use PositionState::*;

        for terminal in [Closed, Rejected] {
            assert!(terminal.valid_transitions().is_empty());
            for target in [Pending, Open, Closing, Closed, Rejected] {
                assert!(!terminal.can_transition_to(target));
            }
        }

        let mut pos = position(Side::Long);
        pos.transition(Rejected, "entry cancelled").unwrap();
        assert!(pos.transition(Open, "late fill").is_err());
        assert_eq!(pos.state, Rejected);
    }

    #[test]
    fn test_full_lifecycle_records_transitions() {
        let mut pos = position(Side::Long);
        let t = pos.transition(PositionState::Open, "filled").unwrap();
        assert_eq!(t.from, PositionState::Pending);
        pos.transition(PositionState::Closing, "stop loss").unwrap();
        pos.transition(PositionState::Closed, "exit filled").unwrap();
        assert!(pos.state.is_terminal());
    }

    #[test]
    fn test_pnl_uses_signed_size() {
        let long = position(Side::Long);
        assert_eq!(long.pnl_at(dec!(97)), dec!(-6));
        assert_eq!(long.pnl_at(dec!(105)), dec!(10));

        let short = position(Side::Short);
        assert_eq!(short.pnl_at(dec!(97)), dec!(6));
        assert_eq!(short.pnl_at(dec!(103)), dec!(-6));
    }
}
