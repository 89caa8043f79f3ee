use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RiskConfig;
use crate::domain::{ExitReason, Position, Side, TradeIntent};
use crate::error::{RejectCode, Rejection, Result};
use crate::persistence::TradeJournal;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Why an intent could not be sized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizingError {
    #[error("stop distance {stop_distance} is not positive")]
    InvalidStopDistance { stop_distance: Decimal },

    #[error("notional {notional} exceeds balance {balance}")]
    SizeExceedsBalance { notional: Decimal, balance: Decimal },

    #[error("sizing overflowed for entry price {entry_price}")]
    Overflow { entry_price: Decimal },
}

impl SizingError {
    pub fn code(&self) -> RejectCode {
        match self {
            SizingError::InvalidStopDistance { .. } => RejectCode::InvalidStopDistance,
            SizingError::SizeExceedsBalance { .. } => RejectCode::SizeExceedsBalance,
            SizingError::Overflow { .. } => RejectCode::InvalidIntent,
        }
    }
}

impl From<SizingError> for Rejection {
    fn from(err: SizingError) -> Self {
        Rejection::new(err.code(), err.to_string())
    }
}

/// Stop-loss and take-profit prices for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitLevels {
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

/// Outcome of the daily-loss circuit breaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyLossCheck {
    /// Same-day realized losses are below the limit
    Allowed { loss: Decimal },
    /// Realized losses reached the limit; new entries are blocked until the date rolls
    LimitReached { loss: Decimal, limit: Decimal },
    /// The journal could not be read; treated as blocked
    Unknown { reason: String },
}

impl DailyLossCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, DailyLossCheck::Allowed { .. })
    }
}

/// Stateless risk arithmetic over a `RiskConfig` snapshot
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskPolicy;

impl RiskPolicy {
    /// Convert a percent-unit config field into a fraction
    fn fraction(pct: Decimal) -> Decimal {
        pct / HUNDRED
    }

    /// Round a price half-even to the configured precision
    pub fn round_price(value: Decimal, config: &RiskConfig) -> Decimal {
        value.round_dp_with_strategy(config.price_precision, RoundingStrategy::MidpointNearestEven)
    }

    /// Reject malformed or low-confidence intents before any risk math
    pub fn validate_intent(intent: &TradeIntent, config: &RiskConfig) -> std::result::Result<(), Rejection> {
        if intent.symbol.trim().is_empty() {
            return Err(Rejection::new(RejectCode::InvalidIntent, "symbol is empty"));
        }
        if intent.entry_price <= Decimal::ZERO {
            return Err(Rejection::new(
                RejectCode::InvalidIntent,
                format!("entry price {} is not positive", intent.entry_price),
            ));
        }
        if Self::compute_exit_levels(intent.entry_price, intent.side, config).is_none() {
            return Err(Rejection::new(
                RejectCode::InvalidIntent,
                format!("entry price {} is out of range", intent.entry_price),
            ));
        }
        if intent.confidence < Decimal::ZERO || intent.confidence > Decimal::ONE {
            return Err(Rejection::new(
                RejectCode::InvalidIntent,
                format!("confidence {} outside [0, 1]", intent.confidence),
            ));
        }
        if intent.confidence < config.min_confidence {
            return Err(Rejection::new(
                RejectCode::LowConfidence,
                format!(
                    "confidence {} below minimum {}",
                    intent.confidence, config.min_confidence
                ),
            ));
        }
        Ok(())
    }

    /// Size a position so a stop-loss hit loses at most the per-trade risk.
    ///
    /// `risk = balance * max_risk`, `stop_distance = entry * stop_loss`,
    /// `size = risk / stop_distance`, rounded down to the size precision.
    pub fn size(
        intent: &TradeIntent,
        account_balance: Decimal,
        config: &RiskConfig,
    ) -> std::result::Result<Decimal, SizingError> {
        let overflow = || SizingError::Overflow {
            entry_price: intent.entry_price,
        };

        let risk_amount = account_balance
            .checked_mul(Self::fraction(config.max_risk_per_trade_pct))
            .ok_or_else(overflow)?;
        let stop_distance = intent
            .entry_price
            .checked_mul(Self::fraction(config.stop_loss_pct))
            .ok_or_else(overflow)?;

        if stop_distance <= Decimal::ZERO {
            return Err(SizingError::InvalidStopDistance { stop_distance });
        }

        let size = risk_amount
            .checked_div(stop_distance)
            .ok_or_else(overflow)?
            .round_dp_with_strategy(config.size_precision, RoundingStrategy::ToZero);
        let notional = size.checked_mul(intent.entry_price).ok_or_else(overflow)?;

        if notional > account_balance || size <= Decimal::ZERO {
            return Err(SizingError::SizeExceedsBalance {
                notional,
                balance: account_balance,
            });
        }

        debug!(
            symbol = %intent.symbol,
            %risk_amount,
            %stop_distance,
            %size,
            "Sized intent"
        );

        Ok(size)
    }

    /// Stop-loss below / take-profit above entry for longs, mirrored for shorts.
    ///
    /// `None` when the levels do not fit in a `Decimal`.
    pub fn compute_exit_levels(
        entry_price: Decimal,
        side: Side,
        config: &RiskConfig,
    ) -> Option<ExitLevels> {
        let stop = Self::fraction(config.stop_loss_pct);
        let take = Self::fraction(config.take_profit_pct);

        let (stop_factor, take_factor) = match side {
            Side::Long => (Decimal::ONE.checked_sub(stop)?, Decimal::ONE.checked_add(take)?),
            Side::Short => (Decimal::ONE.checked_add(stop)?, Decimal::ONE.checked_sub(take)?),
        };

        Some(ExitLevels {
            stop_loss: Self::round_price(entry_price.checked_mul(stop_factor)?, config),
            take_profit: Self::round_price(entry_price.checked_mul(take_factor)?, config),
        })
    }

    /// Reward per unit of risk; `None` when the stop distance is zero
    pub fn reward_risk_ratio(entry_price: Decimal, side: Side, levels: &ExitLevels) -> Option<Decimal> {
        let (risk, reward) = match side {
            Side::Long => (entry_price - levels.stop_loss, levels.take_profit - entry_price),
            Side::Short => (levels.stop_loss - entry_price, entry_price - levels.take_profit),
        };

        if risk <= Decimal::ZERO {
            None
        } else {
            Some(reward / risk)
        }
    }

    /// Which exit, if any, `price` triggers for `position`
    pub fn exit_trigger(position: &Position, price: Decimal) -> Option<ExitReason> {
        match position.side {
            Side::Long if price <= position.stop_loss_price => Some(ExitReason::StopLoss),
            Side::Long if price >= position.take_profit_price => Some(ExitReason::TakeProfit),
            Side::Short if price >= position.stop_loss_price => Some(ExitReason::StopLoss),
            Side::Short if price <= position.take_profit_price => Some(ExitReason::TakeProfit),
            _ => None,
        }
    }

    /// Evaluate the circuit breaker against a journal-derived loss total.
    ///
    /// `daily_loss` is the sum of the day's negative pnl; a read failure
    /// blocks new intents.
    pub fn daily_loss_gate(daily_loss: Result<Decimal>, config: &RiskConfig) -> DailyLossCheck {
        match daily_loss {
            Ok(sum) => {
                let loss = sum.abs();
                if loss >= config.max_daily_loss_abs {
                    DailyLossCheck::LimitReached {
                        loss,
                        limit: config.max_daily_loss_abs,
                    }
                } else {
                    DailyLossCheck::Allowed { loss }
                }
            }
            Err(e) => {
                warn!("Daily loss unknown, blocking new intents: {}", e);
                DailyLossCheck::Unknown {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Read `date`'s losses from the journal and apply the circuit breaker
    pub async fn check_daily_loss_limit(
        journal: &TradeJournal,
        config: &RiskConfig,
        date: NaiveDate,
    ) -> DailyLossCheck {
        Self::daily_loss_gate(journal.daily_loss(date).await, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderHandle, PositionId};
    use crate::error::GuardError;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn config() -> RiskConfig {
        RiskConfig {
            stop_loss_pct: dec!(2),
            take_profit_pct: dec!(5),
            max_risk_per_trade_pct: dec!(1),
            max_daily_loss_abs: dec!(500),
            ..RiskConfig::default()
        }
    }

    fn intent(entry: Decimal) -> TradeIntent {
        TradeIntent::new("BTCUSDT", Side::Long, entry, dec!(0.9))
    }

    fn open_position(side: Side, levels: ExitLevels) -> Position {
        let handle = OrderHandle {
            order_id: "o".into(),
            request_id: "r".into(),
            symbol: "BTCUSDT".into(),
            submitted_at: Utc::now(),
        };
        Position::pending(
            PositionId::new(),
            "BTCUSDT",
            side,
            dec!(100),
            dec!(1),
            levels.stop_loss,
            levels.take_profit,
            handle,
        )
    }

    #[test]
    fn test_size_risks_configured_fraction() {
        // risk = 10000 * 1% = 100; stop distance = 100 * 2% = 2; size = 50
        let size = RiskPolicy::size(&intent(dec!(100)), dec!(10000), &config()).unwrap();
        assert_eq!(size, dec!(50));
    }

    #[test]
    fn test_size_never_exceeds_risk_amount() {
        let cfg = config();
        let balance = dec!(12345.67);
        for entry in [dec!(0.0137), dec!(1.5), dec!(99.99), dec!(3333.33), dec!(61234.5)] {
            let mut cfg = cfg.clone();
            for stop in [dec!(0.5), dec!(2), dec!(7.25)] {
                cfg.stop_loss_pct = stop;
                cfg.max_risk_per_trade_pct = dec!(0.25);
                if let Ok(size) = RiskPolicy::size(&intent(entry), balance, &cfg) {
                    let bound = balance * (cfg.max_risk_per_trade_pct / HUNDRED)
                        / (stop / HUNDRED);
                    assert!(size * entry <= bound, "entry {entry} stop {stop}");
                }
            }
        }
    }

    #[test]
    fn test_size_rejects_non_positive_stop_distance() {
        let mut cfg = config();
        cfg.stop_loss_pct = Decimal::ZERO;
        let err = RiskPolicy::size(&intent(dec!(100)), dec!(10000), &cfg).unwrap_err();
        assert_eq!(err.code(), RejectCode::InvalidStopDistance);
    }

    #[test]
    fn test_size_rejects_notional_above_balance() {
        // risk 1% with 0.5% stop implies 2x leverage
        let mut cfg = config();
        cfg.stop_loss_pct = dec!(0.5);
        let err = RiskPolicy::size(&intent(dec!(100)), dec!(1000), &cfg).unwrap_err();
        assert_eq!(err.code(), RejectCode::SizeExceedsBalance);
    }

    #[test]
    fn test_extreme_prices_reject_instead_of_overflowing() {
        let cfg = config();
        assert!(RiskPolicy::compute_exit_levels(Decimal::MAX, Side::Long, &cfg).is_none());
        assert!(RiskPolicy::compute_exit_levels(Decimal::MAX, Side::Short, &cfg).is_none());
        assert_eq!(
            RiskPolicy::validate_intent(&intent(Decimal::MAX), &cfg).unwrap_err().code,
            RejectCode::InvalidIntent
        );

        // balance * risk / stop distance does not fit
        let err = RiskPolicy::size(&intent(dec!(0.0000000001)), Decimal::MAX, &cfg).unwrap_err();
        assert!(matches!(err, SizingError::Overflow { .. }));
        assert_eq!(err.code(), RejectCode::InvalidIntent);
    }

    #[test]
    fn test_exit_levels_long_and_short() {
        let cfg = config();
        let long = RiskPolicy::compute_exit_levels(dec!(100), Side::Long, &cfg).unwrap();
        assert_eq!(long.stop_loss, dec!(98));
        assert_eq!(long.take_profit, dec!(105));

        let short = RiskPolicy::compute_exit_levels(dec!(100), Side::Short, &cfg).unwrap();
        assert_eq!(short.stop_loss, dec!(102));
        assert_eq!(short.take_profit, dec!(95));
    }

    #[test]
    fn test_exit_levels_round_half_even() {
        let mut cfg = config();
        cfg.price_precision = 2;
        cfg.stop_loss_pct = dec!(1);
        // 0.125 * 0.99 = 0.12375 -> 0.12; 1.2525 * 0.99 = 1.239975 -> 1.24
        let levels = RiskPolicy::compute_exit_levels(dec!(0.125), Side::Long, &cfg).unwrap();
        assert_eq!(levels.stop_loss, dec!(0.12));
        assert_eq!(RiskPolicy::round_price(dec!(2.345), &cfg), dec!(2.34));
        assert_eq!(RiskPolicy::round_price(dec!(2.355), &cfg), dec!(2.36));
    }

    #[test]
    fn test_reward_risk_ratio() {
        let cfg = config();
        let levels = RiskPolicy::compute_exit_levels(dec!(100), Side::Long, &cfg).unwrap();
        assert_eq!(
            RiskPolicy::reward_risk_ratio(dec!(100), Side::Long, &levels),
            Some(dec!(2.5))
        );
        let short = RiskPolicy::compute_exit_levels(dec!(100), Side::Short, &cfg).unwrap();
        assert_eq!(
            RiskPolicy::reward_risk_ratio(dec!(100), Side::Short, &short),
            Some(dec!(2.5))
        );
    }

    #[test]
    fn test_exit_trigger() {
        let cfg = config();
        let long = open_position(Side::Long, RiskPolicy::compute_exit_levels(dec!(100), Side::Long, &cfg).unwrap());
        assert_eq!(RiskPolicy::exit_trigger(&long, dec!(97)), Some(ExitReason::StopLoss));
        assert_eq!(RiskPolicy::exit_trigger(&long, dec!(98)), Some(ExitReason::StopLoss));
        assert_eq!(RiskPolicy::exit_trigger(&long, dec!(105)), Some(ExitReason::TakeProfit));
        assert_eq!(RiskPolicy::exit_trigger(&long, dec!(101)), None);

        let short = open_position(Side::Short, RiskPolicy::compute_exit_levels(dec!(100), Side::Short, &cfg).unwrap());
        assert_eq!(RiskPolicy::exit_trigger(&short, dec!(102.5)), Some(ExitReason::StopLoss));
        assert_eq!(RiskPolicy::exit_trigger(&short, dec!(94)), Some(ExitReason::TakeProfit));
        assert_eq!(RiskPolicy::exit_trigger(&short, dec!(99)), None);
    }

    #[test]
    fn test_validate_intent() {
        let mut cfg = config();
        cfg.min_confidence = dec!(0.6);

        assert!(RiskPolicy::validate_intent(&intent(dec!(100)), &cfg).is_ok());

        let low = TradeIntent::new("BTCUSDT", Side::Long, dec!(100), dec!(0.5));
        assert_eq!(
            RiskPolicy::validate_intent(&low, &cfg).unwrap_err().code,
            RejectCode::LowConfidence
        );

        let bad_price = TradeIntent::new("BTCUSDT", Side::Long, dec!(0), dec!(0.9));
        assert_eq!(
            RiskPolicy::validate_intent(&bad_price, &cfg).unwrap_err().code,
            RejectCode::InvalidIntent
        );

        let no_symbol = TradeIntent::new(" ", Side::Short, dec!(10), dec!(0.9));
        assert_eq!(
            RiskPolicy::validate_intent(&no_symbol, &cfg).unwrap_err().code,
            RejectCode::InvalidIntent
        );
    }

    #[test]
    fn test_daily_loss_gate() {
        let cfg = config();
        assert!(RiskPolicy::daily_loss_gate(Ok(dec!(-499.99)), &cfg).is_allowed());
        assert_eq!(
            RiskPolicy::daily_loss_gate(Ok(dec!(-550)), &cfg),
            DailyLossCheck::LimitReached {
                loss: dec!(550),
                limit: dec!(500)
            }
        );
        assert!(!RiskPolicy::daily_loss_gate(Ok(dec!(-500)), &cfg).is_allowed());

        let unknown = RiskPolicy::daily_loss_gate(
            Err(GuardError::JournalRead("disk gone".into())),
            &cfg,
        );
        assert!(matches!(unknown, DailyLossCheck::Unknown { .. }));
        assert!(!unknown.is_allowed());
    }
}
