use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::OrderSide;

/// Direction of market exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side that opens exposure in this direction
    pub fn entry_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side that flattens exposure in this direction
    pub fn exit_order_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// A request to open a position, produced by the signal layer.
///
/// Intents are consumed once by `LifecycleManager::accept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    /// Suggested entry price
    pub entry_price: Decimal,
    /// Signal confidence in [0, 1]
    pub confidence: Decimal,
}

impl TradeIntent {
    pub fn new(symbol: impl Into<String>, side: Side, entry_price: Decimal, confidence: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            entry_price,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_order_mapping() {
        assert_eq!(Side::Long.entry_order_side(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_order_side(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_order_side(), OrderSide::Buy);
        assert_eq!(Side::Short.sign(), dec!(-1));
    }

    #[test]
    fn test_intent_parses_from_json() {
        let intent: TradeIntent = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","side":"long","entry_price":"50000","confidence":0.8}"#,
        )
        .unwrap();
        assert_eq!(intent.side, Side::Long);
        assert_eq!(intent.entry_price, dec!(50000));
        assert_eq!(intent.confidence, dec!(0.8));
    }
}
