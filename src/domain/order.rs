use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted by the exchange, nothing filled yet
    Pending,
    /// Some quantity filled, remainder still working
    PartiallyFilled,
    /// Fully filled
    Filled,
    /// Cancelled before completing
    Cancelled,
    /// Refused by the exchange
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::PartiallyFilled)
    }
}

/// Order request (what we want to do)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-generated id; resubmitting the same id never creates a second order
    pub request_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub order_type: OrderType,
    /// Limit price (None for market orders)
    pub price: Option<Decimal>,
}

impl OrderRequest {
    pub fn market(request_id: impl Into<String>, symbol: impl Into<String>, side: OrderSide, size: Decimal) -> Self {
        Self {
            request_id: request_id.into(),
            symbol: symbol.into(),
            side,
            size,
            order_type: OrderType::Market,
            price: None,
        }
    }

    pub fn limit(
        request_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            symbol: symbol.into(),
            side,
            size,
            order_type: OrderType::Limit,
            price: Some(price),
        }
    }

    /// Notional value at the limit price, if any
    pub fn value(&self) -> Option<Decimal> {
        self.price.map(|p| p * self.size)
    }
}

/// Reference to an order accepted by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub request_id: String,
    pub symbol: String,
    pub submitted_at: DateTime<Utc>,
}

/// Point-in-time view of an order on the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    pub filled_size: Decimal,
    pub avg_fill_price: Option<Decimal>,
}

impl OrderUpdate {
    pub fn pending() -> Self {
        Self {
            status: OrderStatus::Pending,
            filled_size: Decimal::ZERO,
            avg_fill_price: None,
        }
    }

    pub fn filled(size: Decimal, price: Decimal) -> Self {
        Self {
            status: OrderStatus::Filled,
            filled_size: size,
            avg_fill_price: Some(price),
        }
    }

    /// Dollar value actually executed
    pub fn fill_value(&self) -> Decimal {
        match self.avg_fill_price {
            Some(price) => price * self.filled_size,
            None => Decimal::ZERO,
        }
    }
}
