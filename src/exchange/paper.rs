//! Paper trading exchange.
//!
//! Simulates order handling against in-memory prices without touching a venue.
//! Used by the `run` command in dry-run sessions and by the integration tests,
//! which drive prices and fills by hand.

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

use super::ExchangeClient;
use crate::domain::{OrderRequest, OrderSide, OrderStatus, OrderType, OrderUpdate};
use crate::error::ExchangeError;

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    update: OrderUpdate,
}

/// In-memory exchange with settable prices and optional manual fills
pub struct PaperExchange {
    prices: DashMap<String, Decimal>,
    orders: DashMap<String, PaperOrder>,
    /// request_id -> order id
    client_orders: DashMap<String, String>,
    balance: Mutex<Decimal>,
    auto_fill: AtomicBool,
    price_outage: AtomicBool,
    volatility_bps: u32,
    next_id: AtomicU64,
    submissions: AtomicU64,
    submit_failures: Mutex<VecDeque<ExchangeError>>,
}

impl PaperExchange {
    pub fn new(balance: Decimal) -> Self {
        Self {
            prices: DashMap::new(),
            orders: DashMap::new(),
            client_orders: DashMap::new(),
            balance: Mutex::new(balance),
            auto_fill: AtomicBool::new(true),
            price_outage: AtomicBool::new(false),
            volatility_bps: 0,
            next_id: AtomicU64::new(1),
            submissions: AtomicU64::new(0),
            submit_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Random-walk every price query by up to `bps` basis points
    pub fn with_volatility(mut self, bps: u32) -> Self {
        self.volatility_bps = bps;
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.insert(symbol.to_string(), price);
    }

    pub fn set_balance(&self, balance: Decimal) {
        if let Ok(mut current) = self.balance.lock() {
            *current = balance;
        }
    }

    /// When disabled, orders stay pending until `fill_order` is called
    pub fn set_auto_fill(&self, enabled: bool) {
        self.auto_fill.store(enabled, Ordering::SeqCst);
    }

    /// Simulate the price feed being unreachable
    pub fn set_price_outage(&self, down: bool) {
        self.price_outage.store(down, Ordering::SeqCst);
    }

    /// Queue an error returned by the next `submit` call
    pub fn fail_next_submit(&self, error: ExchangeError) {
        if let Ok(mut failures) = self.submit_failures.lock() {
            failures.push_back(error);
        }
    }

    /// Orders accepted so far (including ones that failed afterwards)
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Accepted orders for `symbol` on `side`
    pub fn orders_for(&self, symbol: &str, side: OrderSide) -> Vec<OrderRequest> {
        self.orders
            .iter()
            .filter(|o| o.request.symbol == symbol && o.request.side == side)
            .map(|o| o.request.clone())
            .collect()
    }

    pub fn fill_order(&self, order_id: &str, price: Decimal) -> bool {
        match self.orders.get_mut(order_id) {
            Some(mut order) if order.update.status.is_active() => {
                order.update = OrderUpdate::filled(order.request.size, price);
                info!(order_id, %price, "Paper fill");
                true
            }
            _ => false,
        }
    }

    /// Fill every working order at the current price of its symbol
    pub fn fill_all_pending(&self) -> usize {
        let pending: Vec<(String, String)> = self
            .orders
            .iter()
            .filter(|o| o.update.status.is_active())
            .map(|o| (o.key().clone(), o.request.symbol.clone()))
            .collect();

        pending
            .into_iter()
            .filter(|(order_id, symbol)| {
                let price = self.prices.get(symbol).map(|p| *p);
                price.map_or(false, |p| self.fill_order(order_id, p))
            })
            .count()
    }

    /// Force a terminal non-fill status (exchange-side cancel or reject)
    pub fn set_order_status(&self, order_id: &str, status: OrderStatus) -> bool {
        match self.orders.get_mut(order_id) {
            Some(mut order) => {
                order.update.status = status;
                true
            }
            None => false,
        }
    }

    /// Replace the exchange-side state of an order
    pub fn set_order_update(&self, order_id: &str, update: OrderUpdate) -> bool {
        match self.orders.get_mut(order_id) {
            Some(mut order) => {
                order.update = update;
                true
            }
            None => false,
        }
    }

    fn marketable(request: &OrderRequest, price: Decimal) -> bool {
        match (request.order_type, request.price) {
            (OrderType::Market, _) | (_, None) => true,
            (OrderType::Limit, Some(limit)) => match request.side {
                OrderSide::Buy => price <= limit,
                OrderSide::Sell => price >= limit,
            },
        }
    }

    fn fill_price(request: &OrderRequest, market: Decimal) -> Decimal {
        match (request.order_type, request.price) {
            (OrderType::Limit, Some(limit)) => limit,
            _ => market,
        }
    }

    fn current_price(&self, symbol: &str) -> Option<Decimal> {
        self.prices.get(symbol).map(|p| *p)
    }
}

#[async_trait]
impl ExchangeClient for PaperExchange {
    async fn submit(&self, request: &OrderRequest) -> Result<String, ExchangeError> {
        if let Some(err) = self.submit_failures.lock().ok().and_then(|mut f| f.pop_front()) {
            debug!(request_id = %request.request_id, "Paper submit failing as scripted: {}", err);
            return Err(err);
        }

        if request.size <= Decimal::ZERO {
            return Err(ExchangeError::Rejected {
                status: 400,
                message: format!("invalid size {}", request.size),
            });
        }

        let market = self
            .current_price(&request.symbol)
            .ok_or_else(|| ExchangeError::Rejected {
                status: 400,
                message: format!("unknown symbol {}", request.symbol),
            })?;

        let order_id = format!("PAPER-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let update = if self.auto_fill.load(Ordering::SeqCst) && Self::marketable(request, market) {
            OrderUpdate::filled(request.size, Self::fill_price(request, market))
        } else {
            OrderUpdate::pending()
        };

        info!(
            order_id = %order_id,
            symbol = %request.symbol,
            side = %request.side,
            size = %request.size,
            status = ?update.status,
            "Paper order accepted"
        );

        self.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: request.clone(),
                update,
            },
        );
        self.client_orders
            .insert(request.request_id.clone(), order_id.clone());

        Ok(order_id)
    }

    async fn order_by_client_id(&self, client_order_id: &str) -> Result<Option<String>, ExchangeError> {
        Ok(self.client_orders.get(client_order_id).map(|id| id.clone()))
    }

    async fn cancel(&self, order_id: &str) -> Result<bool, ExchangeError> {
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::UnknownOrder(order_id.to_string()))?;

        if order.update.status.is_active() {
            order.update.status = OrderStatus::Cancelled;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn status(&self, order_id: &str) -> Result<OrderUpdate, ExchangeError> {
        let market = {
            let order = self
                .orders
                .get(order_id)
                .ok_or_else(|| ExchangeError::UnknownOrder(order_id.to_string()))?;
            self.current_price(&order.request.symbol)
        };

        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ExchangeError::UnknownOrder(order_id.to_string()))?;

        // Resting limit orders fill once the market crosses them
        if let Some(market) = market {
            if self.auto_fill.load(Ordering::SeqCst)
                && order.update.status.is_active()
                && Self::marketable(&order.request, market)
            {
                let price = Self::fill_price(&order.request, market);
                order.update = OrderUpdate::filled(order.request.size, price);
            }
        }

        Ok(order.update.clone())
    }

    async fn price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        if self.price_outage.load(Ordering::SeqCst) {
            return Err(ExchangeError::Network("paper price feed down".to_string()));
        }

        let mut entry = self
            .prices
            .get_mut(symbol)
            .ok_or_else(|| ExchangeError::PriceUnavailable(symbol.to_string()))?;

        if self.volatility_bps > 0 {
            let step = rand::thread_rng().gen_range(-(self.volatility_bps as i64)..=self.volatility_bps as i64);
            let factor = Decimal::ONE + Decimal::new(step, 4);
            *entry = (*entry * factor).round_dp(8);
        }

        Ok(*entry)
    }

    async fn balance(&self) -> Result<Decimal, ExchangeError> {
        self.balance
            .lock()
            .map(|b| *b)
            .map_err(|_| ExchangeError::Network("paper balance lock poisoned".to_string()))
    }
}
