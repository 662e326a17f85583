//! Exchange integration abstractions and implementations.

pub mod binance;
mod manager;
mod utils;

use crate::domain::{OrderSide, Pair};
use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

pub use manager::Manager;

/// Exchange errors.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Trading pair is not supported by this exchange.
    #[error("pair {0} is not supported")]
    PairNotSupported(String),

    /// Insufficient funds for the operation.
    #[error("insufficient funds")]
    InsufficientFunds,

    /// Order not found.
    #[error("order {0} not found")]
    OrderNotFound(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// API error from the exchange.
    #[error("API error: {0}")]
    Api(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Free balance of a coin together with the precision orders must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    /// Amount available for trading (not locked in orders).
    pub free: Decimal,
    /// Decimal places accepted for order quantities of this coin.
    pub precision: u32,
}

/// Exchange is everything the trailing stop engine needs from a venue.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Name returns the unique identifier of this exchange (e.g., "binance").
    fn name(&self) -> &str;

    /// Connect checks that the API is reachable before any position starts.
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    /// GetBalance returns the free amount and order precision of a coin.
    /// Unknown coins report a zero balance rather than an error.
    async fn get_balance(&self, coin: &str) -> Result<Balance>;

    /// GetMarketPrice returns the last traded price of the pair.
    async fn get_market_price(&self, pair: &Pair) -> Result<Decimal>;

    /// Sell places a market sell of `quantity` base coins and returns the order ID.
    async fn sell(&self, pair: &Pair, quantity: Decimal) -> Result<String>;

    /// Buy places a market buy of `quantity` base coins and returns the order ID.
    async fn buy(&self, pair: &Pair, quantity: Decimal) -> Result<String>;

    /// SetLimitOrder places a good-till-cancelled limit order and returns its ID.
    async fn set_limit_order(
        &self,
        side: OrderSide,
        pair: &Pair,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String>;

    /// CancelLimitOrder cancels an open limit order.
    async fn cancel_limit_order(&self, order_id: &str, pair: &Pair) -> Result<()>;

    /// IsLimitOrderRunning reports whether the order can still fill.
    async fn is_limit_order_running(&self, order_id: &str, pair: &Pair) -> Result<bool>;

    /// IsLimitOrderFilled reports whether the order has been completely filled.
    async fn is_limit_order_filled(&self, order_id: &str, pair: &Pair) -> Result<bool>;
}
