//! Order side and lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;

/// OrderSide represents the direction of an order (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy once the price has bounced off its low.
    #[serde(alias = "BUY", alias = "Buy")]
    Buy,
    /// Sell once the price has fallen off its high.
    #[serde(alias = "SELL", alias = "Sell")]
    Sell,
}

impl OrderSide {
    /// Upper-case wire name used by most exchange APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OrderStatus represents the current state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted by the exchange but not yet on the book.
    Pending,
    /// Resting on the book, possibly partially filled.
    Open,
    /// Completely filled.
    Filled,
    /// Cancelled before being filled.
    Cancelled,
    /// Rejected or expired.
    Failed,
}

impl OrderStatus {
    /// True while the order can still fill.
    pub fn is_running(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Open)
    }
}
