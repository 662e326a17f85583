//! Common utilities for exchange implementations.

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::domain::{OrderStatus, Pair};

/// Converts BNB/USDT to "BNBUSDT".
pub fn pair_to_symbol(pair: &Pair) -> String {
    format!("{}{}", pair.base, pair.quote)
}

/// Maps common order states to OrderStatus.
pub fn parse_order_status(state: &str) -> OrderStatus {
    match state {
        "NEW" | "PARTIALLY_FILLED" | "PENDING_NEW" => OrderStatus::Open,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Cancelled,
        "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Failed,
        _ => OrderStatus::Pending,
    }
}

/// Parses a decimal string, treating garbage as zero.
pub fn parse_decimal(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_default()
}

/// Number of decimal places in a step size such as "0.00100000" (3).
pub fn step_precision(step: &str) -> Option<u32> {
    let step = Decimal::from_str(step).ok()?;
    if step <= Decimal::ZERO {
        return None;
    }
    Some(step.normalize().scale())
}

/// Formats a decimal for a REST parameter without trailing zeros.
pub fn format_decimal(value: Decimal) -> String {
    value.normalize().to_string()
}
