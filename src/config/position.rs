//! Per-pair trailing stop configuration.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::duration;
use crate::domain::OrderSide;

/// One trailing stop to run, as written in the config file.
///
/// Percent fields are human percents ("1.5" means 1.5%), converted into
/// fractions when the [`crate::domain::Position`] is built.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionConfig {
    /// Exchange name, must match a key in `exchanges`.
    pub exchange: String,
    /// Whether the stop protects a holding (sell) or waits to enter (buy).
    #[serde(default = "default_side")]
    pub side: OrderSide,
    /// Market pair in "BASE/QUOTE" format.
    pub pair: String,
    /// Trailing distance used near the buy price.
    #[serde(default)]
    pub start_percent: Decimal,
    /// Trailing distance used near the limit sell ceiling.
    #[serde(default)]
    pub end_percent: Decimal,
    /// Hard floor below the buy price.
    #[serde(default)]
    pub max_loss_percent: Decimal,
    /// Offset above the buy price for the protective limit sell.
    #[serde(default)]
    pub limit_sell_percent: Decimal,
    /// Price the coins were acquired at.
    #[serde(default)]
    pub buy_price: Decimal,
    /// Static stop price, used when no trailing percents are set.
    #[serde(default)]
    pub price: Decimal,
    /// Fixed order size; the exchange balance is used when absent.
    pub amount: Option<Decimal>,
    /// Overrides the global poll interval for this position.
    #[serde(default, deserialize_with = "duration::deserialize_option")]
    pub interval: Option<Duration>,
}

fn default_side() -> OrderSide {
    OrderSide::Sell
}
