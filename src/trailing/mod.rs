//! Stop engine: one evaluation of a trailing stop per poll tick.

mod buy;
mod error;
mod protective;
mod sell;

pub use error::TrailingError;

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::{OrderSide, Position};
use crate::exchanges::Exchange;
use crate::notification::{ErrorData, Event, Notifier, StopChangeData};
use crate::storage::{OrderCache, StopCache, StopRecord};

/// What the poll driver should do after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling.
    Continue,
    /// The position is resolved, stop the task.
    Terminal,
}

/// Trailing owns one position and everything needed to evaluate it.
pub struct Trailing {
    position: Position,
    exchange: Arc<dyn Exchange>,
    notifier: Arc<dyn Notifier>,
    stop_cache: StopCache,
    order_cache: OrderCache,
    /// Stop restored from the cache, adopted on the first evaluation.
    last_stop_from_cache: Option<Decimal>,
    /// A cache record was restored and has not been checked against the market yet.
    restored_from_cache: bool,
    /// Quantity locked in the protective order, reused once the first stop commits.
    protective_quantity: Option<Decimal>,
    /// Appended to successful sell messages.
    mention: Option<String>,
}

impl Trailing {
    pub fn new(
        position: Position,
        exchange: Arc<dyn Exchange>,
        notifier: Arc<dyn Notifier>,
        stop_cache: StopCache,
        order_cache: OrderCache,
    ) -> Self {
        Self {
            position,
            exchange,
            notifier,
            stop_cache,
            order_cache,
            last_stop_from_cache: None,
            restored_from_cache: false,
            protective_quantity: None,
            mention: None,
        }
    }

    pub fn with_mention(mut self, mention: Option<String>) -> Self {
        self.mention = mention;
        self
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Short human label, e.g. "SELL BNB/USDT on binance".
    pub fn label(&self) -> String {
        format!(
            "{} {} on {}",
            self.position.side, self.position.pair, self.position.exchange
        )
    }

    /// Loads ratchet state saved by a previous run of the same sell position.
    pub async fn restore(&mut self) {
        if self.position.side != OrderSide::Sell {
            return;
        }

        let pair = self.position.pair.to_string();
        let Some(record) = self
            .stop_cache
            .load(&self.position.exchange, &pair, self.position.buy_price)
            .await
        else {
            return;
        };

        info!(
            pair = %pair,
            last_stop = %record.last_stop,
            observed_high = %record.observed_high_price,
            "Restored stop from cache"
        );

        self.restored_from_cache = true;
        if record.last_stop > Decimal::ZERO {
            self.last_stop_from_cache = Some(record.last_stop);
        }
        self.position.observe(record.observed_high_price);
        if self.position.coin_precision.is_none() {
            self.position.coin_precision = record.coin_precision;
        }
    }

    /// Runs one evaluation and persists the sell ratchet state.
    pub async fn evaluate(&mut self) -> Result<Verdict, TrailingError> {
        let verdict = match self.position.side {
            OrderSide::Sell => self.evaluate_sell().await?,
            OrderSide::Buy => self.evaluate_buy().await?,
        };

        if self.position.side == OrderSide::Sell {
            self.save_stop().await?;
        }

        Ok(verdict)
    }

    /// Logs a failed evaluation and forwards it to the notifier.
    pub fn report(&self, err: &TrailingError) {
        warn!(pair = %self.position.pair, error = %err, "Evaluation failed");
        self.notifier.send_async(Event::error(ErrorData {
            component: self.label(),
            message: if err.is_fatal() {
                "Stopping, cache state cannot be saved".to_string()
            } else {
                "Evaluation failed, retrying on next tick".to_string()
            },
            error: Some(err.to_string()),
        }));
    }

    async fn save_stop(&self) -> Result<(), TrailingError> {
        let record = StopRecord {
            exchange: self.position.exchange.clone(),
            pair: self.position.pair.to_string(),
            last_stop: self.position.last_stop,
            buy_price: self.position.buy_price,
            observed_high_price: self.position.observed_high_price,
            coin_precision: self.position.coin_precision,
            updated: Utc::now(),
        };
        self.stop_cache.save(record).await?;
        Ok(())
    }

    fn notify_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!(pair = %self.position.pair, "{}", message);
        self.notifier.send_async(Event::status(
            &self.position.exchange,
            &self.position.pair.to_string(),
            message,
        ));
    }

    /// Commits the stop and reports it when it moved.
    fn commit_stop(&mut self, stop: Decimal, market_price: Decimal) {
        if !self.position.commit_stop(stop) {
            debug!(pair = %self.position.pair, stop = %stop, price = %market_price, "Stop unchanged");
            return;
        }

        info!(
            pair = %self.position.pair,
            side = %self.position.side,
            stop = %stop,
            price = %market_price,
            "Stop moved"
        );
        self.notifier.send_async(Event::stop_change(StopChangeData {
            exchange: self.position.exchange.clone(),
            pair: self.position.pair.to_string(),
            side: self.position.side,
            start_factor: self.position.start_stop_factor,
            end_factor: self.position.end_stop_factor,
            max_loss_factor: self.position.max_loss_stop_factor,
            buy_price: self.position.buy_price,
            stop,
            market_price,
        }));
    }
}

#[cfg(test)]
mod tests;
