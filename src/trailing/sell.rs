//! Sell side: protect a holding with a trailing stop.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::ExchangeContext;
use super::{Trailing, TrailingError, Verdict};
use crate::domain::OrderSide;
use crate::notification::{Event, ExecutionData};

/// Quantity to sell and what it was checked against.
#[derive(Debug, Clone, Copy)]
pub(super) struct Holdings {
    pub quantity: Decimal,
    /// Free balance, when it was looked up this tick.
    pub balance: Option<Decimal>,
    /// Quantity comes from a running protective order.
    pub trusted: bool,
}

impl Trailing {
    pub(super) async fn evaluate_sell(&mut self) -> Result<Verdict, TrailingError> {
        let first_run = self.position.is_first_run();
        let holdings = self.resolve_holdings(first_run).await?;

        if first_run {
            if !holdings.trusted && !self.validate_holdings(&holdings) {
                return Ok(Verdict::Terminal);
            }
            self.notify_status(format!(
                "Ready to sell {} {} coins on {} exchange",
                holdings.quantity, self.position.pair.base, self.position.exchange
            ));

            if self.position.protective_enabled() {
                self.reconcile_protective(holdings.quantity).await?;
            }
        }

        let market_price = self
            .exchange
            .get_market_price(&self.position.pair)
            .await
            .context("get market price")?;

        self.position.observe(market_price);

        if self.position.is_first_run() && std::mem::take(&mut self.restored_from_cache) {
            if let Some(cached) = self.last_stop_from_cache.take() {
                self.position.last_stop = cached;
            }
            if market_price <= self.position.sell_trigger(market_price) {
                self.notify_status(format!(
                    "Preventing sell on first run, clearing cached stop {} and observed high {}",
                    self.position.last_stop, self.position.observed_high_price
                ));
                self.position.reset_stop();
                self.position.observe(market_price);
            }
        }

        let stop = self.position.sell_trigger(market_price);

        if self.protective_filled().await? {
            return Ok(Verdict::Terminal);
        }

        if market_price > stop {
            self.commit_stop(stop, market_price);
            return Ok(Verdict::Continue);
        }

        info!(
            pair = %self.position.pair,
            stop = %stop,
            price = %market_price,
            "Stop crossed, selling"
        );
        self.cancel_protective().await?;
        self.market_sell(holdings.quantity, market_price).await;

        Ok(Verdict::Terminal)
    }

    /// Finds out how much to sell this tick.
    async fn resolve_holdings(&mut self, first_run: bool) -> Result<Holdings, TrailingError> {
        if !first_run && self.position.protective_order_id.is_some() {
            if let Some(quantity) = self.protective_quantity {
                return Ok(Holdings {
                    quantity,
                    balance: None,
                    trusted: true,
                });
            }
        }

        if first_run && self.position.protective_enabled() {
            if let Some(quantity) = self.running_protective_quantity().await? {
                if self.position.coin_precision.is_none() {
                    let balance = self
                        .exchange
                        .get_balance(&self.position.pair.base)
                        .await
                        .context("get balance")?;
                    self.position.coin_precision = Some(balance.precision);
                }
                return Ok(Holdings {
                    quantity,
                    balance: None,
                    trusted: true,
                });
            }
        }

        let needs_lookup =
            first_run || self.position.quantity.is_none() || self.position.coin_precision.is_none();
        let balance = if needs_lookup {
            let balance = self
                .exchange
                .get_balance(&self.position.pair.base)
                .await
                .context("get balance")?;
            self.position.coin_precision = Some(balance.precision);
            Some(balance.free)
        } else {
            None
        };

        let quantity = match (self.position.quantity, balance) {
            (Some(quantity), _) => quantity,
            (None, Some(free)) => free,
            (None, None) => Decimal::ZERO,
        };

        Ok(Holdings {
            quantity: self.position.round_quantity(quantity),
            balance,
            trusted: false,
        })
    }

    /// Quantity of the cached protective order, if it is still open.
    async fn running_protective_quantity(&mut self) -> Result<Option<Decimal>, TrailingError> {
        let pair = self.position.pair.to_string();
        let Some(record) = self
            .order_cache
            .find(&self.position.exchange, &pair, OrderSide::Sell)
            .await
        else {
            return Ok(None);
        };

        let running = self
            .exchange
            .is_limit_order_running(&record.order_id, &self.position.pair)
            .await
            .context("check limit order")?;
        if !running {
            return Ok(None);
        }

        self.position.protective_order_id = Some(record.order_id);
        self.protective_quantity = Some(record.quantity);
        Ok(Some(record.quantity))
    }

    /// Checks the balance on the first run. Returns false when the task must end.
    fn validate_holdings(&self, holdings: &Holdings) -> bool {
        let balance = holdings.balance.unwrap_or(Decimal::ZERO);
        let base = &self.position.pair.base;

        if balance <= Decimal::ZERO {
            self.notify_status(format!(
                "Cannot find any {} coins on the {} exchange",
                base, self.position.exchange
            ));
            return false;
        }

        if holdings.quantity > balance {
            self.notify_status(format!(
                "Amount is set to sell {} coins, but only found {} {} coins available on the {} exchange, exiting",
                holdings.quantity, balance, base, self.position.exchange
            ));
            return false;
        }

        if holdings.quantity <= Decimal::ZERO {
            self.notify_status(format!(
                "Balance of {} {} is below the exchange precision, exiting",
                balance, base
            ));
            return false;
        }

        true
    }

    /// True when the protective order filled, which closes the position.
    async fn protective_filled(&mut self) -> Result<bool, TrailingError> {
        let Some(order_id) = self.position.protective_order_id.clone() else {
            return Ok(false);
        };

        match self
            .exchange
            .is_limit_order_filled(&order_id, &self.position.pair)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(false),
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Cannot check protective order status");
                return Ok(false);
            }
        }

        self.notify_status(format!(
            "Protective limit sell {} filled at {}",
            order_id,
            self.position.protective_price()
        ));
        self.forget_protective().await?;
        Ok(true)
    }

    /// Cancels the protective order before a market sell. Failures are only logged.
    async fn cancel_protective(&mut self) -> Result<(), TrailingError> {
        let Some(order_id) = self.position.protective_order_id.clone() else {
            return Ok(());
        };

        info!(order_id = %order_id, "Canceling protective limit sell");
        if let Err(e) = self
            .exchange
            .cancel_limit_order(&order_id, &self.position.pair)
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to cancel protective order before sell");
        }
        self.forget_protective().await
    }

    async fn forget_protective(&mut self) -> Result<(), TrailingError> {
        self.position.protective_order_id = None;
        self.protective_quantity = None;
        let pair = self.position.pair.to_string();
        self.order_cache
            .remove(&self.position.exchange, &pair, OrderSide::Sell)
            .await?;
        Ok(())
    }

    async fn market_sell(&self, quantity: Decimal, market_price: Decimal) {
        let result = self.exchange.sell(&self.position.pair, quantity).await;

        let (order_id, error) = match result {
            Ok(order_id) => {
                info!(pair = %self.position.pair, order_id = %order_id, quantity = %quantity, "Sold");
                (Some(order_id), None)
            }
            Err(e) => {
                warn!(pair = %self.position.pair, quantity = %quantity, error = %e, "Cannot create sell order");
                (None, Some(e.to_string()))
            }
        };

        self.notifier.send_async(Event::execution(ExecutionData {
            exchange: self.position.exchange.clone(),
            pair: self.position.pair.to_string(),
            side: OrderSide::Sell,
            quantity,
            market_price,
            order_id,
            error,
            mention: self.mention.clone(),
        }));
    }
}
