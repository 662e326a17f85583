//! Buy side: wait for a bounce off the low before buying.

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::ExchangeContext;
use super::{Trailing, TrailingError, Verdict};
use crate::domain::OrderSide;
use crate::notification::{Event, ExecutionData};

impl Trailing {
    pub(super) async fn evaluate_buy(&mut self) -> Result<Verdict, TrailingError> {
        let market_price = self
            .exchange
            .get_market_price(&self.position.pair)
            .await
            .context("get market price")?;

        let stop = self.position.buy_stop(market_price);
        if stop > market_price {
            self.commit_stop(stop, market_price);
            return Ok(Verdict::Continue);
        }

        info!(
            pair = %self.position.pair,
            stop = %stop,
            price = %market_price,
            "Stop crossed, buying"
        );

        let quantity = self.buy_quantity(market_price).await?;
        if quantity <= Decimal::ZERO {
            self.notify_status(format!(
                "Cannot find enough {} to buy {} on the {} exchange",
                self.position.pair.quote, self.position.pair.base, self.position.exchange
            ));
            return Ok(Verdict::Terminal);
        }

        self.market_buy(quantity, market_price).await;
        Ok(Verdict::Terminal)
    }

    /// Fixed amount, or the whole quote balance converted at the market price.
    async fn buy_quantity(&mut self, market_price: Decimal) -> Result<Decimal, TrailingError> {
        if let Some(quantity) = self.position.quantity {
            return Ok(quantity);
        }

        let quote = self
            .exchange
            .get_balance(&self.position.pair.quote)
            .await
            .context("get balance")?;

        if self.position.coin_precision.is_none() {
            let base = self
                .exchange
                .get_balance(&self.position.pair.base)
                .await
                .context("get balance")?;
            self.position.coin_precision = Some(base.precision);
        }

        let Some(quantity) = quote.free.checked_div(market_price) else {
            return Ok(Decimal::ZERO);
        };
        Ok(self.position.round_quantity(quantity))
    }

    async fn market_buy(&self, quantity: Decimal, market_price: Decimal) {
        let result = self.exchange.buy(&self.position.pair, quantity).await;

        let (order_id, error) = match result {
            Ok(order_id) => {
                info!(pair = %self.position.pair, order_id = %order_id, quantity = %quantity, "Bought");
                (Some(order_id), None)
            }
            Err(e) => {
                warn!(pair = %self.position.pair, quantity = %quantity, error = %e, "Cannot create buy order");
                (None, Some(e.to_string()))
            }
        };

        self.notifier.send_async(Event::execution(ExecutionData {
            exchange: self.position.exchange.clone(),
            pair: self.position.pair.to_string(),
            side: OrderSide::Buy,
            quantity,
            market_price,
            order_id,
            error,
            mention: None,
        }));
    }
}
