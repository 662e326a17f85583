//! Protective limit sell kept open above the buy price until the first stop commits.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::error::ExchangeContext;
use super::{Trailing, TrailingError};
use crate::domain::OrderSide;
use crate::notification::{Event, LimitOrderData};
use crate::storage::LimitOrderRecord;

impl Trailing {
    /// Makes sure exactly one protective order for `quantity` rests at the target price.
    pub(super) async fn reconcile_protective(&mut self, quantity: Decimal) -> Result<(), TrailingError> {
        let price = self.position.protective_price();
        let pair = self.position.pair.to_string();

        let cached = self
            .order_cache
            .find(&self.position.exchange, &pair, OrderSide::Sell)
            .await;

        if let Some(record) = cached {
            let running = self
                .exchange
                .is_limit_order_running(&record.order_id, &self.position.pair)
                .await
                .context("check limit order")?;

            if running && record.matches(quantity, price) {
                info!(order_id = %record.order_id, price = %price, "Protective limit sell still open");
                self.position.protective_order_id = Some(record.order_id);
                self.protective_quantity = Some(quantity);
                return Ok(());
            }

            if running {
                info!(
                    order_id = %record.order_id,
                    cached_price = %record.price,
                    cached_quantity = %record.quantity,
                    price = %price,
                    quantity = %quantity,
                    "Replacing protective limit sell"
                );
                if let Err(e) = self
                    .exchange
                    .cancel_limit_order(&record.order_id, &self.position.pair)
                    .await
                {
                    warn!(order_id = %record.order_id, error = %e, "Failed to cancel order");
                }
            }
        }

        self.place_protective(quantity, price).await
    }

    async fn place_protective(&mut self, quantity: Decimal, price: Decimal) -> Result<(), TrailingError> {
        let order_id = self
            .exchange
            .set_limit_order(OrderSide::Sell, &self.position.pair, quantity, price)
            .await
            .context("set limit order")?;

        info!(order_id = %order_id, price = %price, quantity = %quantity, "Placed protective limit sell");
        self.position.protective_order_id = Some(order_id.clone());
        self.protective_quantity = Some(quantity);

        self.order_cache
            .save(LimitOrderRecord {
                order_id: order_id.clone(),
                side: OrderSide::Sell,
                exchange: self.position.exchange.clone(),
                pair: self.position.pair.to_string(),
                quantity,
                price,
                updated: Utc::now(),
            })
            .await?;

        self.notifier.send_async(Event::limit_order(LimitOrderData {
            exchange: self.position.exchange.clone(),
            pair: self.position.pair.to_string(),
            side: OrderSide::Sell,
            order_id,
            quantity,
            price,
        }));

        Ok(())
    }
}
