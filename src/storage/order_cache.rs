//! Open protective limit orders per exchange, pair and side.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{CacheLock, StorageError, yaml_file};
use crate::domain::OrderSide;

/// LimitOrderRecord remembers a limit order placed on the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderRecord {
    pub order_id: String,
    pub side: OrderSide,
    pub exchange: String,
    pub pair: String,
    pub quantity: Decimal,
    pub price: Decimal,
    pub updated: DateTime<Utc>,
}

impl LimitOrderRecord {
    /// True when the order was placed for exactly this size and price.
    pub fn matches(&self, quantity: Decimal, price: Decimal) -> bool {
        self.quantity == quantity && self.price == price
    }

    fn is_for(&self, exchange: &str, pair: &str, side: OrderSide) -> bool {
        self.exchange == exchange && self.pair == pair && self.side == side
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OrderCacheFile {
    #[serde(default)]
    order: Vec<LimitOrderRecord>,
}

/// OrderCache reads and writes the limit order cache file.
#[derive(Clone)]
pub struct OrderCache {
    path: PathBuf,
    lock: CacheLock,
}

impl OrderCache {
    pub fn new(path: impl Into<PathBuf>, lock: CacheLock) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// Returns the cached order for the key, whatever its price and size.
    pub async fn find(&self, exchange: &str, pair: &str, side: OrderSide) -> Option<LimitOrderRecord> {
        let _guard = self.lock.lock().await;
        let file: OrderCacheFile = yaml_file::load(&self.path).await;

        file.order
            .into_iter()
            .find(|r| r.is_for(exchange, pair, side))
    }

    /// Inserts or replaces the record for its key.
    pub async fn save(&self, record: LimitOrderRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut file: OrderCacheFile = yaml_file::load(&self.path).await;

        match file
            .order
            .iter_mut()
            .find(|r| r.is_for(&record.exchange, &record.pair, record.side))
        {
            Some(existing)
                if existing.order_id == record.order_id
                    && existing.matches(record.quantity, record.price) =>
            {
                debug!(order_id = %record.order_id, "Order already cached");
                return Ok(());
            }
            Some(existing) => {
                info!(
                    old_order_id = %existing.order_id,
                    order_id = %record.order_id,
                    pair = %record.pair,
                    "Replacing cached limit order"
                );
                *existing = record;
            }
            None => {
                info!(
                    order_id = %record.order_id,
                    exchange = %record.exchange,
                    pair = %record.pair,
                    "Adding limit order to cache"
                );
                file.order.push(record);
            }
        }

        yaml_file::store(&self.path, &file).await
    }

    /// Drops the record for the key, if present.
    pub async fn remove(&self, exchange: &str, pair: &str, side: OrderSide) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut file: OrderCacheFile = yaml_file::load(&self.path).await;

        let before = file.order.len();
        file.order.retain(|r| !r.is_for(exchange, pair, side));
        if file.order.len() == before {
            return Ok(());
        }

        yaml_file::store(&self.path, &file).await
    }
}
