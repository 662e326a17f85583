//! Last committed stop per exchange and pair.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{CacheLock, StorageError, yaml_file};

/// Records older than this are never adopted.
pub const STOP_CACHE_TTL_MINUTES: i64 = 60;

/// StopRecord is the persisted ratchet state of one sell position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub exchange: String,
    pub pair: String,
    pub last_stop: Decimal,
    pub buy_price: Decimal,
    pub observed_high_price: Decimal,
    #[serde(default)]
    pub coin_precision: Option<u32>,
    pub updated: DateTime<Utc>,
}

impl StopRecord {
    /// A record is only trusted while fresh and written for the same buy price.
    pub fn is_valid(&self, buy_price: Decimal, now: DateTime<Utc>) -> bool {
        self.buy_price == buy_price
            && now.signed_duration_since(self.updated) < Duration::minutes(STOP_CACHE_TTL_MINUTES)
    }

    fn is_for(&self, exchange: &str, pair: &str) -> bool {
        self.exchange == exchange && self.pair == pair
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StopCacheFile {
    #[serde(default)]
    sell: Vec<StopRecord>,
}

/// StopCache reads and writes the stop cache file.
#[derive(Clone)]
pub struct StopCache {
    path: PathBuf,
    lock: CacheLock,
}

impl StopCache {
    pub fn new(path: impl Into<PathBuf>, lock: CacheLock) -> Self {
        Self {
            path: path.into(),
            lock,
        }
    }

    /// Returns the valid record for the position, if any.
    pub async fn load(&self, exchange: &str, pair: &str, buy_price: Decimal) -> Option<StopRecord> {
        self.load_at(exchange, pair, buy_price, Utc::now()).await
    }

    pub(crate) async fn load_at(
        &self,
        exchange: &str,
        pair: &str,
        buy_price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<StopRecord> {
        let _guard = self.lock.lock().await;
        let file: StopCacheFile = yaml_file::load(&self.path).await;

        let record = file.sell.into_iter().find(|r| r.is_for(exchange, pair))?;
        if record.is_valid(buy_price, now) {
            debug!(exchange = %exchange, pair = %pair, last_stop = %record.last_stop, "Loaded cached stop");
            Some(record)
        } else {
            info!(exchange = %exchange, pair = %pair, "Ignoring expired or inconsistent cached stop");
            None
        }
    }

    /// Updates the record in place, or replaces a stale one.
    pub async fn save(&self, record: StopRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut file: StopCacheFile = yaml_file::load(&self.path).await;

        let now = record.updated;
        let before = file.sell.len();
        file.sell.retain(|r| {
            !r.is_for(&record.exchange, &record.pair) || r.is_valid(record.buy_price, now)
        });
        if file.sell.len() != before {
            info!(
                exchange = %record.exchange,
                pair = %record.pair,
                "Removing expired or inconsistent cached stop"
            );
        }

        match file
            .sell
            .iter_mut()
            .find(|r| r.is_for(&record.exchange, &record.pair))
        {
            Some(existing) => *existing = record,
            None => file.sell.push(record),
        }

        yaml_file::store(&self.path, &file).await
    }
}
