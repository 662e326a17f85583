//! Manager for handling multiple exchange connections.

use super::binance::BinanceExchange;
use super::{Exchange, ExchangeError, Result};
use crate::config::{Config, ExchangeConfig};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Manager owns one instance per configured exchange, shared by all positions on it.
pub struct Manager {
    /// Map of exchange name to exchange instance.
    exchanges: Arc<RwLock<HashMap<String, Arc<dyn Exchange>>>>,
}

impl Manager {
    /// Creates a new Manager instance.
    pub fn new() -> Self {
        Self {
            exchanges: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Creates a new Manager from configuration.
    /// Only enabled exchanges will be instantiated.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let manager = Self::new();

        for (name, exchange_config) in &config.exchanges {
            if !exchange_config.enabled {
                info!(exchange = %name, "Skipping disabled exchange");
                continue;
            }

            info!(exchange = %name, "Loading exchange from config");

            let exchange = Self::create_exchange(name, exchange_config)?;
            manager.register(exchange).await;
        }

        Ok(manager)
    }

    /// Factory method to create an exchange instance based on name and config.
    fn create_exchange(name: &str, config: &ExchangeConfig) -> Result<Arc<dyn Exchange>> {
        match name.to_lowercase().as_str() {
            "binance" | "binance.us" | "binanceus" => {
                Ok(Arc::new(BinanceExchange::from_config(name, config)?))
            }
            "coinbase" => Err(ExchangeError::Internal(format!(
                "exchange {} is not yet implemented",
                name
            ))),
            _ => Err(ExchangeError::Internal(format!("unknown exchange: {}", name))),
        }
    }

    /// Registers a new exchange with the manager.
    pub async fn register(&self, exchange: Arc<dyn Exchange>) {
        let name = exchange.name().to_string();
        let mut exchanges = self.exchanges.write().await;
        info!(exchange = %name, "Registering exchange");
        exchanges.insert(name, exchange);
    }

    /// Returns a reference to an exchange by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Exchange>> {
        let exchanges = self.exchanges.read().await;
        exchanges.get(name).cloned()
    }

    /// Returns all registered exchange names.
    pub async fn list(&self) -> Vec<String> {
        let exchanges = self.exchanges.read().await;
        exchanges.keys().cloned().collect()
    }

    /// Connects all registered exchanges.
    pub async fn connect_all(&self) -> Result<()> {
        let exchanges = self.exchanges.read().await;
        for (name, exchange) in exchanges.iter() {
            info!(exchange = %name, "Connecting to exchange");
            if let Err(e) = exchange.connect().await {
                error!(exchange = %name, error = %e, "Failed to connect to exchange");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}
