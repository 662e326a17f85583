use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ExchangeConfig;
use crate::domain::{OrderSide, OrderStatus, Pair};
use crate::exchanges::binance::client::{BASE_HTTP_API_URL, ClientError};
use crate::exchanges::binance::Client;
use crate::exchanges::utils::{
    format_decimal, pair_to_symbol, parse_decimal, parse_order_status, step_precision,
};
use crate::exchanges::{Balance, Exchange, ExchangeError, Result};

/// Binance.US REST endpoint.
pub const BINANCE_US_HTTP_API_URL: &str = "https://api.binance.us";

/// Maximum acceptable clock drift between local and server time.
const MAX_CLOCK_DRIFT: Duration = Duration::from_secs(1);

/// Precision used when the coin has no LOT_SIZE filter.
const DEFAULT_COIN_PRECISION: u32 = 8;

/// Binance spot exchange implementation.
pub struct BinanceExchange {
    name: String,
    client: Client,
    precisions: Mutex<HashMap<String, u32>>,
}

impl BinanceExchange {
    /// Creates a Binance exchange registered under `name`.
    ///
    /// "binance.us" and "binanceus" default to the Binance.US endpoint.
    pub fn from_config(name: &str, config: &ExchangeConfig) -> Result<Self> {
        let default_url = match name.to_lowercase().as_str() {
            "binance.us" | "binanceus" => BINANCE_US_HTTP_API_URL,
            _ => BASE_HTTP_API_URL,
        };

        let client = Client::from_config(config, default_url)
            .map_err(|e| ExchangeError::Internal(format!("create {} client: {}", name, e)))?;

        Ok(Self::with_client(name, client))
    }

    pub fn with_client(name: &str, client: Client) -> Self {
        Self {
            name: name.to_string(),
            client,
            precisions: Mutex::new(HashMap::new()),
        }
    }

    /// Order quantity precision of a coin, from the LOT_SIZE step size.
    ///
    /// The coarsest step across all markets of the coin is used, so a
    /// quantity rounded to it is accepted on any of them.
    async fn coin_precision(&self, coin: &str) -> Result<u32> {
        if let Some(precision) = self.precisions.lock().await.get(coin) {
            return Ok(*precision);
        }

        let body = self
            .client
            .request(Method::GET, "/api/v3/exchangeInfo", None, false)
            .await
            .map_err(|e| map_client_error(e, coin))?;

        let info: ExchangeInfoResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse exchange info: {}", e)))?;

        let precision = info.lot_size_precision(coin).unwrap_or_else(|| {
            warn!(coin = %coin, "no LOT_SIZE filter found, using default precision");
            DEFAULT_COIN_PRECISION
        });

        self.precisions
            .lock()
            .await
            .insert(coin.to_string(), precision);

        Ok(precision)
    }

    async fn place_order(&self, pair: &Pair, params: BTreeMap<String, String>) -> Result<String> {
        let body = self
            .client
            .request(Method::POST, "/api/v3/order", Some(params), true)
            .await
            .map_err(|e| map_client_error(e, &pair.to_string()))?;

        let resp: OrderResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse order response: {}", e)))?;

        debug!(pair = %pair, order_id = resp.order_id, status = %resp.status, "order placed");

        Ok(resp.order_id.to_string())
    }

    async fn market_order(&self, side: OrderSide, pair: &Pair, quantity: Decimal) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(pair));
        params.insert("side".to_string(), side.as_str().to_string());
        params.insert("type".to_string(), "MARKET".to_string());
        params.insert("quantity".to_string(), format_decimal(quantity));

        self.place_order(pair, params).await
    }

    async fn order_status(&self, order_id: &str, pair: &Pair) -> Result<OrderStatus> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(pair));
        params.insert("orderId".to_string(), order_id.to_string());

        let body = self
            .client
            .request(Method::GET, "/api/v3/order", Some(params), true)
            .await
            .map_err(|e| map_client_error(e, order_id))?;

        let resp: OrderResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse order: {}", e)))?;

        Ok(parse_order_status(&resp.status))
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<()> {
        let server_time = self
            .client
            .get_server_time()
            .await
            .map_err(|e| ExchangeError::Connection(format!("connect to {}: {}", self.name, e)))?;

        let drift = (chrono::Utc::now() - server_time).abs();

        info!(
            exchange = %self.name,
            server_time = %server_time,
            clock_drift = ?drift,
            "connected"
        );

        if drift > chrono::Duration::from_std(MAX_CLOCK_DRIFT).unwrap_or_default() {
            warn!(drift = ?drift, "significant clock drift detected, signed requests may be rejected");
        }

        Ok(())
    }

    async fn get_balance(&self, coin: &str) -> Result<Balance> {
        let body = self
            .client
            .request(Method::GET, "/api/v3/account", None, true)
            .await
            .map_err(|e| map_client_error(e, coin))?;

        let account: AccountResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse account: {}", e)))?;

        let free = account
            .balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(coin))
            .map(|b| parse_decimal(&b.free))
            .unwrap_or_default();

        let precision = self.coin_precision(coin).await?;

        debug!(coin = %coin, free = %free, precision = precision, "fetched balance");

        Ok(Balance { free, precision })
    }

    async fn get_market_price(&self, pair: &Pair) -> Result<Decimal> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(pair));

        let body = self
            .client
            .request(Method::GET, "/api/v3/ticker/price", Some(params), false)
            .await
            .map_err(|e| map_client_error(e, &pair.to_string()))?;

        let ticker: TickerPriceResponse = serde_json::from_slice(&body)
            .map_err(|e| ExchangeError::Api(format!("parse ticker: {}", e)))?;

        let price = parse_decimal(&ticker.price);
        if price <= Decimal::ZERO {
            return Err(ExchangeError::Api(format!(
                "invalid price {:?} for {}",
                ticker.price, pair
            )));
        }

        Ok(price)
    }

    async fn sell(&self, pair: &Pair, quantity: Decimal) -> Result<String> {
        self.market_order(OrderSide::Sell, pair, quantity).await
    }

    async fn buy(&self, pair: &Pair, quantity: Decimal) -> Result<String> {
        self.market_order(OrderSide::Buy, pair, quantity).await
    }

    async fn set_limit_order(
        &self,
        side: OrderSide,
        pair: &Pair,
        quantity: Decimal,
        price: Decimal,
    ) -> Result<String> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(pair));
        params.insert("side".to_string(), side.as_str().to_string());
        params.insert("type".to_string(), "LIMIT".to_string());
        params.insert("timeInForce".to_string(), "GTC".to_string());
        params.insert("quantity".to_string(), format_decimal(quantity));
        params.insert("price".to_string(), format_decimal(price));

        self.place_order(pair, params).await
    }

    async fn cancel_limit_order(&self, order_id: &str, pair: &Pair) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert("symbol".to_string(), pair_to_symbol(pair));
        params.insert("orderId".to_string(), order_id.to_string());

        self.client
            .request(Method::DELETE, "/api/v3/order", Some(params), true)
            .await
            .map_err(|e| map_client_error(e, order_id))?;

        Ok(())
    }

    async fn is_limit_order_running(&self, order_id: &str, pair: &Pair) -> Result<bool> {
        Ok(self.order_status(order_id, pair).await?.is_running())
    }

    async fn is_limit_order_filled(&self, order_id: &str, pair: &Pair) -> Result<bool> {
        Ok(self.order_status(order_id, pair).await? == OrderStatus::Filled)
    }
}

/// Binance account response.
#[derive(Debug, Deserialize)]
struct AccountResponse {
    balances: Vec<AssetBalance>,
}

/// Individual asset balance.
#[derive(Debug, Deserialize)]
struct AssetBalance {
    asset: String,
    free: String,
    #[allow(dead_code)]
    locked: String,
}

/// Binance ticker price response.
#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Binance order response, shared by place and query endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    status: String,
}

/// Binance exchange info response.
#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    base_asset: String,
    #[serde(default)]
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    step_size: Option<String>,
}

impl ExchangeInfoResponse {
    fn lot_size_precision(&self, coin: &str) -> Option<u32> {
        self.symbols
            .iter()
            .filter(|s| s.base_asset.eq_ignore_ascii_case(coin))
            .flat_map(|s| s.filters.iter())
            .filter(|f| f.filter_type == "LOT_SIZE")
            .filter_map(|f| f.step_size.as_deref().and_then(step_precision))
            .min()
    }
}

/// Maps Binance client errors to exchange errors.
fn map_client_error(err: ClientError, context: &str) -> ExchangeError {
    match err {
        ClientError::Api(api_err) => match api_err.code {
            -2010 => ExchangeError::InsufficientFunds,
            -2011 | -2013 => ExchangeError::OrderNotFound(context.to_string()),
            -1121 => ExchangeError::PairNotSupported(context.to_string()),
            _ => ExchangeError::Api(format!("binance error for {}: {}", context, api_err)),
        },
        ClientError::RateLimitExceeded { .. } => {
            ExchangeError::Api(format!("rate limit exceeded for {}", context))
        }
        ClientError::Request(e) => ExchangeError::Connection(e.to_string()),
        other => ExchangeError::Api(format!("{}", other)),
    }
}
