//! HTTP client for the Binance Spot REST API.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ExchangeConfig, RetryConfig};

/// Default receive window for signed requests in milliseconds.
const DEFAULT_RECEIVE_WINDOW: i64 = 5000;

/// Production Binance HTTP API endpoint.
pub const BASE_HTTP_API_URL: &str = "https://api.binance.com";

/// Binance spot testnet endpoint.
pub const TESTNET_HTTP_API_URL: &str = "https://testnet.binance.vision";

/// Default rate limit (requests per minute).
const DEFAULT_RATE_LIMIT: i64 = 1200;

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Length of the rate limit window.
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Binance API error.
#[derive(Debug, Error)]
#[error("binance api error {code}: {message}")]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rate limit exceeded: {current}/{limit} per minute")]
    RateLimitExceeded { current: i64, limit: i64 },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientError {
    /// Whether repeating the same request may succeed.
    fn is_retryable(&self) -> bool {
        match self {
            ClientError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            // Binance codes are negative, positive codes are HTTP statuses.
            ClientError::Api(api) => api.code == 429 || (500..600).contains(&api.code),
            _ => false,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Configuration for creating a new Client.
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
    pub rate_limit: i64,
    pub receive_window: i64,
    pub retry: RetryConfig,
}

impl ClientConfig {
    pub fn new(base_url: String, api_key: String, api_secret: String, rate_limit: i64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            api_secret,
            rate_limit: if rate_limit > 0 {
                rate_limit
            } else {
                DEFAULT_RATE_LIMIT
            },
            receive_window: DEFAULT_RECEIVE_WINDOW,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

struct RateLimitState {
    window_start: Instant,
}

/// HTTP client for the Binance Spot API.
/// Handles request signing, rate limiting, retries and error handling.
pub struct Client {
    config: ClientConfig,
    http_client: HttpClient,
    request_count: AtomicI64,
    rate_limit_state: Mutex<RateLimitState>,
}

impl Client {
    /// Creates a new Binance API client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = HttpClient::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            config,
            http_client,
            request_count: AtomicI64::new(0),
            rate_limit_state: Mutex::new(RateLimitState {
                window_start: Instant::now(),
            }),
        })
    }

    /// Creates a new Binance API client from exchange config.
    pub fn from_config(exchange_config: &ExchangeConfig, default_base_url: &str) -> Result<Self> {
        let base_url = match exchange_config.base_url {
            Some(ref url) if !url.is_empty() => url.clone(),
            _ if exchange_config.testnet => TESTNET_HTTP_API_URL.to_string(),
            _ => default_base_url.to_string(),
        };

        let config = ClientConfig::new(
            base_url,
            exchange_config.api_key.clone(),
            exchange_config.api_secret.clone(),
            exchange_config.rate_limit.unwrap_or(DEFAULT_RATE_LIMIT),
        )
        .with_retry(exchange_config.retry.clone().unwrap_or_default());

        Self::new(config)
    }

    /// HMAC-SHA256 of the query string, hex encoded.
    fn sign(&self, payload: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| ClientError::Credentials(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Sends a request, retrying transient failures with exponential backoff.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: Option<BTreeMap<String, String>>,
        signed: bool,
    ) -> Result<Vec<u8>> {
        let params = params.unwrap_or_default();
        // Orders are never resent: a timed out POST may still have been executed.
        let attempts = if method == Method::POST {
            1
        } else {
            self.config.retry.attempts()
        };
        let mut attempt = 1;

        loop {
            match self.request_once(method.clone(), endpoint, &params, signed).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempt,
                        delay = ?delay,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends a single HTTP request to the Binance API.
    /// All parameters travel in the query string; signed requests append
    /// timestamp, recvWindow and the signature.
    async fn request_once(
        &self,
        method: Method,
        endpoint: &str,
        params: &BTreeMap<String, String>,
        signed: bool,
    ) -> Result<Vec<u8>> {
        self.check_rate_limit()?;

        let mut params = params.clone();
        if signed {
            let timestamp = chrono::Utc::now().timestamp_millis();
            params.insert("timestamp".to_string(), timestamp.to_string());
            params.insert(
                "recvWindow".to_string(),
                self.config.receive_window.to_string(),
            );
        }

        let mut query: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        if signed {
            let signature = self.sign(&query)?;
            query = format!("{}&signature={}", query, signature);
        }

        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        };

        let mut request = self.http_client.request(method.clone(), &url);
        if signed {
            request = request.header("X-MBX-APIKEY", &self.config.api_key);
        }

        debug!(
            method = %method,
            endpoint = %endpoint,
            signed = signed,
            "sending request"
        );

        let response = request.send().await?;
        self.increment_request_count();

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(self.parse_error_response(status, &body));
        }

        Ok(body.to_vec())
    }

    /// Verifies we haven't exceeded the rate limit.
    fn check_rate_limit(&self) -> Result<()> {
        let mut state = self
            .rate_limit_state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if state.window_start.elapsed() > RATE_LIMIT_WINDOW {
            self.request_count.store(0, Ordering::SeqCst);
            state.window_start = Instant::now();
        }

        let current = self.request_count.load(Ordering::SeqCst);
        if current >= self.config.rate_limit {
            return Err(ClientError::RateLimitExceeded {
                current,
                limit: self.config.rate_limit,
            });
        }

        Ok(())
    }

    /// Increments the request counter.
    fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Creates a ClientError from an error response.
    ///
    /// Binance answers `{"code": -2010, "msg": "..."}`; when the body is not
    /// of that shape the HTTP status code is used instead.
    fn parse_error_response(&self, status: StatusCode, body: &[u8]) -> ClientError {
        #[derive(Deserialize)]
        struct ErrorResponse {
            code: Option<i32>,
            msg: Option<String>,
        }

        let api_err = match serde_json::from_slice::<ErrorResponse>(body) {
            Ok(resp) if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS => {
                ApiError {
                    code: resp.code.unwrap_or(status.as_u16() as i32),
                    message: resp
                        .msg
                        .unwrap_or_else(|| String::from_utf8_lossy(body).to_string()),
                }
            }
            _ => ApiError {
                code: status.as_u16() as i32,
                message: String::from_utf8_lossy(body).to_string(),
            },
        };

        warn!(code = api_err.code, message = %api_err.message, "api error");

        ClientError::Api(api_err)
    }

    /// Fetches the current server time from Binance.
    pub async fn get_server_time(&self) -> Result<chrono::DateTime<chrono::Utc>> {
        #[derive(Deserialize)]
        struct ServerTimeResponse {
            #[serde(rename = "serverTime")]
            server_time: i64,
        }

        let body = self
            .request(Method::GET, "/api/v3/time", None, false)
            .await?;
        let resp: ServerTimeResponse = serde_json::from_slice(&body)?;

        Ok(chrono::DateTime::from_timestamp_millis(resp.server_time).unwrap_or_default())
    }

    /// Returns the current request count in the window.
    pub fn request_count(&self) -> i64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Returns the maximum requests per minute.
    pub fn rate_limit(&self) -> i64 {
        self.config.rate_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(secret: &str) -> Client {
        let config = ClientConfig::new(
            BASE_HTTP_API_URL.to_string(),
            "key".to_string(),
            secret.to_string(),
            0,
        );
        Client::new(config).unwrap()
    }

    #[test]
    fn test_sign_matches_binance_reference_example() {
        // Example from the Binance API documentation.
        let client = client("NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j");
        let payload = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(payload).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_default_rate_limit_applied() {
        let client = client("secret");
        assert_eq!(client.rate_limit(), DEFAULT_RATE_LIMIT);
        assert_eq!(client.request_count(), 0);
    }

    #[test]
    fn test_rate_limit_exceeded() {
        let config = ClientConfig::new(
            BASE_HTTP_API_URL.to_string(),
            "key".to_string(),
            "secret".to_string(),
            1,
        );
        let client = Client::new(config).unwrap();
        assert!(client.check_rate_limit().is_ok());
        client.increment_request_count();
        assert!(matches!(
            client.check_rate_limit(),
            Err(ClientError::RateLimitExceeded { current: 1, limit: 1 })
        ));
    }

    #[test]
    fn test_parse_error_response_reads_binance_code() {
        let client = client("secret");
        let err = client.parse_error_response(
            StatusCode::BAD_REQUEST,
            br#"{"code":-2010,"msg":"Account has insufficient balance for requested action."}"#,
        );
        match err {
            ClientError::Api(api) => {
                assert_eq!(api.code, -2010);
                assert!(api.message.contains("insufficient balance"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let client = client("secret");
        let err = client.parse_error_response(StatusCode::BAD_GATEWAY, b"<html>bad gateway</html>");
        assert!(err.is_retryable());

        let err = client.parse_error_response(StatusCode::TOO_MANY_REQUESTS, b"{}");
        assert!(err.is_retryable());

        let err = client.parse_error_response(
            StatusCode::BAD_REQUEST,
            br#"{"code":-1121,"msg":"Invalid symbol."}"#,
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ClientConfig::new(
            "https://api.binance.us/".to_string(),
            String::new(),
            String::new(),
            0,
        );
        assert_eq!(config.base_url, "https://api.binance.us");
    }
}
