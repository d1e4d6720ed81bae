//! Polymarket CLOB REST client.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{MarketError, TradingError};
use crate::metrics;
use crate::orderbook::{BookUpdate, PriceLevel};
use crate::trading::order::{OrderAck, OrderRequest, OrderState, OrderStatus};

use super::types::MarketStub;
use super::ClobExchange;

/// Polymarket CLOB API client.
#[derive(Debug, Clone)]
pub struct ClobClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL for the CLOB API.
    clob_url: String,
}

/// Order book response from the API.
#[derive(Debug, Clone, Deserialize)]
struct OrderBookResponse {
    bids: Option<Vec<WireLevel>>,
    asks: Option<Vec<WireLevel>>,
    timestamp: Option<i64>,
}

/// Single price level as the API sends it.
#[derive(Debug, Clone, Deserialize)]
struct WireLevel {
    price: String,
    size: String,
}

impl ClobClient {
    /// Create a new client from config with low-latency HTTP settings.
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.http_timeout_ms))
            // Fast connection establishment
            .connect_timeout(std::time::Duration::from_millis(500))
            // TCP_NODELAY for low-latency (disable Nagle's algorithm)
            .tcp_nodelay(true)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(config.http_pool_size)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .build()
            .expect("failed to create HTTP client");

        Self {
            http,
            clob_url: config.polymarket_clob_url.clone(),
        }
    }

    /// Get the HTTP client reference.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Get the CLOB base URL.
    pub fn clob_url(&self) -> &str {
        &self.clob_url
    }

    fn parse_levels(levels: Option<Vec<WireLevel>>) -> Vec<PriceLevel> {
        levels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|level| {
                let price: Decimal = level.price.parse().ok()?;
                let size: Decimal = level.size.parse().ok()?;
                if size > Decimal::ZERO {
                    Some(PriceLevel { price, size })
                } else {
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl ClobExchange for ClobClient {
    #[instrument(skip(self))]
    async fn list_markets(&self) -> Result<Vec<MarketStub>, MarketError> {
        let url = format!("{}/markets", self.clob_url);

        let response = self.http.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MarketError::ListFailed(format!("HTTP {}", response.status())));
        }

        let markets: Vec<MarketStub> = response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse markets: {}", e)))?;

        debug!(count = markets.len(), "Listed markets");
        Ok(markets)
    }

    #[instrument(skip(self), fields(token_id = %token_id))]
    async fn fetch_book(&self, token_id: &str) -> Result<BookUpdate, MarketError> {
        let start = std::time::Instant::now();
        let url = format!("{}/book", self.clob_url);

        let response = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MarketError::FetchFailed {
                token_id: token_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let book: OrderBookResponse = response.json().await.map_err(|e| {
            MarketError::ParseError(format!("Failed to parse order book: {}", e))
        })?;

        metrics::record_book_fetch_latency(start);

        Ok(BookUpdate {
            token_id: token_id.to_string(),
            bids: Self::parse_levels(book.bids),
            asks: Self::parse_levels(book.asks),
            timestamp_ms: book.timestamp,
        })
    }

    #[instrument(skip(self, request), fields(token_id = %request.token_id, side = %request.side))]
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, TradingError> {
        let url = format!("{}/order", self.clob_url);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        // 4xx means the exchange looked at the order and said no. That is a
        // typed rejection, not a transport failure.
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::OrderRejected {
                reason: format!("HTTP {} - {}", status, body),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::SubmissionFailed(format!(
                "HTTP {} - {}",
                status, body
            )));
        }

        let ack: OrderAck = response.json().await.map_err(|e| {
            TradingError::SubmissionFailed(format!("Failed to parse response: {}", e))
        })?;

        if let Some(error) = &ack.error {
            return Err(TradingError::OrderRejected {
                reason: error.clone(),
            });
        }

        Ok(ack)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn order_state(&self, order_id: &str) -> Result<OrderState, TradingError> {
        let url = format!("{}/order/{}", self.clob_url, order_id);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let json: serde_json::Value =
            response.json().await.map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("Failed to parse response: {}", e),
            })?;

        let status = json
            .get("status")
            .or_else(|| json.get("orderStatus"))
            .or_else(|| json.get("order_status"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<OrderStatus>().ok());

        let filled_size =
            parse_decimal_field(&json, &["filled", "filledSize", "filled_size", "size_matched"]);
        let remaining_size = parse_decimal_field(
            &json,
            &["remaining", "remainingSize", "remaining_size", "size_remaining"],
        );

        Ok(OrderState {
            order_id: order_id.to_string(),
            status,
            filled_size,
            remaining_size,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        let url = format!("{}/order/{}", self.clob_url, order_id);

        let response =
            self.http.delete(&url).send().await.map_err(|e| TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: format!("{}", e),
            })?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "Cancel request refused");
            return Err(TradingError::CancelFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        Ok(())
    }
}

/// Parse a decimal field from JSON, trying multiple field names.
fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = json.get(*key) {
            if let Some(s) = value.as_str() {
                if let Ok(d) = s.parse::<Decimal>() {
                    return Some(d);
                }
            }
            if let Some(n) = value.as_f64() {
                if let Ok(d) = Decimal::try_from(n) {
                    return Some(d);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation_works() {
        let config = Config::default();
        let client = ClobClient::new(&config);
        assert_eq!(client.clob_url(), "https://clob.polymarket.com");
    }

    #[test]
    fn parse_decimal_field_works() {
        let json = serde_json::json!({
            "filled": "10.5",
            "remaining": 5.25,
        });

        assert_eq!(parse_decimal_field(&json, &["filled"]), Some(Decimal::new(105, 1)));
        assert_eq!(parse_decimal_field(&json, &["remaining"]), Some(Decimal::new(525, 2)));
        assert_eq!(parse_decimal_field(&json, &["missing"]), None);
    }

    #[test]
    fn parse_levels_drops_bad_entries() {
        let levels = vec![
            WireLevel { price: "0.48".to_string(), size: "100".to_string() },
            WireLevel { price: "bogus".to_string(), size: "5".to_string() },
            WireLevel { price: "0.50".to_string(), size: "0".to_string() },
        ];

        let parsed = ClobClient::parse_levels(Some(levels));
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].price, Decimal::new(48, 2));
    }
}
