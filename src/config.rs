//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Trading Parameters ===
    /// Total bankroll in USD.
    #[serde(default = "default_bankroll")]
    pub bankroll: Decimal,

    /// Max percent of bankroll risked per trade.
    #[serde(default = "default_max_trade_percent")]
    pub max_trade_percent: Decimal,

    /// Size of bait orders in shares (1-5).
    #[serde(default = "default_micro_order_size")]
    pub micro_order_size: Decimal,

    /// Minimum spread to consider a market (USD).
    #[serde(default = "default_spread_threshold")]
    pub spread_threshold: Decimal,

    /// Minimum counter-order size that triggers a frontrun.
    #[serde(default = "default_min_counter_order_size")]
    pub min_counter_order_size: Decimal,

    /// Detection window after bait placement (milliseconds).
    #[serde(default = "default_reaction_window_ms")]
    pub reaction_window_ms: u64,

    /// Cap on the bait price offset (USD).
    #[serde(default = "default_bait_offset_cap")]
    pub bait_offset_cap: Decimal,

    /// Cap on the frontrun price offset (USD).
    #[serde(default = "default_frontrun_offset_cap")]
    pub frontrun_offset_cap: Decimal,

    // === Risk Management ===
    /// Max daily loss percent before the circuit breaker trips.
    #[serde(default = "default_max_daily_loss_percent")]
    pub max_daily_loss_percent: Decimal,

    /// Max simultaneous open trades.
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: usize,

    /// Consecutive losing trades that trip the breaker.
    #[serde(default = "default_breaker_consecutive_losses")]
    pub breaker_consecutive_losses: u32,

    /// Window for the execution-error-rate breaker (seconds).
    #[serde(default = "default_breaker_error_window_s")]
    pub breaker_error_window_s: u64,

    /// Execution errors within the window that trip the breaker.
    #[serde(default = "default_breaker_error_threshold")]
    pub breaker_error_threshold: u32,

    // === Market Scanning ===
    /// Order book polling interval (milliseconds).
    #[serde(default = "default_polling_interval_ms")]
    pub polling_interval_ms: u64,

    /// Max markets kept in the snapshot cache.
    #[serde(default = "default_market_cache_capacity")]
    pub market_cache_capacity: usize,

    /// Concurrent order book fetches during a scan.
    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,

    /// How long a cached market entry stays fresh (seconds).
    #[serde(default = "default_scan_cache_ttl_s")]
    pub scan_cache_ttl_s: u64,

    // === Order Execution ===
    /// Timeout per order API call (seconds).
    #[serde(default = "default_order_timeout_s")]
    pub order_timeout_s: u64,

    /// Max submission attempts for transient failures.
    #[serde(default = "default_order_max_retries")]
    pub order_max_retries: u32,

    /// Poll interval while waiting for a terminal order state (milliseconds).
    #[serde(default = "default_order_poll_interval_ms")]
    pub order_poll_interval_ms: u64,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    // === WebSocket Configuration ===
    /// Enable the WebSocket market feed instead of pure polling.
    #[serde(default = "default_true")]
    pub use_wss: bool,

    /// WebSocket base URL.
    #[serde(default = "default_ws_url")]
    pub polymarket_ws_url: String,

    /// CLOB API base URL.
    #[serde(default = "default_clob_url")]
    pub polymarket_clob_url: String,

    /// Consecutive failed connects before falling back to polling.
    #[serde(default = "default_ws_max_connect_attempts")]
    pub ws_max_connect_attempts: u32,

    /// Ceiling for reconnect backoff (seconds).
    #[serde(default = "default_ws_reconnect_max_delay_s")]
    pub ws_reconnect_max_delay_s: u64,

    /// Heartbeat interval; feed is stalled after 2x this (seconds).
    #[serde(default = "default_ws_heartbeat_interval_s")]
    pub ws_heartbeat_interval_s: u64,

    // === HTTP Client ===
    /// Timeout for REST calls (milliseconds).
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Connection pool size per host.
    #[serde(default = "default_http_pool_size")]
    pub http_pool_size: usize,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_bankroll() -> Decimal {
    Decimal::new(100, 0) // $100
}

fn default_max_trade_percent() -> Decimal {
    Decimal::ONE // 1% of bankroll
}

fn default_micro_order_size() -> Decimal {
    Decimal::new(3, 0) // 3 shares
}

fn default_spread_threshold() -> Decimal {
    Decimal::new(10, 2) // $0.10
}

fn default_min_counter_order_size() -> Decimal {
    Decimal::new(50, 0) // 50 shares
}

fn default_reaction_window_ms() -> u64 {
    1000
}

fn default_bait_offset_cap() -> Decimal {
    Decimal::new(5, 2) // $0.05
}

fn default_frontrun_offset_cap() -> Decimal {
    Decimal::new(2, 2) // $0.02
}

fn default_max_daily_loss_percent() -> Decimal {
    Decimal::new(5, 0) // 5%
}

fn default_max_concurrent_trades() -> usize {
    1
}

fn default_breaker_consecutive_losses() -> u32 {
    5
}

fn default_breaker_error_window_s() -> u64 {
    60
}

fn default_breaker_error_threshold() -> u32 {
    10
}

fn default_polling_interval_ms() -> u64 {
    200
}

fn default_market_cache_capacity() -> usize {
    500
}

fn default_scan_concurrency() -> usize {
    25
}

fn default_scan_cache_ttl_s() -> u64 {
    30
}

fn default_order_timeout_s() -> u64 {
    10
}

fn default_order_max_retries() -> u32 {
    3
}

fn default_order_poll_interval_ms() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_ws_max_connect_attempts() -> u32 {
    3
}

fn default_ws_reconnect_max_delay_s() -> u64 {
    30
}

fn default_ws_heartbeat_interval_s() -> u64 {
    30
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_http_pool_size() -> usize {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.bankroll < Decimal::ONE {
            return Err("BANKROLL must be at least 1".to_string());
        }

        if self.max_trade_percent < Decimal::new(1, 1)
            || self.max_trade_percent > Decimal::new(10, 0)
        {
            return Err("MAX_TRADE_PERCENT must be between 0.1 and 10".to_string());
        }

        if self.micro_order_size < Decimal::ONE || self.micro_order_size > Decimal::new(5, 0) {
            return Err("MICRO_ORDER_SIZE must be between 1 and 5 shares".to_string());
        }

        if self.spread_threshold <= Decimal::ZERO {
            return Err("SPREAD_THRESHOLD must be positive".to_string());
        }

        if !(100..=5000).contains(&self.polling_interval_ms) {
            return Err("POLLING_INTERVAL_MS must be between 100 and 5000".to_string());
        }

        if !(500..=5000).contains(&self.reaction_window_ms) {
            return Err("REACTION_WINDOW_MS must be between 500 and 5000".to_string());
        }

        if self.market_cache_capacity == 0 {
            return Err("MARKET_CACHE_CAPACITY must be positive".to_string());
        }

        if self.order_max_retries == 0 {
            return Err("ORDER_MAX_RETRIES must be at least 1".to_string());
        }

        Ok(())
    }

    /// Max dollars risked in a single trade.
    pub fn max_trade_amount(&self) -> Decimal {
        self.bankroll * self.max_trade_percent / Decimal::ONE_HUNDRED
    }

    /// Daily loss in dollars that trips the circuit breaker.
    pub fn max_daily_loss(&self) -> Decimal {
        self.bankroll * self.max_daily_loss_percent / Decimal::ONE_HUNDRED
    }

    /// Detection window as a [`Duration`].
    pub fn reaction_window(&self) -> Duration {
        Duration::from_millis(self.reaction_window_ms)
    }

    /// Polling interval as a [`Duration`].
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms)
    }

    /// Per-call order timeout as a [`Duration`].
    pub fn order_timeout(&self) -> Duration {
        Duration::from_secs(self.order_timeout_s)
    }
}

impl Default for Config {
    /// Defaults only; environment is not consulted.
    fn default() -> Self {
        serde_json::from_str("{}").expect("default config deserializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_values_are_sensible() {
        let config = Config::default();
        assert_eq!(config.bankroll, dec!(100));
        assert_eq!(config.max_trade_percent, dec!(1));
        assert_eq!(config.micro_order_size, dec!(3));
        assert_eq!(config.spread_threshold, dec!(0.10));
        assert_eq!(config.min_counter_order_size, dec!(50));
        assert_eq!(config.reaction_window_ms, 1000);
        assert_eq!(config.polling_interval_ms, 200);
        assert_eq!(config.market_cache_capacity, 500);
        assert_eq!(config.scan_concurrency, 25);
        assert!(config.use_wss);
        assert!(config.dry_run);
    }

    #[test]
    fn derived_limits() {
        let config = Config::default();
        // $100 bankroll at 1% per trade
        assert_eq!(config.max_trade_amount(), dec!(1));
        // 5% daily loss limit
        assert_eq!(config.max_daily_loss(), dec!(5));
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_bait() {
        let config = Config {
            micro_order_size: dec!(10),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_spread_threshold() {
        let config = Config {
            spread_threshold: Decimal::ZERO,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_polling() {
        let config = Config {
            polling_interval_ms: 50,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
