//! Unified error types for the frontrun bot.

use rust_decimal::Decimal;
use thiserror::Error;

/// Unified error type for the frontrun bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Market-related error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Market scanning and order book fetch errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// Failed to fetch the order book for a token.
    #[error("failed to fetch book for {token_id}: {reason}")]
    FetchFailed {
        /// Token ID that failed.
        token_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to list markets from the exchange.
    #[error("failed to list markets: {0}")]
    ListFailed(String),

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// Order book is inverted (best ask < best bid).
    #[error("order book inverted for {token_id}: best_ask={best_ask} < best_bid={best_bid}")]
    BookInverted {
        /// Token with the inverted book.
        token_id: String,
        /// Best ask price.
        best_ask: Decimal,
        /// Best bid price.
        best_bid: Decimal,
    },

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Trading and order execution errors.
///
/// The bot retries only [`TradingError::is_transient`] failures. Everything
/// else surfaces immediately as a failed trade outcome.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Order submission failed at the transport level.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// The API call did not complete within the deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Order rejected by the exchange (bad price, size, balance).
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },

    /// Insufficient funds for the order.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Required amount.
        required: Decimal,
        /// Available amount.
        available: Decimal,
    },

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Failed to cancel order.
    #[error("failed to cancel order {order_id}: {reason}")]
    CancelFailed {
        /// Order ID that failed to cancel.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Rate limited by the API.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },
}

impl TradingError {
    /// Whether a retry with the same idempotency key may succeed.
    ///
    /// Network failures and timeouts are transient. Exchange rejections are
    /// terminal: retrying an order the exchange refused once wastes the
    /// reaction window.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TradingError::SubmissionFailed(_)
                | TradingError::Timeout { .. }
                | TradingError::StatusFailed { .. }
                | TradingError::RateLimited { .. }
        )
    }
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// No message received within the heartbeat interval.
    #[error("feed stalled: no message for {stale_ms}ms")]
    Stalled {
        /// Milliseconds since the last message.
        stale_ms: u64,
    },

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Send failed.
    #[error("failed to send websocket message: {0}")]
    SendFailed(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TradingError::SubmissionFailed("reset by peer".into()).is_transient());
        assert!(TradingError::Timeout { timeout_ms: 10_000 }.is_transient());
        assert!(TradingError::RateLimited { retry_after_seconds: 1 }.is_transient());

        assert!(!TradingError::OrderRejected { reason: "bad price".into() }.is_transient());
        assert!(!TradingError::InvalidParams("size".into()).is_transient());
        assert!(!TradingError::InsufficientFunds {
            required: Decimal::ONE,
            available: Decimal::ZERO,
        }
        .is_transient());
    }
}
