//! Market module for exchange access.
//!
//! This module handles:
//! - Market summary types
//! - The exchange trait the rest of the bot programs against
//! - Polymarket CLOB REST client
//! - Mock exchange for testing

use async_trait::async_trait;

use crate::error::{MarketError, TradingError};
use crate::orderbook::BookUpdate;
use crate::trading::order::{OrderAck, OrderRequest, OrderState};

pub mod client;
pub mod mock;
pub mod types;

pub use client::ClobClient;
pub use mock::{FillBehavior, MockBook, MockBookBuilder, MockExchange};
pub use types::{MarketInfo, MarketStub};

/// Exchange operations the bot depends on.
///
/// The live implementation is [`ClobClient`]; tests use [`MockExchange`].
#[async_trait]
pub trait ClobExchange: Send + Sync {
    /// List markets available for scanning.
    async fn list_markets(&self) -> Result<Vec<MarketStub>, MarketError>;

    /// Fetch the current order book for a token.
    async fn fetch_book(&self, token_id: &str) -> Result<BookUpdate, MarketError>;

    /// Submit an order. The request carries a client-assigned idempotency
    /// reference; resubmitting the same request must not double-fill.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, TradingError>;

    /// Get the current state of a submitted order.
    async fn order_state(&self, order_id: &str) -> Result<OrderState, TradingError>;

    /// Cancel an open order.
    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError>;
}
