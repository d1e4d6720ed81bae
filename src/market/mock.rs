//! Mock exchange for unit and integration testing.
//!
//! Implements [`ClobExchange`] without network access, with scripted order
//! books and injectable failure modes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::{MarketError, TradingError};
use crate::orderbook::{BookUpdate, PriceLevel};
use crate::trading::order::{OrderAck, OrderRequest, OrderState, OrderStatus};

use super::types::MarketStub;
use super::ClobExchange;

/// Scripted order book for a token.
#[derive(Debug, Clone, Default)]
pub struct MockBook {
    /// Bid levels.
    pub bids: Vec<PriceLevel>,
    /// Ask levels.
    pub asks: Vec<PriceLevel>,
}

/// How submitted orders behave.
#[derive(Debug, Clone, Default)]
pub enum FillBehavior {
    /// Every order fills immediately.
    #[default]
    FillImmediately,
    /// Orders rest on the book as live.
    RestOnBook,
    /// Every order is rejected with this reason.
    Reject(String),
}

#[derive(Default)]
struct MockState {
    books: HashMap<String, MockBook>,
    markets: Vec<MarketStub>,
    submissions: Vec<OrderRequest>,
    // client_order_id -> exchange order id, for idempotent resubmission.
    acks: HashMap<String, String>,
    cancelled: Vec<String>,
    fill_behavior: FillBehavior,
}

/// Mock exchange with scripted books and failure injection.
#[derive(Clone, Default)]
pub struct MockExchange {
    state: Arc<Mutex<MockState>>,
    order_counter: Arc<AtomicU64>,
    // Remaining submit calls that fail with a transient error.
    transient_submit_failures: Arc<AtomicU32>,
    // Remaining book fetches that fail.
    book_failures: Arc<AtomicU32>,
}

impl MockExchange {
    /// Create an empty mock exchange.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the order book for a token.
    pub fn set_book(&self, token_id: &str, book: MockBook) {
        self.state
            .lock()
            .unwrap()
            .books
            .insert(token_id.to_string(), book);
    }

    /// Script the market listing.
    pub fn set_markets(&self, markets: Vec<MarketStub>) {
        self.state.lock().unwrap().markets = markets;
    }

    /// Configure how submitted orders behave.
    pub fn set_fill_behavior(&self, behavior: FillBehavior) {
        self.state.lock().unwrap().fill_behavior = behavior;
    }

    /// Make the next `n` submissions fail with a transient error.
    pub fn fail_next_submits(&self, n: u32) {
        self.transient_submit_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` book fetches fail.
    pub fn fail_next_book_fetches(&self, n: u32) {
        self.book_failures.store(n, Ordering::SeqCst);
    }

    /// All submissions seen so far.
    pub fn submissions(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// All cancelled order ids.
    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Count of distinct orders the exchange actually opened.
    pub fn open_order_count(&self) -> usize {
        self.state.lock().unwrap().acks.len()
    }

    fn consume(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ClobExchange for MockExchange {
    async fn list_markets(&self) -> Result<Vec<MarketStub>, MarketError> {
        Ok(self.state.lock().unwrap().markets.clone())
    }

    async fn fetch_book(&self, token_id: &str) -> Result<BookUpdate, MarketError> {
        if Self::consume(&self.book_failures) {
            return Err(MarketError::FetchFailed {
                token_id: token_id.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let state = self.state.lock().unwrap();
        let book = state.books.get(token_id).cloned().unwrap_or_default();

        Ok(BookUpdate {
            token_id: token_id.to_string(),
            bids: book.bids,
            asks: book.asks,
            timestamp_ms: None,
        })
    }

    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderAck, TradingError> {
        if Self::consume(&self.transient_submit_failures) {
            return Err(TradingError::SubmissionFailed("injected failure".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        state.submissions.push(request.clone());

        if let FillBehavior::Reject(reason) = &state.fill_behavior {
            return Err(TradingError::OrderRejected {
                reason: reason.clone(),
            });
        }

        // Same idempotency key resolves to the same order, never a new fill.
        let order_id = match state.acks.get(&request.client_order_id) {
            Some(existing) => existing.clone(),
            None => {
                let id = format!("mock-{}", self.order_counter.fetch_add(1, Ordering::SeqCst));
                state
                    .acks
                    .insert(request.client_order_id.clone(), id.clone());
                id
            }
        };

        let status = match state.fill_behavior {
            FillBehavior::FillImmediately => OrderStatus::Filled,
            FillBehavior::RestOnBook => OrderStatus::Live,
            FillBehavior::Reject(_) => unreachable!(),
        };

        Ok(OrderAck {
            order_id: Some(order_id),
            error: None,
            status: Some(status),
        })
    }

    async fn order_state(&self, order_id: &str) -> Result<OrderState, TradingError> {
        let state = self.state.lock().unwrap();

        if state.cancelled.iter().any(|id| id == order_id) {
            return Ok(OrderState {
                order_id: order_id.to_string(),
                status: Some(OrderStatus::Canceled),
                filled_size: None,
                remaining_size: None,
            });
        }

        let status = match state.fill_behavior {
            FillBehavior::FillImmediately => OrderStatus::Filled,
            FillBehavior::RestOnBook => OrderStatus::Live,
            FillBehavior::Reject(_) => OrderStatus::Rejected,
        };

        Ok(OrderState {
            order_id: order_id.to_string(),
            status: Some(status),
            filled_size: None,
            remaining_size: None,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), TradingError> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(order_id.to_string());
        Ok(())
    }
}

/// Builder for scripted order books with common shapes.
pub struct MockBookBuilder {
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
}

impl MockBookBuilder {
    /// Start an empty book.
    pub fn new() -> Self {
        Self {
            bids: Vec::new(),
            asks: Vec::new(),
        }
    }

    /// Add a bid level.
    pub fn bid(mut self, price: Decimal, size: Decimal) -> Self {
        self.bids.push(PriceLevel::new(price, size));
        self
    }

    /// Add an ask level.
    pub fn ask(mut self, price: Decimal, size: Decimal) -> Self {
        self.asks.push(PriceLevel::new(price, size));
        self
    }

    /// Two-level book around the given best bid and ask.
    pub fn with_spread(mut self, best_bid: Decimal, best_ask: Decimal, depth: Decimal) -> Self {
        self.bids = vec![
            PriceLevel::new(best_bid, depth),
            PriceLevel::new(best_bid - Decimal::new(1, 2), depth * Decimal::TWO),
        ];
        self.asks = vec![
            PriceLevel::new(best_ask, depth),
            PriceLevel::new(best_ask + Decimal::new(1, 2), depth * Decimal::TWO),
        ];
        self
    }

    /// Build the scripted book.
    pub fn build(self) -> MockBook {
        MockBook {
            bids: self.bids,
            asks: self.asks,
        }
    }
}

impl Default for MockBookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::order::{Side, TradeIntent};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn mock_books_round_trip() {
        let exchange = MockExchange::new();
        exchange.set_book(
            "token-123",
            MockBookBuilder::new().with_spread(dec!(0.40), dec!(0.60), dec!(50)).build(),
        );

        let book = exchange.fetch_book("token-123").await.unwrap();
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks.len(), 2);

        // Unknown tokens return an empty book, not an error.
        let empty = exchange.fetch_book("other").await.unwrap();
        assert!(empty.bids.is_empty());
    }

    #[tokio::test]
    async fn duplicate_submission_reuses_order() {
        let exchange = MockExchange::new();
        let intent = TradeIntent::frontrun("token", Side::Buy, dec!(0.50), dec!(10));
        let request = OrderRequest::for_intent(&intent);

        let first = exchange.submit_order(&request).await.unwrap();
        let second = exchange.submit_order(&request).await.unwrap();

        assert_eq!(first.order_id, second.order_id);
        assert_eq!(exchange.open_order_count(), 1);
        assert_eq!(exchange.submissions().len(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_consumed() {
        let exchange = MockExchange::new();
        exchange.fail_next_submits(2);

        let intent = TradeIntent::frontrun("token", Side::Buy, dec!(0.50), dec!(10));
        let request = OrderRequest::for_intent(&intent);

        assert!(exchange.submit_order(&request).await.is_err());
        assert!(exchange.submit_order(&request).await.is_err());
        assert!(exchange.submit_order(&request).await.is_ok());
    }

    #[tokio::test]
    async fn rejection_mode_is_terminal() {
        let exchange = MockExchange::new();
        exchange.set_fill_behavior(FillBehavior::Reject("insufficient balance".to_string()));

        let intent = TradeIntent::frontrun("token", Side::Buy, dec!(0.50), dec!(10));
        let request = OrderRequest::for_intent(&intent);

        let err = exchange.submit_order(&request).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
