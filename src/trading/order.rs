//! Trade intents and order wire types.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(serialize = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(serialize = "SELL", serialize = "sell")]
    Sell,
}

/// Why an order exists in the strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum IntentRole {
    /// Small decoy order probing for incoming liquidity.
    #[strum(serialize = "bait")]
    Bait,
    /// Reactive order priced ahead of a detected counter-order.
    #[strum(serialize = "frontrun")]
    Frontrun,
}

// Process-wide suffix so two intents created in the same millisecond still
// get distinct idempotency keys.
static INTENT_COUNTER: Lazy<AtomicU64> = Lazy::new(|| AtomicU64::new(0));

fn next_client_order_id(role: IntentRole) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let n = INTENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{role}-{millis}-{n}")
}

/// A proposed trade, created by the strategy loop and consumed by the
/// executor.
///
/// `client_order_id` is the idempotency reference: every submission attempt
/// for this intent carries the same id, so a retried submission cannot
/// duplicate a fill.
#[derive(Debug, Clone, Serialize)]
pub struct TradeIntent {
    /// Client-assigned idempotency reference.
    pub client_order_id: String,
    /// Token ID to trade.
    pub token_id: String,
    /// Order side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Order size in shares.
    pub size: Decimal,
    /// Bait or frontrun.
    pub role: IntentRole,
    /// When the intent was created.
    pub created_at: OffsetDateTime,
}

impl TradeIntent {
    /// Create a bait intent.
    pub fn bait(token_id: impl Into<String>, side: Side, price: Decimal, size: Decimal) -> Self {
        Self::new(token_id, side, price, size, IntentRole::Bait)
    }

    /// Create a frontrun intent.
    pub fn frontrun(
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> Self {
        Self::new(token_id, side, price, size, IntentRole::Frontrun)
    }

    fn new(
        token_id: impl Into<String>,
        side: Side,
        price: Decimal,
        size: Decimal,
        role: IntentRole,
    ) -> Self {
        Self {
            client_order_id: next_client_order_id(role),
            token_id: token_id.into(),
            side,
            price,
            size,
            role,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Dollar value at the limit price.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Validate intent parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.token_id.is_empty() {
            return Err("token_id is required".to_string());
        }
        if self.price <= Decimal::ZERO || self.price >= Decimal::ONE {
            return Err(format!("price {} outside (0, 1)", self.price));
        }
        if self.size <= Decimal::ZERO {
            return Err("size must be positive".to_string());
        }
        Ok(())
    }
}

/// Terminal state of a trade intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IntentState {
    /// Order filled.
    Filled {
        /// Exchange order ID.
        order_id: String,
    },
    /// Exchange refused the order; never retried.
    Rejected {
        /// Rejection reason.
        reason: String,
    },
    /// No terminal status within the deadline, retries exhausted.
    TimedOut,
    /// Order cancelled before filling.
    Cancelled,
}

impl IntentState {
    /// Whether the intent ended in a fill.
    pub fn is_filled(&self) -> bool {
        matches!(self, IntentState::Filled { .. })
    }
}

/// Order status reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order is pending.
    #[strum(serialize = "pending", serialize = "PENDING")]
    Pending,
    /// Order is live on the book.
    #[strum(serialize = "live", serialize = "LIVE")]
    Live,
    /// Order is fully filled.
    #[strum(serialize = "filled", serialize = "FILLED")]
    Filled,
    /// Order was cancelled.
    #[strum(
        serialize = "canceled",
        serialize = "cancelled",
        serialize = "CANCELED",
        serialize = "CANCELLED"
    )]
    Canceled,
    /// Order was rejected.
    #[strum(serialize = "rejected", serialize = "REJECTED")]
    Rejected,
    /// Order expired.
    #[strum(serialize = "expired", serialize = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }

    /// Check if order was filled.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Client-assigned idempotency reference.
    pub client_order_id: String,
    /// Token ID to trade.
    pub token_id: String,
    /// Order side (BUY/SELL).
    pub side: Side,
    /// Limit price as string.
    pub price: String,
    /// Order size as string.
    pub size: String,
    /// Time in force.
    pub order_type: String,
}

impl OrderRequest {
    /// Build the wire request for an intent. Bait orders rest on the book
    /// (GTC); frontrun orders cross immediately or die (FOK).
    pub fn for_intent(intent: &TradeIntent) -> Self {
        let order_type = match intent.role {
            IntentRole::Bait => "GTC",
            IntentRole::Frontrun => "FOK",
        };

        Self {
            client_order_id: intent.client_order_id.clone(),
            token_id: intent.token_id.clone(),
            side: intent.side,
            price: intent.price.to_string(),
            size: intent.size.to_string(),
            order_type: order_type.to_string(),
        }
    }
}

/// Order submission acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    /// Order ID (various field names).
    #[serde(alias = "orderID", alias = "orderId", alias = "order_id", alias = "id")]
    pub order_id: Option<String>,
    /// Error message if any.
    pub error: Option<String>,
    /// Initial status if reported.
    pub status: Option<OrderStatus>,
}

/// Order state summary from a status poll.
#[derive(Debug, Clone, Default)]
pub struct OrderState {
    /// Order ID.
    pub order_id: String,
    /// Current status.
    pub status: Option<OrderStatus>,
    /// Filled size.
    pub filled_size: Option<Decimal>,
    /// Remaining size.
    pub remaining_size: Option<Decimal>,
}

impl OrderState {
    /// Whether the order can no longer change.
    pub fn is_terminal(&self) -> bool {
        self.status.map(|s| s.is_terminal()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn intent_creation() {
        let bait = TradeIntent::bait("token-123", Side::Buy, dec!(0.48), dec!(3));
        assert_eq!(bait.role, IntentRole::Bait);
        assert_eq!(bait.notional(), dec!(1.44));
        assert!(bait.client_order_id.starts_with("bait-"));

        let frontrun = TradeIntent::frontrun("token-123", Side::Sell, dec!(0.52), dec!(10));
        assert_eq!(frontrun.role, IntentRole::Frontrun);
        assert!(frontrun.client_order_id.starts_with("frontrun-"));
    }

    #[test]
    fn idempotency_keys_are_unique() {
        let a = TradeIntent::bait("t", Side::Buy, dec!(0.48), dec!(3));
        let b = TradeIntent::bait("t", Side::Buy, dec!(0.48), dec!(3));
        assert_ne!(a.client_order_id, b.client_order_id);
    }

    #[test]
    fn intent_validation() {
        assert!(TradeIntent::bait("t", Side::Buy, dec!(0.48), dec!(3)).validate().is_ok());
        assert!(TradeIntent::bait("", Side::Buy, dec!(0.48), dec!(3)).validate().is_err());
        assert!(TradeIntent::bait("t", Side::Buy, dec!(0), dec!(3)).validate().is_err());
        assert!(TradeIntent::bait("t", Side::Buy, dec!(1.01), dec!(3)).validate().is_err());
        assert!(TradeIntent::bait("t", Side::Buy, dec!(0.48), dec!(-1)).validate().is_err());
    }

    #[test]
    fn request_order_type_follows_role() {
        let bait = TradeIntent::bait("t", Side::Buy, dec!(0.48), dec!(3));
        assert_eq!(OrderRequest::for_intent(&bait).order_type, "GTC");

        let frontrun = TradeIntent::frontrun("t", Side::Buy, dec!(0.48), dec!(10));
        let request = OrderRequest::for_intent(&frontrun);
        assert_eq!(request.order_type, "FOK");
        assert_eq!(request.client_order_id, frontrun.client_order_id);
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Live.is_terminal());
    }

    #[test]
    fn intent_state_fill_check() {
        assert!(IntentState::Filled { order_id: "x".into() }.is_filled());
        assert!(!IntentState::TimedOut.is_filled());
        assert!(!IntentState::Cancelled.is_filled());
        assert!(!IntentState::Rejected { reason: "r".into() }.is_filled());
    }
}
