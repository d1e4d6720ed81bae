//! Market-level types derived from order book snapshots.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::orderbook::BookSnapshot;

/// Depth used when summarizing liquidity near the top of the book.
const LIQUIDITY_DEPTH: usize = 5;

/// Summary of a scanned market.
#[derive(Debug, Clone, Serialize)]
pub struct MarketInfo {
    /// Token/condition ID on the CLOB.
    pub token_id: String,
    /// Human-readable market name.
    pub name: String,
    /// Current best bid.
    pub best_bid: Decimal,
    /// Current best ask.
    pub best_ask: Decimal,
    /// Best ask minus best bid.
    pub spread: Decimal,
    /// Size across the top bid levels.
    pub bid_liquidity: Decimal,
    /// Size across the top ask levels.
    pub ask_liquidity: Decimal,
    /// When the underlying snapshot was taken.
    pub last_update: OffsetDateTime,
}

impl MarketInfo {
    /// Summarize a snapshot. Returns `None` when either side is empty (a
    /// one-sided book has no spread to trade against) or when the book is
    /// inverted, so downstream code can rely on bid <= ask.
    pub fn from_snapshot(name: &str, snapshot: &BookSnapshot) -> Option<Self> {
        let best_bid = snapshot.best_bid()?;
        let best_ask = snapshot.best_ask()?;
        if best_ask < best_bid {
            return None;
        }

        Some(Self {
            token_id: snapshot.token_id.clone(),
            // Long questions get truncated for display and logs.
            name: name.chars().take(50).collect(),
            best_bid,
            best_ask,
            spread: best_ask - best_bid,
            bid_liquidity: snapshot.bid_liquidity(LIQUIDITY_DEPTH),
            ask_liquidity: snapshot.ask_liquidity(LIQUIDITY_DEPTH),
            last_update: snapshot.received_at,
        })
    }

    /// Whether the spread clears the configured threshold.
    pub fn is_profitable(&self, spread_threshold: Decimal) -> bool {
        self.spread >= spread_threshold
    }

    /// Mid price between best bid and ask.
    pub fn mid_price(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Total liquidity near the top of both sides.
    pub fn total_liquidity(&self) -> Decimal {
        self.bid_liquidity + self.ask_liquidity
    }

    /// Age of the snapshot backing this summary.
    pub fn age(&self) -> time::Duration {
        OffsetDateTime::now_utc() - self.last_update
    }
}

/// Market listing entry from the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketStub {
    /// Condition ID usable as the order book token.
    #[serde(alias = "token_id")]
    pub condition_id: Option<String>,
    /// Market question text.
    pub question: Option<String>,
    /// Whether the market is accepting orders.
    #[serde(default)]
    pub active: bool,
}

impl MarketStub {
    /// The token ID to scan, when present.
    pub fn token_id(&self) -> Option<&str> {
        self.condition_id.as_deref()
    }

    /// Display name for logs and the UI.
    pub fn name(&self) -> &str {
        self.question.as_deref().unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{BookUpdate, PriceLevel};
    use rust_decimal_macros::dec;

    fn snapshot(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> BookSnapshot {
        BookSnapshot::from_update(
            BookUpdate {
                token_id: "token".to_string(),
                bids: bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
                asks: asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
                timestamp_ms: None,
            },
            1,
        )
    }

    #[test]
    fn market_info_from_snapshot() {
        let snap = snapshot(
            vec![(dec!(0.40), dec!(30)), (dec!(0.39), dec!(40))],
            vec![(dec!(0.60), dec!(20))],
        );
        let info = MarketInfo::from_snapshot("Will it rain tomorrow?", &snap).unwrap();

        assert_eq!(info.best_bid, dec!(0.40));
        assert_eq!(info.best_ask, dec!(0.60));
        assert_eq!(info.spread, dec!(0.20));
        assert_eq!(info.bid_liquidity, dec!(70));
        assert_eq!(info.ask_liquidity, dec!(20));
        assert_eq!(info.mid_price(), dec!(0.50));
    }

    #[test]
    fn market_info_requires_both_sides() {
        let snap = snapshot(vec![(dec!(0.40), dec!(30))], vec![]);
        assert!(MarketInfo::from_snapshot("one-sided", &snap).is_none());
    }

    #[test]
    fn market_info_rejects_inverted_books() {
        let snap = snapshot(vec![(dec!(0.55), dec!(30))], vec![(dec!(0.45), dec!(30))]);
        assert!(MarketInfo::from_snapshot("inverted", &snap).is_none());
    }

    #[test]
    fn profitability_threshold() {
        let snap = snapshot(vec![(dec!(0.45), dec!(10))], vec![(dec!(0.55), dec!(10))]);
        let info = MarketInfo::from_snapshot("m", &snap).unwrap();

        assert!(info.is_profitable(dec!(0.10)));
        assert!(!info.is_profitable(dec!(0.11)));
    }

    #[test]
    fn long_names_are_truncated() {
        let snap = snapshot(vec![(dec!(0.45), dec!(10))], vec![(dec!(0.55), dec!(10))]);
        let name = "x".repeat(80);
        let info = MarketInfo::from_snapshot(&name, &snap).unwrap();
        assert_eq!(info.name.len(), 50);
    }
}
