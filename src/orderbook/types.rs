//! Order book types and data structures.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Single price level in an order book.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceLevel {
    /// Price at this level.
    pub price: Decimal,
    /// Total size available at this price.
    pub size: Decimal,
}

impl PriceLevel {
    /// Create a new price level.
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }
}

/// Which side of the book a level sits on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookSide {
    /// Resting buy interest.
    #[strum(serialize = "BID", serialize = "bid")]
    Bid,
    /// Resting sell interest.
    #[strum(serialize = "ASK", serialize = "ask")]
    Ask,
}

/// Raw book content delivered by the feed before it enters the cache.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    /// Token ID the update is for.
    pub token_id: String,
    /// Bid levels, unordered.
    pub bids: Vec<PriceLevel>,
    /// Ask levels, unordered.
    pub asks: Vec<PriceLevel>,
    /// Exchange timestamp in milliseconds, when provided.
    pub timestamp_ms: Option<i64>,
}

/// Immutable order book snapshot.
///
/// Superseded by the next snapshot for the same market, never mutated in
/// place. The sequence number is assigned by the cache and is monotonic per
/// market.
#[derive(Debug, Clone)]
pub struct BookSnapshot {
    /// Token ID this snapshot belongs to.
    pub token_id: String,
    /// Bid levels sorted by price descending.
    pub bids: Vec<PriceLevel>,
    /// Ask levels sorted by price ascending.
    pub asks: Vec<PriceLevel>,
    /// Monotonic per-market sequence number.
    pub seq: u64,
    /// When this snapshot was received.
    pub received_at: OffsetDateTime,
}

impl BookSnapshot {
    /// Build a snapshot from a raw update, sorting both sides.
    pub fn from_update(update: BookUpdate, seq: u64) -> Self {
        let mut bids = update.bids;
        let mut asks = update.asks;
        bids.retain(|l| l.size > Decimal::ZERO);
        asks.retain(|l| l.size > Decimal::ZERO);
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        Self {
            token_id: update.token_id,
            bids,
            asks,
            seq,
            received_at: OffsetDateTime::now_utc(),
        }
    }

    /// Get the best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Get the spread between best bid and ask.
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// Get the mid price.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / Decimal::TWO),
            _ => None,
        }
    }

    /// Check if the book is inverted (best ask < best bid).
    pub fn is_inverted(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => ask < bid,
            _ => false,
        }
    }

    /// Total size across the top `depth` bid levels.
    pub fn bid_liquidity(&self, depth: usize) -> Decimal {
        self.bids.iter().take(depth).map(|l| l.size).sum()
    }

    /// Total size across the top `depth` ask levels.
    pub fn ask_liquidity(&self, depth: usize) -> Decimal {
        self.asks.iter().take(depth).map(|l| l.size).sum()
    }
}

/// How a single price level changed between snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// Level appeared.
    Added,
    /// Level disappeared.
    Removed,
    /// Level size changed.
    Resized,
}

/// One level change in a [`DeltaEvent`].
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LevelChange {
    /// Side the level sits on.
    pub side: BookSide,
    /// Price of the level.
    pub price: Decimal,
    /// Size before the change, absent for added levels.
    pub old_size: Option<Decimal>,
    /// Size after the change, absent for removed levels.
    pub new_size: Option<Decimal>,
}

impl LevelChange {
    /// Classify this change.
    pub fn kind(&self) -> ChangeKind {
        match (self.old_size, self.new_size) {
            (None, Some(_)) => ChangeKind::Added,
            (Some(_), None) => ChangeKind::Removed,
            _ => ChangeKind::Resized,
        }
    }

    /// Whether this change looks like a fresh resting order of at least
    /// `min_size` shares: a new level, or a level that grew past the
    /// threshold.
    pub fn is_qualifying(&self, min_size: Decimal) -> bool {
        match (self.old_size, self.new_size) {
            (None, Some(new)) => new >= min_size,
            (Some(old), Some(new)) => new > old && new >= min_size,
            _ => false,
        }
    }
}

/// Difference between two consecutive snapshots of one market.
///
/// Derived and transient; consumed by the strategy loop, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct DeltaEvent {
    /// Token ID the delta is for.
    pub token_id: String,
    /// Sequence number of the newer snapshot.
    pub seq: u64,
    /// Level changes versus the prior snapshot.
    pub changes: SmallVec<[LevelChange; 8]>,
}

impl DeltaEvent {
    /// First change that qualifies as a large counter-order, if any.
    pub fn qualifying_counter_order(&self, min_size: Decimal) -> Option<&LevelChange> {
        self.changes.iter().find(|c| c.is_qualifying(min_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn update(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> BookUpdate {
        BookUpdate {
            token_id: "token".to_string(),
            bids: bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            asks: asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
            timestamp_ms: None,
        }
    }

    #[test]
    fn snapshot_sorts_and_drops_empty_levels() {
        let snapshot = BookSnapshot::from_update(
            update(
                vec![(dec!(0.40), dec!(10)), (dec!(0.45), dec!(5)), (dec!(0.42), dec!(0))],
                vec![(dec!(0.60), dec!(10)), (dec!(0.55), dec!(5))],
            ),
            1,
        );

        assert_eq!(snapshot.best_bid(), Some(dec!(0.45)));
        assert_eq!(snapshot.best_ask(), Some(dec!(0.55)));
        assert_eq!(snapshot.bids.len(), 2); // zero-size bid dropped
        assert_eq!(snapshot.spread(), Some(dec!(0.10)));
        assert_eq!(snapshot.mid_price(), Some(dec!(0.50)));
    }

    #[test]
    fn snapshot_detects_inverted_book() {
        let inverted = BookSnapshot::from_update(
            update(vec![(dec!(0.52), dec!(10))], vec![(dec!(0.50), dec!(10))]),
            1,
        );
        assert!(inverted.is_inverted());

        let normal = BookSnapshot::from_update(
            update(vec![(dec!(0.48), dec!(10))], vec![(dec!(0.50), dec!(10))]),
            1,
        );
        assert!(!normal.is_inverted());
    }

    #[test]
    fn liquidity_sums_top_levels() {
        let snapshot = BookSnapshot::from_update(
            update(
                vec![(dec!(0.45), dec!(5)), (dec!(0.44), dec!(10)), (dec!(0.43), dec!(20))],
                vec![(dec!(0.55), dec!(5))],
            ),
            1,
        );

        assert_eq!(snapshot.bid_liquidity(2), dec!(15));
        assert_eq!(snapshot.bid_liquidity(5), dec!(35));
        assert_eq!(snapshot.ask_liquidity(5), dec!(5));
    }

    #[test]
    fn level_change_classification() {
        let added = LevelChange {
            side: BookSide::Bid,
            price: dec!(0.50),
            old_size: None,
            new_size: Some(dec!(60)),
        };
        assert_eq!(added.kind(), ChangeKind::Added);
        assert!(added.is_qualifying(dec!(50)));
        assert!(!added.is_qualifying(dec!(100)));

        let removed = LevelChange {
            side: BookSide::Ask,
            price: dec!(0.50),
            old_size: Some(dec!(60)),
            new_size: None,
        };
        assert_eq!(removed.kind(), ChangeKind::Removed);
        assert!(!removed.is_qualifying(dec!(50)));

        let grew = LevelChange {
            side: BookSide::Ask,
            price: dec!(0.50),
            old_size: Some(dec!(10)),
            new_size: Some(dec!(55)),
        };
        assert_eq!(grew.kind(), ChangeKind::Resized);
        assert!(grew.is_qualifying(dec!(50)));

        let shrank = LevelChange {
            side: BookSide::Ask,
            price: dec!(0.50),
            old_size: Some(dec!(80)),
            new_size: Some(dec!(55)),
        };
        assert!(!shrank.is_qualifying(dec!(50)));
    }

    #[test]
    fn delta_event_finds_qualifying_change() {
        let delta = DeltaEvent {
            token_id: "token".to_string(),
            seq: 2,
            changes: smallvec::smallvec![
                LevelChange {
                    side: BookSide::Bid,
                    price: dec!(0.50),
                    old_size: None,
                    new_size: Some(dec!(10)),
                },
                LevelChange {
                    side: BookSide::Bid,
                    price: dec!(0.49),
                    old_size: None,
                    new_size: Some(dec!(60)),
                },
            ],
        };

        let hit = delta.qualifying_counter_order(dec!(50)).unwrap();
        assert_eq!(hit.price, dec!(0.49));
        assert!(delta.qualifying_counter_order(dec!(100)).is_none());
    }
}
