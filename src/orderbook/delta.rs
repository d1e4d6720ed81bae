//! Delta detection between consecutive order book snapshots.

use std::collections::HashMap;

use rust_decimal::Decimal;
use smallvec::SmallVec;

use super::types::{BookSide, BookSnapshot, DeltaEvent, LevelChange, PriceLevel};

/// Compute the level changes between two snapshots of the same market.
///
/// Runs in time linear in the total level count: each side is indexed by
/// price into a `HashMap` once, then both level lists are walked once. No
/// pairwise comparison happens.
pub fn diff(old: &BookSnapshot, new: &BookSnapshot) -> DeltaEvent {
    let mut changes: SmallVec<[LevelChange; 8]> = SmallVec::new();

    diff_side(BookSide::Bid, &old.bids, &new.bids, &mut changes);
    diff_side(BookSide::Ask, &old.asks, &new.asks, &mut changes);

    DeltaEvent {
        token_id: new.token_id.clone(),
        seq: new.seq,
        changes,
    }
}

fn diff_side(
    side: BookSide,
    old: &[PriceLevel],
    new: &[PriceLevel],
    changes: &mut SmallVec<[LevelChange; 8]>,
) {
    let old_by_price: HashMap<Decimal, Decimal> =
        old.iter().map(|l| (l.price, l.size)).collect();
    let new_by_price: HashMap<Decimal, Decimal> =
        new.iter().map(|l| (l.price, l.size)).collect();

    for level in new {
        match old_by_price.get(&level.price) {
            None => changes.push(LevelChange {
                side,
                price: level.price,
                old_size: None,
                new_size: Some(level.size),
            }),
            Some(&old_size) if old_size != level.size => changes.push(LevelChange {
                side,
                price: level.price,
                old_size: Some(old_size),
                new_size: Some(level.size),
            }),
            Some(_) => {}
        }
    }

    for level in old {
        if !new_by_price.contains_key(&level.price) {
            changes.push(LevelChange {
                side,
                price: level.price,
                old_size: Some(level.size),
                new_size: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::types::{BookUpdate, ChangeKind};
    use rust_decimal_macros::dec;

    fn snapshot(
        seq: u64,
        bids: Vec<(Decimal, Decimal)>,
        asks: Vec<(Decimal, Decimal)>,
    ) -> BookSnapshot {
        BookSnapshot::from_update(
            BookUpdate {
                token_id: "token".to_string(),
                bids: bids.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
                asks: asks.into_iter().map(|(p, s)| PriceLevel::new(p, s)).collect(),
                timestamp_ms: None,
            },
            seq,
        )
    }

    #[test]
    fn diff_detects_added_level() {
        let old = snapshot(1, vec![(dec!(0.45), dec!(10))], vec![]);
        let new = snapshot(2, vec![(dec!(0.45), dec!(10)), (dec!(0.46), dec!(60))], vec![]);

        let delta = diff(&old, &new);

        assert_eq!(delta.seq, 2);
        assert_eq!(delta.changes.len(), 1);
        assert_eq!(delta.changes[0].kind(), ChangeKind::Added);
        assert_eq!(delta.changes[0].price, dec!(0.46));
        assert_eq!(delta.changes[0].side, BookSide::Bid);
    }

    #[test]
    fn diff_detects_removed_and_resized() {
        let old = snapshot(
            1,
            vec![(dec!(0.45), dec!(10))],
            vec![(dec!(0.55), dec!(20)), (dec!(0.56), dec!(5))],
        );
        let new = snapshot(2, vec![(dec!(0.45), dec!(10))], vec![(dec!(0.55), dec!(70))]);

        let delta = diff(&old, &new);

        assert_eq!(delta.changes.len(), 2);
        let resized = delta.changes.iter().find(|c| c.price == dec!(0.55)).unwrap();
        assert_eq!(resized.kind(), ChangeKind::Resized);
        assert_eq!(resized.old_size, Some(dec!(20)));
        assert_eq!(resized.new_size, Some(dec!(70)));

        let removed = delta.changes.iter().find(|c| c.price == dec!(0.56)).unwrap();
        assert_eq!(removed.kind(), ChangeKind::Removed);
    }

    #[test]
    fn diff_of_identical_books_is_empty() {
        let old = snapshot(1, vec![(dec!(0.45), dec!(10))], vec![(dec!(0.55), dec!(20))]);
        let new = snapshot(2, vec![(dec!(0.45), dec!(10))], vec![(dec!(0.55), dec!(20))]);

        assert!(diff(&old, &new).changes.is_empty());
    }

    #[test]
    fn diff_qualifying_counter_order() {
        let old = snapshot(1, vec![(dec!(0.45), dec!(10))], vec![]);
        let new = snapshot(2, vec![(dec!(0.45), dec!(10)), (dec!(0.44), dec!(60))], vec![]);

        let delta = diff(&old, &new);
        let counter = delta.qualifying_counter_order(dec!(50)).unwrap();
        assert_eq!(counter.new_size, Some(dec!(60)));
    }

    #[test]
    fn diff_scales_to_large_books() {
        // 1000 levels per side; a quadratic implementation would need on the
        // order of 10^6 comparisons per side and show up instantly in test
        // time. The hash-indexed walk touches each level a constant number
        // of times.
        let mut old_bids = Vec::with_capacity(1000);
        let mut new_bids = Vec::with_capacity(1001);
        for i in 0..1000u32 {
            let price = Decimal::new(i as i64 + 1, 5);
            old_bids.push((price, dec!(10)));
            new_bids.push((price, dec!(10)));
        }
        // One added level buried in the middle of the book.
        new_bids.push((Decimal::new(2_000_000, 5), dec!(75)));

        let old = snapshot(1, old_bids, vec![]);
        let new = snapshot(2, new_bids, vec![]);

        let delta = diff(&old, &new);
        assert_eq!(delta.changes.len(), 1);
        assert!(delta.qualifying_counter_order(dec!(50)).is_some());
    }
}
