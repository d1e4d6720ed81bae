//! Offset pricing derived from the live spread.
//!
//! Pure functions only: the same spread always yields the same offsets.

use rust_decimal::Decimal;

use crate::orderbook::BookSide;
use crate::trading::order::Side;

/// Fraction of the spread used for the bait offset.
const BAIT_SPREAD_FRACTION: Decimal = Decimal::from_parts(25, 0, 0, false, 2); // 0.25

/// Fraction of the spread used for the frontrun offset.
const FRONTRUN_SPREAD_FRACTION: Decimal = Decimal::from_parts(10, 0, 0, false, 2); // 0.10

/// Lowest price the exchange accepts.
const MIN_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// Highest price the exchange accepts.
const MAX_PRICE: Decimal = Decimal::from_parts(999, 0, 0, false, 3); // 0.999

/// Price offsets for one market, derived from its spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceOffsets {
    /// Distance from mid for the bait order.
    pub bait: Decimal,
    /// Price improvement over the counter-order for the frontrun.
    pub frontrun: Decimal,
}

/// Compute offsets from the current spread.
///
/// bait = min(25% of spread, `bait_cap`);
/// frontrun = min(10% of spread, `frontrun_cap`).
/// Both are non-negative and non-decreasing in the spread below their caps.
pub fn offsets(spread: Decimal, bait_cap: Decimal, frontrun_cap: Decimal) -> PriceOffsets {
    let spread = spread.max(Decimal::ZERO);

    PriceOffsets {
        bait: (spread * BAIT_SPREAD_FRACTION).min(bait_cap),
        frontrun: (spread * FRONTRUN_SPREAD_FRACTION).min(frontrun_cap),
    }
}

/// Bait price: just below mid for a buy, just above for a sell, so the
/// decoy tightens the spread without crossing it.
pub fn bait_price(mid: Decimal, side: Side, offset: Decimal) -> Decimal {
    let price = match side {
        Side::Buy => mid - offset,
        Side::Sell => mid + offset,
    };
    clamp_price(price)
}

/// Frontrun price: step ahead of the detected counter-order. A large bid
/// means incoming buying, so we buy just below it; a large ask means
/// incoming selling, so we sell just above it.
pub fn frontrun_price(counter_price: Decimal, counter_side: BookSide, offset: Decimal) -> Decimal {
    let price = match counter_side {
        BookSide::Bid => counter_price - offset,
        BookSide::Ask => counter_price + offset,
    };
    clamp_price(price)
}

/// Which side we take against a counter-order.
pub fn frontrun_side(counter_side: BookSide) -> Side {
    match counter_side {
        BookSide::Bid => Side::Buy,
        BookSide::Ask => Side::Sell,
    }
}

/// Clamp to the exchange's valid price range.
pub fn clamp_price(price: Decimal) -> Decimal {
    price.clamp(MIN_PRICE, MAX_PRICE)
}
