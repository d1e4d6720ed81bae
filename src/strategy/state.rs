//! Per-market lifecycle for the bait/frontrun sequence.
//!
//! Each market carries an explicit tagged phase instead of ad hoc flags, so
//! an illegal transition is an error value rather than a silent state bug.

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;

use crate::orderbook::BookSide;

/// A qualifying counter-order pulled out of a delta.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CounterOrder {
    /// Side the counter-order rests on.
    pub side: BookSide,
    /// Its price level.
    pub price: Decimal,
    /// Its size.
    pub size: Decimal,
    /// When it was detected.
    pub detected_at: OffsetDateTime,
}

/// Lifecycle phase of one market.
#[derive(Debug, Clone, Serialize, Default)]
pub enum MarketPhase {
    /// Nothing in flight.
    #[default]
    Idle,
    /// Bait order resting, watching for a reaction.
    BaitPlaced {
        /// Idempotency id of the bait intent.
        intent_id: String,
        /// Exchange order id of the bait.
        order_id: String,
        /// When the bait was placed.
        placed_at: OffsetDateTime,
    },
    /// Qualifying counter-order seen inside the window.
    CounterOrderDetected {
        /// The detected counter-order.
        counter: CounterOrder,
    },
    /// Window elapsed with no qualifying reaction.
    BaitTimedOut,
    /// Frontrun order handed to the executor.
    FrontrunAttempted,
}

impl MarketPhase {
    /// Whether the market is free for a new cycle.
    pub fn is_idle(&self) -> bool {
        matches!(self, MarketPhase::Idle)
    }

    /// Short label for logs and the status endpoint.
    pub fn label(&self) -> &'static str {
        match self {
            MarketPhase::Idle => "idle",
            MarketPhase::BaitPlaced { .. } => "bait_placed",
            MarketPhase::CounterOrderDetected { .. } => "counter_detected",
            MarketPhase::BaitTimedOut => "bait_timed_out",
            MarketPhase::FrontrunAttempted => "frontrun_attempted",
        }
    }

    /// Idle -> BaitPlaced.
    pub fn place_bait(
        &self,
        intent_id: String,
        order_id: String,
    ) -> Result<MarketPhase, IllegalTransition> {
        match self {
            MarketPhase::Idle => Ok(MarketPhase::BaitPlaced {
                intent_id,
                order_id,
                placed_at: OffsetDateTime::now_utc(),
            }),
            _ => Err(self.illegal("place_bait")),
        }
    }

    /// BaitPlaced -> CounterOrderDetected.
    pub fn detect_counter(&self, counter: CounterOrder) -> Result<MarketPhase, IllegalTransition> {
        match self {
            MarketPhase::BaitPlaced { .. } => {
                Ok(MarketPhase::CounterOrderDetected { counter })
            }
            _ => Err(self.illegal("detect_counter")),
        }
    }

    /// BaitPlaced -> BaitTimedOut.
    pub fn time_out_bait(&self) -> Result<MarketPhase, IllegalTransition> {
        match self {
            MarketPhase::BaitPlaced { .. } => Ok(MarketPhase::BaitTimedOut),
            _ => Err(self.illegal("time_out_bait")),
        }
    }

    /// CounterOrderDetected -> FrontrunAttempted.
    pub fn attempt_frontrun(&self) -> Result<MarketPhase, IllegalTransition> {
        match self {
            MarketPhase::CounterOrderDetected { .. } => Ok(MarketPhase::FrontrunAttempted),
            _ => Err(self.illegal("attempt_frontrun")),
        }
    }

    /// Any terminal phase -> Idle. The cycle always ends here, fill or not.
    pub fn reset(&self) -> MarketPhase {
        MarketPhase::Idle
    }

    fn illegal(&self, attempted: &'static str) -> IllegalTransition {
        IllegalTransition {
            from: self.label(),
            attempted,
        }
    }
}

/// A transition the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    /// Phase the market was in.
    pub from: &'static str,
    /// Transition that was attempted.
    pub attempted: &'static str,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal transition {} from phase {}", self.attempted, self.from)
    }
}
