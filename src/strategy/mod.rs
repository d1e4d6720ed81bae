//! Strategy module: pricing, per-market state, and the detection loop.

pub mod engine;
pub mod pricing;
pub mod state;

pub use engine::{CycleOutcome, EngineStats, FrontrunEngine};
pub use pricing::{offsets, PriceOffsets};
pub use state::{CounterOrder, MarketPhase};
