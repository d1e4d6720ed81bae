//! Order book module for managing market data.
//!
//! This module handles:
//! - Order book types and data structures
//! - Bounded LRU snapshot cache
//! - Delta detection between consecutive snapshots

pub mod cache;
pub mod delta;
pub mod types;

pub use cache::{CacheStats, MarketCache};
pub use delta::diff;
pub use types::{
    BookSide, BookSnapshot, BookUpdate, ChangeKind, DeltaEvent, LevelChange, PriceLevel,
};
