//! Trading module for order management and execution.
//!
//! This module handles:
//! - Trade intents and order wire types
//! - Order submission with bounded timeout and retry

pub mod executor;
pub mod order;

pub use executor::{ExecutorConfig, ExecutorStats, OrderExecutor};
pub use order::{IntentRole, IntentState, OrderRequest, OrderStatus, Side, TradeIntent};
