//! HTTP API module for health, control, and status endpoints.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;

/// Build an [`AppState`] wired to a mock exchange, for handler tests.
#[cfg(test)]
pub(crate) fn test_state() -> (AppState, tokio::sync::mpsc::Receiver<crate::events::ControlSignal>) {
    use std::sync::Arc;

    use crate::config::Config;
    use crate::events::EventBus;
    use crate::feed::{ConnectionManager, FeedConfig};
    use crate::market::MockExchange;
    use crate::orderbook::MarketCache;
    use crate::risk::RiskManager;
    use crate::strategy::FrontrunEngine;
    use crate::trading::{ExecutorConfig, OrderExecutor};

    let config = Config::default();
    let exchange = Arc::new(MockExchange::new());
    let bus = EventBus::default();
    let cache = Arc::new(MarketCache::new(config.market_cache_capacity));
    let risk = Arc::new(RiskManager::new(&config));
    let executor = Arc::new(OrderExecutor::new(
        exchange.clone(),
        risk.clone(),
        bus.clone(),
        ExecutorConfig::from_config(&config),
    ));
    let feed = Arc::new(ConnectionManager::new(
        FeedConfig::from_config(&config),
        exchange.clone(),
    ));
    let connection = feed.state();
    let engine = Arc::new(FrontrunEngine::new(
        exchange,
        cache,
        risk.clone(),
        executor,
        feed,
        bus,
        config,
    ));

    let (control_tx, control_rx) = tokio::sync::mpsc::channel(8);
    let state = AppState::new(risk, engine, connection, control_tx, None);
    (state, control_rx)
}
