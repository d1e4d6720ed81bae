//! The detection-and-reaction loop.
//!
//! One cycle: scan markets for an exploitable spread, place a micro bait
//! order, watch the delta stream for a large counter-order inside the
//! reaction window, cancel the bait, and frontrun the reaction if one
//! appeared. The risk manager gates every order and records every outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::events::{BotEvent, ControlSignal, EventBus};
use crate::feed::ConnectionManager;
use crate::market::{ClobExchange, MarketInfo};
use crate::metrics;
use crate::orderbook::{BookUpdate, MarketCache};
use crate::risk::{Decision, DenyReason, RiskManager};
use crate::trading::order::{IntentState, Side, TradeIntent};
use crate::trading::OrderExecutor;

use super::pricing;
use super::state::{CounterOrder, MarketPhase};

/// Wait between cycles when no market clears the spread threshold.
const COOLDOWN_NO_MARKET: Duration = Duration::from_secs(5);

/// Wait after a completed cycle before scanning again.
const COOLDOWN_AFTER_TRADE: Duration = Duration::from_secs(2);

/// Wait while the breaker is tripped before rechecking.
const BREAKER_BACKOFF: Duration = Duration::from_secs(30);

/// Outcome of one market cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    /// Market already mid-cycle.
    Busy,
    /// Risk manager denied the bait.
    BaitDenied(DenyReason),
    /// Bait order could not be placed.
    BaitFailed(String),
    /// Window elapsed with no qualifying counter-order.
    BaitTimedOut,
    /// Risk manager denied the frontrun.
    FrontrunDenied(DenyReason),
    /// Counter-order seen but no tradeable size at our cap.
    FrontrunSkipped(String),
    /// Frontrun handed to the executor; terminal state attached.
    FrontrunDone(IntentState),
}

/// Running totals for the status endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    /// Scan cycles completed.
    pub cycles: u64,
    /// Bait orders placed.
    pub baits_placed: u64,
    /// Qualifying counter-orders detected.
    pub counters_detected: u64,
    /// Frontrun orders attempted.
    pub frontruns_attempted: u64,
    /// Frontrun orders filled.
    pub frontruns_filled: u64,
}

/// The strategy loop.
pub struct FrontrunEngine {
    exchange: Arc<dyn ClobExchange>,
    cache: Arc<MarketCache>,
    risk: Arc<RiskManager>,
    executor: Arc<OrderExecutor>,
    feed: Arc<ConnectionManager>,
    bus: EventBus,
    config: Config,
    phases: DashMap<String, MarketPhase>,
    market_names: DashMap<String, String>,
    stats: Mutex<EngineStats>,
    paused: AtomicBool,
}

impl FrontrunEngine {
    /// Wire up the engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        exchange: Arc<dyn ClobExchange>,
        cache: Arc<MarketCache>,
        risk: Arc<RiskManager>,
        executor: Arc<OrderExecutor>,
        feed: Arc<ConnectionManager>,
        bus: EventBus,
        config: Config,
    ) -> Self {
        Self {
            exchange,
            cache,
            risk,
            executor,
            feed,
            bus,
            config,
            phases: DashMap::new(),
            market_names: DashMap::new(),
            stats: Mutex::new(EngineStats::default()),
            paused: AtomicBool::new(false),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> EngineStats {
        *self.stats.lock().expect("stats lock poisoned")
    }

    /// The event bus this engine publishes on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Current phase of a market.
    pub fn phase(&self, token_id: &str) -> MarketPhase {
        self.phases
            .get(token_id)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn set_phase(&self, token_id: &str, phase: MarketPhase) {
        debug!(token_id = %token_id, phase = phase.label(), "Market phase");
        self.phases.insert(token_id.to_string(), phase);
    }

    /// Feed one raw book update through the cache and publish the resulting
    /// delta. This is the single write path into the cache for feed data.
    pub fn ingest(&self, update: BookUpdate) {
        if let Some(delta) = self.cache.upsert(update) {
            metrics::inc_deltas_computed();
            self.bus.publish(BotEvent::Delta(delta));
        }
    }

    /// Consume feed updates until the channel closes.
    pub async fn run_ingest(self: Arc<Self>, mut rx: mpsc::Receiver<BookUpdate>) {
        while let Some(update) = rx.recv().await {
            self.ingest(update);
        }
        debug!("Feed channel closed, ingest task exiting");
    }

    /// Scan markets and return those whose spread clears the threshold.
    ///
    /// Fresh cache entries are summarized directly; stale or missing books
    /// are fetched concurrently, bounded by the configured fan-out.
    pub async fn scan(&self) -> Vec<MarketInfo> {
        let started = Instant::now();

        let stubs = match self.exchange.list_markets().await {
            Ok(stubs) => stubs,
            Err(e) => {
                warn!(error = %e, "Market listing failed");
                return Vec::new();
            }
        };

        let ttl = time::Duration::seconds(self.config.scan_cache_ttl_s as i64);
        let mut profitable = Vec::new();
        let mut to_fetch = Vec::new();

        for stub in stubs {
            if !stub.active {
                continue;
            }
            let Some(token_id) = stub.token_id() else { continue };

            self.market_names
                .insert(token_id.to_string(), stub.name().to_string());

            match self.cache.peek(token_id) {
                Some(snapshot) if OffsetDateTime::now_utc() - snapshot.received_at < ttl => {
                    if let Some(info) = MarketInfo::from_snapshot(stub.name(), &snapshot) {
                        if info.is_profitable(self.config.spread_threshold) {
                            profitable.push(info);
                        }
                    }
                }
                _ => to_fetch.push(token_id.to_string()),
            }
        }

        let fetched: Vec<Option<MarketInfo>> = stream::iter(to_fetch)
            .map(|token_id| async move {
                match self.exchange.fetch_book(&token_id).await {
                    Ok(update) => {
                        self.ingest(update);
                        let snapshot = self.cache.peek(&token_id)?;
                        let name = self
                            .market_names
                            .get(&token_id)
                            .map(|n| n.clone())
                            .unwrap_or_else(|| "Unknown".to_string());
                        MarketInfo::from_snapshot(&name, &snapshot)
                    }
                    Err(e) => {
                        debug!(token_id = %token_id, error = %e, "Book fetch failed during scan");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.scan_concurrency.max(1))
            .collect()
            .await;

        for info in fetched.into_iter().flatten() {
            if info.is_profitable(self.config.spread_threshold) {
                info!(market = %info.name, spread = %info.spread, "Profitable spread");
                profitable.push(info);
            }
        }

        metrics::record_scan_latency(started);
        profitable
    }

    /// Pick the best target: widest spread, deepest book as tiebreaker.
    pub fn select_target(mut markets: Vec<MarketInfo>) -> Option<MarketInfo> {
        markets.sort_by(|a, b| {
            (b.spread, b.total_liquidity()).cmp(&(a.spread, a.total_liquidity()))
        });
        markets.into_iter().next()
    }

    /// Run one full bait/detect/frontrun cycle against a market.
    #[instrument(skip(self, market), fields(token_id = %market.token_id, spread = %market.spread))]
    pub async fn run_market(&self, market: &MarketInfo) -> CycleOutcome {
        if !self.phase(&market.token_id).is_idle() {
            return CycleOutcome::Busy;
        }

        let offsets = pricing::offsets(
            market.spread,
            self.config.bait_offset_cap,
            self.config.frontrun_offset_cap,
        );

        // The bait buys just under mid, tightening the spread enough to look
        // like fresh interest without crossing.
        let bait = TradeIntent::bait(
            market.token_id.clone(),
            Side::Buy,
            pricing::bait_price(market.mid_price(), Side::Buy, offsets.bait),
            self.config.micro_order_size,
        );

        if let Decision::Denied(reason) = self.risk.authorize(&bait) {
            debug!(reason = %reason, "Bait denied");
            return CycleOutcome::BaitDenied(reason);
        }

        // Subscribe before the bait goes out so no reaction can slip between
        // placement and the first poll of the delta stream.
        let mut deltas = self.bus.subscribe();

        self.feed.track(&market.token_id);
        self.cache.pin(&market.token_id);

        let order_id = match self.executor.place_resting(&bait).await {
            Ok(id) => id,
            Err(e) => {
                self.cache.unpin(&market.token_id);
                self.feed.untrack(&market.token_id);
                self.risk.record_outcome(
                    &bait,
                    &IntentState::Rejected { reason: e.to_string() },
                    Decimal::ZERO,
                );
                warn!(error = %e, "Bait placement failed");
                return CycleOutcome::BaitFailed(e.to_string());
            }
        };

        match self
            .phase(&market.token_id)
            .place_bait(bait.client_order_id.clone(), order_id.clone())
        {
            Ok(phase) => self.set_phase(&market.token_id, phase),
            Err(e) => warn!(error = %e, "Phase update rejected"),
        }

        metrics::inc_baits_placed();
        self.stats.lock().expect("stats lock poisoned").baits_placed += 1;
        info!(price = %bait.price, size = %bait.size, order_id = %order_id, "Bait placed");

        let placed_at = Instant::now();
        let counter = self
            .watch_for_counter(&market.token_id, &mut deltas, placed_at)
            .await;

        // Cancel the bait whatever happened. Best effort: the window is over
        // and a leftover decoy is harmless.
        self.executor.finish_bait(&bait, &order_id).await;
        self.cache.unpin(&market.token_id);

        let outcome = match counter {
            None => {
                match self.phase(&market.token_id).time_out_bait() {
                    Ok(phase) => self.set_phase(&market.token_id, phase),
                    Err(e) => warn!(error = %e, "Phase update rejected"),
                }
                debug!("No qualifying counter-order inside the window");
                CycleOutcome::BaitTimedOut
            }
            Some(counter) => {
                metrics::record_detection_latency(placed_at);
                metrics::inc_counter_orders_detected();
                self.stats.lock().expect("stats lock poisoned").counters_detected += 1;

                match self.phase(&market.token_id).detect_counter(counter) {
                    Ok(phase) => self.set_phase(&market.token_id, phase),
                    Err(e) => warn!(error = %e, "Phase update rejected"),
                }

                info!(
                    side = %counter.side,
                    price = %counter.price,
                    size = %counter.size,
                    "Counter-order detected"
                );

                self.execute_frontrun(market, counter, offsets.frontrun).await
            }
        };

        self.set_phase(&market.token_id, self.phase(&market.token_id).reset());
        self.feed.untrack(&market.token_id);
        self.bus.publish(BotEvent::Risk(self.risk.snapshot()));

        outcome
    }

    /// Watch the delta stream for a qualifying counter-order until the
    /// reaction window closes. An event arriving exactly at the window edge
    /// still counts; the deadline is inclusive.
    async fn watch_for_counter(
        &self,
        token_id: &str,
        deltas: &mut tokio::sync::broadcast::Receiver<BotEvent>,
        placed_at: Instant,
    ) -> Option<CounterOrder> {
        let deadline = placed_at + self.config.reaction_window();
        let min_size = self.config.min_counter_order_size;

        loop {
            let event = match tokio::time::timeout_at(deadline.into(), deltas.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(_)) => return None, // bus closed or we lagged past the window
                Err(_) => {
                    // Deadline hit. Drain anything already queued: those
                    // events arrived at or before the edge.
                    loop {
                        match deltas.try_recv() {
                            Ok(event) => {
                                if let Some(counter) = Self::match_counter(&event, token_id, min_size)
                                {
                                    return Some(counter);
                                }
                            }
                            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
                            Err(TryRecvError::Lagged(_)) => continue,
                        }
                    }
                }
            };

            if let Some(counter) = Self::match_counter(&event, token_id, min_size) {
                return Some(counter);
            }
        }
    }

    fn match_counter(event: &BotEvent, token_id: &str, min_size: Decimal) -> Option<CounterOrder> {
        let BotEvent::Delta(delta) = event else { return None };
        if delta.token_id != token_id {
            return None;
        }

        let change = delta.qualifying_counter_order(min_size)?;
        Some(CounterOrder {
            side: change.side,
            price: change.price,
            size: change.new_size.unwrap_or_default(),
            detected_at: OffsetDateTime::now_utc(),
        })
    }

    /// Price and submit the frontrun order against a detected counter-order.
    async fn execute_frontrun(
        &self,
        market: &MarketInfo,
        counter: CounterOrder,
        frontrun_offset: Decimal,
    ) -> CycleOutcome {
        let side = pricing::frontrun_side(counter.side);
        let price = pricing::frontrun_price(counter.price, counter.side, frontrun_offset);

        // Ride the counter-order's size, capped by the per-trade budget.
        let budget_shares = (self.config.max_trade_amount() / price).floor();
        let size = counter.size.min(budget_shares);

        if size < Decimal::ONE {
            debug!(budget_shares = %budget_shares, "No tradeable size within the per-trade cap");
            return CycleOutcome::FrontrunSkipped("size below one share".to_string());
        }

        let intent = TradeIntent::frontrun(market.token_id.clone(), side, price, size);

        if let Decision::Denied(reason) = self.risk.authorize(&intent) {
            debug!(reason = %reason, "Frontrun denied");
            return CycleOutcome::FrontrunDenied(reason);
        }

        match self.phase(&market.token_id).attempt_frontrun() {
            Ok(phase) => self.set_phase(&market.token_id, phase),
            Err(e) => warn!(error = %e, "Phase update rejected"),
        }

        metrics::inc_frontruns_attempted();
        self.stats.lock().expect("stats lock poisoned").frontruns_attempted += 1;

        // The edge we expect to capture is the offset on every share.
        let estimated_pnl = frontrun_offset * size;

        info!(
            side = %side,
            price = %price,
            size = %size,
            estimated_pnl = %estimated_pnl,
            "Executing frontrun"
        );

        let state = self.executor.submit(&intent, estimated_pnl).await;

        if state.is_filled() {
            self.stats.lock().expect("stats lock poisoned").frontruns_filled += 1;
        }

        CycleOutcome::FrontrunDone(state)
    }

    /// Main loop: scan, target, cycle, repeat. Errors on one market never
    /// stop the loop; the next iteration scans fresh.
    pub async fn run(self: Arc<Self>, mut control: mpsc::Receiver<ControlSignal>) {
        info!("Strategy loop started");

        loop {
            // Apply any pending control signals first.
            loop {
                match control.try_recv() {
                    Ok(ControlSignal::Pause) => {
                        info!("Paused");
                        self.paused.store(true, Ordering::SeqCst);
                    }
                    Ok(ControlSignal::Resume) => {
                        info!("Resumed");
                        self.paused.store(false, Ordering::SeqCst);
                    }
                    Ok(ControlSignal::EmergencyStop) => {
                        warn!("Emergency stop received");
                        self.risk.trip("emergency stop");
                        self.bus.publish(BotEvent::Risk(self.risk.snapshot()));
                    }
                    Ok(ControlSignal::Stop) => {
                        info!("Strategy loop stopping");
                        return;
                    }
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        info!("Control channel closed, strategy loop stopping");
                        return;
                    }
                }
            }

            if self.paused.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }

            if !self.risk.can_trade() {
                warn!("Trading halted by circuit breaker");
                self.bus.publish(BotEvent::Risk(self.risk.snapshot()));
                tokio::time::sleep(BREAKER_BACKOFF).await;
                continue;
            }

            self.stats.lock().expect("stats lock poisoned").cycles += 1;

            let markets = self.scan().await;
            match Self::select_target(markets) {
                None => {
                    debug!("No profitable markets");
                    tokio::time::sleep(COOLDOWN_NO_MARKET).await;
                }
                Some(target) => {
                    info!(market = %target.name, spread = %target.spread, "Target selected");
                    let outcome = self.run_market(&target).await;
                    debug!(outcome = ?outcome, "Cycle complete");
                    tokio::time::sleep(COOLDOWN_AFTER_TRADE).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::MockExchange;
    use crate::orderbook::PriceLevel;
    use crate::trading::ExecutorConfig;
    use rust_decimal_macros::dec;

    fn test_engine() -> Arc<FrontrunEngine> {
        let config = Config::default();
        let exchange = Arc::new(MockExchange::new());
        let bus = EventBus::new(64);
        let cache = Arc::new(MarketCache::new(config.market_cache_capacity));
        let risk = Arc::new(RiskManager::new(&config));
        let executor = Arc::new(OrderExecutor::new(
            exchange.clone(),
            risk.clone(),
            bus.clone(),
            ExecutorConfig::from_config(&config),
        ));
        let feed = Arc::new(ConnectionManager::new(
            crate::feed::FeedConfig::from_config(&config),
            exchange.clone(),
        ));
        Arc::new(FrontrunEngine::new(
            exchange, cache, risk, executor, feed, bus, config,
        ))
    }

    fn book(token_id: &str, extra_bid: Option<(Decimal, Decimal)>) -> BookUpdate {
        let mut bids = vec![PriceLevel::new(dec!(0.40), dec!(30))];
        if let Some((price, size)) = extra_bid {
            bids.push(PriceLevel::new(price, size));
        }
        BookUpdate {
            token_id: token_id.to_string(),
            bids,
            asks: vec![PriceLevel::new(dec!(0.60), dec!(30))],
            timestamp_ms: None,
        }
    }

    fn info(token_id: &str, spread: Decimal, liquidity: Decimal) -> MarketInfo {
        MarketInfo {
            token_id: token_id.to_string(),
            name: token_id.to_string(),
            best_bid: dec!(0.40),
            best_ask: dec!(0.40) + spread,
            spread,
            bid_liquidity: liquidity,
            ask_liquidity: liquidity,
            last_update: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn target_selection_prefers_wider_spread() {
        let markets = vec![
            info("a", dec!(0.12), dec!(10)),
            info("b", dec!(0.20), dec!(10)),
            info("c", dec!(0.15), dec!(10)),
        ];

        let target = FrontrunEngine::select_target(markets).unwrap();
        assert_eq!(target.token_id, "b");
    }

    #[test]
    fn target_selection_breaks_ties_on_liquidity() {
        let markets = vec![
            info("thin", dec!(0.20), dec!(5)),
            info("deep", dec!(0.20), dec!(500)),
        ];

        let target = FrontrunEngine::select_target(markets).unwrap();
        assert_eq!(target.token_id, "deep");
    }

    #[test]
    fn target_selection_handles_empty_scan() {
        assert!(FrontrunEngine::select_target(Vec::new()).is_none());
    }

    #[tokio::test]
    async fn ingest_publishes_deltas_after_the_first_snapshot() {
        let engine = test_engine();
        let mut events = engine.bus().subscribe();

        engine.ingest(book("tok", None));
        engine.ingest(book("tok", Some((dec!(0.46), dec!(60)))));

        let BotEvent::Delta(delta) = events.try_recv().unwrap() else {
            panic!("expected a delta event");
        };
        assert_eq!(delta.token_id, "tok");
        assert!(delta.qualifying_counter_order(dec!(50)).is_some());
    }

    #[tokio::test]
    async fn event_queued_at_the_window_edge_still_qualifies() {
        let engine = test_engine();
        let mut deltas = engine.bus().subscribe();

        engine.ingest(book("tok", None));
        engine.ingest(book("tok", Some((dec!(0.46), dec!(60)))));

        // The window is already over when we start watching: the deadline
        // fires immediately, and the queued delta must still be accepted.
        let placed_at = Instant::now() - engine.config.reaction_window() - Duration::from_millis(50);
        let counter = engine
            .watch_for_counter("tok", &mut deltas, placed_at)
            .await
            .expect("queued event at the edge should qualify");
        assert_eq!(counter.size, dec!(60));
    }

    #[tokio::test]
    async fn sub_threshold_changes_never_qualify() {
        let engine = test_engine();
        let mut deltas = engine.bus().subscribe();

        engine.ingest(book("tok", None));
        engine.ingest(book("tok", Some((dec!(0.46), dec!(10)))));

        let placed_at = Instant::now() - engine.config.reaction_window() - Duration::from_millis(50);
        assert!(engine.watch_for_counter("tok", &mut deltas, placed_at).await.is_none());
    }
}
