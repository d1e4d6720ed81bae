//! Market data feed: push-feed lifecycle with REST polling fallback.
//!
//! The [`ConnectionManager`] owns the connection state machine. It prefers
//! the WebSocket push feed and falls back to fixed-interval REST polling
//! when connecting keeps failing or the feed stalls. Consumers receive the
//! same [`BookUpdate`] stream either way; only the latency regime differs
//! (push is tens of milliseconds, polling is hundreds).

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::WsError;
use crate::market::ClobExchange;
use crate::metrics;
use crate::orderbook::BookUpdate;

pub mod poller;
pub mod websocket;

/// Connection state owned by the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No feed active.
    Disconnected,
    /// Push connection attempt in flight.
    Connecting,
    /// Push feed delivering updates.
    Connected,
    /// Push feed unavailable; snapshots come from REST polling.
    Degraded,
}

/// Feed tuning derived from [`Config`].
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Use the push feed at all.
    pub use_wss: bool,
    /// WebSocket base URL.
    pub ws_url: String,
    /// Polling interval while degraded.
    pub poll_interval: Duration,
    /// Concurrent book fetches per poll cycle.
    pub poll_concurrency: usize,
    /// Heartbeat interval; the feed is stalled after twice this.
    pub heartbeat_interval: Duration,
    /// Consecutive connect failures before failing over to polling.
    pub max_connect_attempts: u32,
    /// Initial reconnect backoff.
    pub backoff_initial: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
    /// Backoff multiplier per attempt.
    pub backoff_multiplier: f64,
    /// How often to probe the push feed while degraded.
    pub reconnect_probe_interval: Duration,
}

impl FeedConfig {
    /// Build from application config.
    pub fn from_config(config: &Config) -> Self {
        Self {
            use_wss: config.use_wss,
            ws_url: config.polymarket_ws_url.clone(),
            poll_interval: config.polling_interval(),
            poll_concurrency: config.scan_concurrency,
            heartbeat_interval: Duration::from_secs(config.ws_heartbeat_interval_s),
            max_connect_attempts: config.ws_max_connect_attempts,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(config.ws_reconnect_max_delay_s),
            backoff_multiplier: 2.0,
            reconnect_probe_interval: Duration::from_secs(config.ws_reconnect_max_delay_s),
        }
    }

    /// Exponential backoff delay with deterministic jitter.
    ///
    /// Jitter alternates above and below the capped delay by attempt parity
    /// so reconnect storms from multiple instances spread out without
    /// needing a random source.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_initial.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.backoff_max.as_secs_f64());

        let jitter_mult = if attempt % 2 == 0 { 1.1 } else { 0.9 };
        Duration::from_secs_f64((capped * jitter_mult).max(0.1))
    }
}

/// Owns the push-feed lifecycle and the polling fallback.
pub struct ConnectionManager {
    config: FeedConfig,
    exchange: Arc<dyn ClobExchange>,
    tracked: RwLock<BTreeSet<String>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionManager {
    /// Create a manager in the disconnected state.
    pub fn new(config: FeedConfig, exchange: Arc<dyn ClobExchange>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            exchange,
            tracked: RwLock::new(BTreeSet::new()),
            state_tx,
        }
    }

    /// Subscribe to connection state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Current connection state.
    pub fn current_state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Track a market. Takes effect on the next (re)subscribe or poll cycle.
    pub fn track(&self, token_id: &str) {
        self.tracked
            .write()
            .expect("tracked lock poisoned")
            .insert(token_id.to_string());
    }

    /// Stop tracking a market.
    pub fn untrack(&self, token_id: &str) {
        self.tracked
            .write()
            .expect("tracked lock poisoned")
            .remove(token_id);
    }

    /// The set of markets currently tracked.
    pub fn tracked(&self) -> Vec<String> {
        self.tracked
            .read()
            .expect("tracked lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Start the feed. Returns the receiver for book updates; the supervisor
    /// task runs until the receiver is dropped.
    pub fn spawn(self: Arc<Self>, buffer: usize) -> mpsc::Receiver<BookUpdate> {
        let (tx, rx) = mpsc::channel(buffer);
        tokio::spawn(async move {
            self.supervise(tx).await;
        });
        rx
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() != state {
            info!(state = %state, "Connection state");
            self.state_tx.send_replace(state);
        }
    }

    async fn supervise(self: Arc<Self>, tx: mpsc::Sender<BookUpdate>) {
        if !self.config.use_wss {
            // Polling is the primary mode; the push regime is never entered.
            self.set_state(ConnectionState::Degraded);
            self.poll_forever(&tx).await;
            return;
        }

        let mut attempts: u32 = 0;

        loop {
            if tx.is_closed() {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            self.set_state(ConnectionState::Connecting);

            let assets = self.tracked();
            let session = websocket::run_session(
                &self.config,
                assets,
                &tx,
                &self.state_tx,
            )
            .await;

            match session {
                Ok(end) => {
                    // The session connected and ran for a while. Connect
                    // failures start counting from zero again.
                    attempts = 0;
                    self.set_state(ConnectionState::Disconnected);
                    warn!(end = ?end, "Push session ended, reconnecting");
                    metrics::inc_ws_reconnects();
                    tokio::time::sleep(self.config.backoff_initial).await;
                }
                Err(e) => {
                    attempts += 1;
                    self.set_state(ConnectionState::Disconnected);
                    warn!(error = %e, attempt = attempts, "Push connect failed");
                    metrics::inc_ws_reconnects();

                    if attempts >= self.config.max_connect_attempts {
                        self.set_state(ConnectionState::Degraded);
                        self.poll_until_push_recovers(&tx).await;
                        attempts = 0;
                    } else {
                        tokio::time::sleep(self.config.backoff_delay(attempts)).await;
                    }
                }
            }
        }
    }

    /// Poll tracked markets forever. Used when push is disabled by config.
    async fn poll_forever(&self, tx: &mpsc::Sender<BookUpdate>) {
        loop {
            if tx.is_closed() {
                return;
            }
            poller::poll_cycle(&*self.exchange, &self.tracked(), tx, self.config.poll_concurrency)
                .await;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Poll tracked markets while periodically probing the push feed.
    /// Returns once a probe succeeds so the supervisor can run a full
    /// session again.
    async fn poll_until_push_recovers(&self, tx: &mpsc::Sender<BookUpdate>) {
        let mut last_probe = Instant::now();

        loop {
            if tx.is_closed() {
                return;
            }

            poller::poll_cycle(&*self.exchange, &self.tracked(), tx, self.config.poll_concurrency)
                .await;

            if last_probe.elapsed() >= self.config.reconnect_probe_interval {
                last_probe = Instant::now();
                match websocket::probe(&self.config).await {
                    Ok(()) => {
                        info!("Push feed reachable again, leaving degraded mode");
                        return;
                    }
                    Err(e) => {
                        warn!(error = %e, "Push probe failed, staying degraded");
                    }
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

/// How a push session ended after connecting successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Server closed the connection or the stream ended.
    Closed,
    /// No message within the staleness deadline.
    Stalled,
}

/// Convenience alias for session results.
pub type SessionResult = Result<SessionEnd, WsError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_config() -> FeedConfig {
        FeedConfig {
            use_wss: true,
            ws_url: "ws://127.0.0.1:1".to_string(),
            poll_interval: Duration::from_millis(20),
            poll_concurrency: 4,
            heartbeat_interval: Duration::from_secs(30),
            max_connect_attempts: 3,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            reconnect_probe_interval: Duration::from_secs(60),
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = feed_config();

        let d1 = config.backoff_delay(1);
        let d3 = config.backoff_delay(3);
        let d10 = config.backoff_delay(10);

        assert!(d1 < d3);
        // 2^9 seconds uncapped would be 512s; the ceiling plus jitter keeps
        // it near 30s.
        assert!(d10 <= Duration::from_secs(33));
        assert!(d10 >= Duration::from_secs(27));
    }

    #[test]
    fn backoff_jitter_alternates() {
        let config = feed_config();
        // Both attempts cap at 30s; parity decides which side of it.
        let even = config.backoff_delay(10);
        let odd = config.backoff_delay(11);
        assert!(even > odd);
    }

    #[test]
    fn tracked_set_is_sorted_and_deduplicated() {
        let manager = ConnectionManager::new(
            feed_config(),
            Arc::new(crate::market::MockExchange::new()),
        );

        manager.track("b");
        manager.track("a");
        manager.track("b");

        assert_eq!(manager.tracked(), vec!["a".to_string(), "b".to_string()]);

        manager.untrack("a");
        assert_eq!(manager.tracked(), vec!["b".to_string()]);
    }

    #[test]
    fn initial_state_is_disconnected() {
        let manager = ConnectionManager::new(
            feed_config(),
            Arc::new(crate::market::MockExchange::new()),
        );
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }
}
