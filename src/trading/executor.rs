//! Order execution with bounded timeout, bounded retry, and idempotent
//! resubmission.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::error::TradingError;
use crate::events::{BotEvent, EventBus, TradeRecord};
use crate::market::ClobExchange;
use crate::metrics;
use crate::risk::RiskManager;

use super::order::{IntentState, OrderRequest, TradeIntent};

/// Backoff between submission retries.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(500),
    Duration::from_millis(1000),
    Duration::from_millis(2000),
];

/// Execution tuning.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Deadline per exchange API call.
    pub call_timeout: Duration,
    /// Max submission attempts for transient failures.
    pub max_retries: u32,
    /// Poll interval while waiting for a terminal order state.
    pub status_poll_interval: Duration,
    /// Simulation mode: no orders reach the exchange.
    pub dry_run: bool,
}

impl ExecutorConfig {
    /// Build from application config.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            call_timeout: config.order_timeout(),
            max_retries: config.order_max_retries,
            status_poll_interval: Duration::from_millis(config.order_poll_interval_ms),
            dry_run: config.dry_run,
        }
    }
}

/// Execution statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorStats {
    /// Orders submitted (including bait).
    pub orders_placed: u64,
    /// Orders that reached a fill.
    pub orders_filled: u64,
    /// Orders cancelled.
    pub orders_cancelled: u64,
    /// Submission retries performed.
    pub orders_retried: u64,
    /// Orders that failed terminally.
    pub orders_failed: u64,
    /// Notional volume of filled orders.
    pub total_volume: Decimal,
}

/// Submits orders to the exchange and reports every outcome to the risk
/// manager, success or failure, so running counters stay consistent.
pub struct OrderExecutor {
    exchange: Arc<dyn ClobExchange>,
    risk: Arc<RiskManager>,
    bus: EventBus,
    config: ExecutorConfig,
    stats: std::sync::Mutex<ExecutorStats>,
}

impl OrderExecutor {
    /// Create an executor.
    pub fn new(
        exchange: Arc<dyn ClobExchange>,
        risk: Arc<RiskManager>,
        bus: EventBus,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            exchange,
            risk,
            bus,
            config,
            stats: std::sync::Mutex::new(ExecutorStats::default()),
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> ExecutorStats {
        *self.stats.lock().expect("stats lock poisoned")
    }

    /// Place a resting order (bait) on the book. Returns the exchange order
    /// id; the terminal outcome is reported later via [`Self::finish_bait`].
    #[instrument(skip(self, intent), fields(token_id = %intent.token_id, role = %intent.role))]
    pub async fn place_resting(&self, intent: &TradeIntent) -> Result<String, TradingError> {
        intent.validate().map_err(TradingError::InvalidParams)?;

        if self.config.dry_run {
            debug!("Dry run, simulating resting order");
            self.stats.lock().expect("stats lock poisoned").orders_placed += 1;
            return Ok(format!("sim-{}", intent.client_order_id));
        }

        let order_id = self.submit_with_retry(intent).await?;
        self.stats.lock().expect("stats lock poisoned").orders_placed += 1;
        info!(order_id = %order_id, price = %intent.price, size = %intent.size, "Resting order placed");
        Ok(order_id)
    }

    /// Cancel a bait order best-effort and record its terminal outcome.
    ///
    /// A failed cancel is logged and swallowed: the order may already be
    /// gone, and the detection window has closed either way.
    pub async fn finish_bait(&self, intent: &TradeIntent, order_id: &str) {
        if !self.config.dry_run {
            match timeout(self.config.call_timeout, self.exchange.cancel_order(order_id)).await {
                Ok(Ok(())) => {
                    self.stats.lock().expect("stats lock poisoned").orders_cancelled += 1;
                    debug!(order_id = %order_id, "Bait order cancelled");
                }
                Ok(Err(e)) => {
                    warn!(order_id = %order_id, error = %e, "Bait cancel failed, leaving order passive");
                }
                Err(_) => {
                    warn!(order_id = %order_id, "Bait cancel timed out, leaving order passive");
                }
            }
        } else {
            self.stats.lock().expect("stats lock poisoned").orders_cancelled += 1;
        }

        self.report(intent, IntentState::Cancelled, Decimal::ZERO);
    }

    /// Submit an order and drive it to a terminal state.
    ///
    /// Transient failures are retried up to the configured limit with the
    /// same client order id, so a retried submission cannot double-fill.
    /// Non-transient rejections surface immediately. Whatever happens, the
    /// outcome is reported to the risk manager before returning.
    #[instrument(skip(self, intent), fields(token_id = %intent.token_id, role = %intent.role))]
    pub async fn submit(&self, intent: &TradeIntent, estimated_pnl: Decimal) -> IntentState {
        let started = Instant::now();

        let state = self.submit_inner(intent).await;

        metrics::record_order_submit_latency(started);

        let pnl = if state.is_filled() { estimated_pnl } else { Decimal::ZERO };

        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.orders_placed += 1;
            match &state {
                IntentState::Filled { .. } => {
                    stats.orders_filled += 1;
                    stats.total_volume += intent.notional();
                }
                IntentState::Cancelled => stats.orders_cancelled += 1,
                IntentState::Rejected { .. } | IntentState::TimedOut => stats.orders_failed += 1,
            }
        }

        self.report(intent, state.clone(), pnl);
        state
    }

    async fn submit_inner(&self, intent: &TradeIntent) -> IntentState {
        if let Err(e) = intent.validate() {
            warn!(error = %e, "Invalid intent");
            return IntentState::Rejected { reason: e };
        }

        if self.config.dry_run {
            debug!("Dry run, simulating fill");
            return IntentState::Filled {
                order_id: format!("sim-{}", intent.client_order_id),
            };
        }

        let order_id = match self.submit_with_retry(intent).await {
            Ok(id) => id,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Submission retries exhausted");
                return IntentState::TimedOut;
            }
            Err(e) => {
                warn!(error = %e, "Order rejected");
                return IntentState::Rejected { reason: e.to_string() };
            }
        };

        self.await_terminal(intent, &order_id).await
    }

    /// Submit with bounded retries, reusing the intent's idempotency key on
    /// every attempt.
    async fn submit_with_retry(&self, intent: &TradeIntent) -> Result<String, TradingError> {
        let request = OrderRequest::for_intent(intent);
        let mut last_error: Option<TradingError> = None;

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let delay = RETRY_DELAYS[(attempt as usize - 1).min(RETRY_DELAYS.len() - 1)];
                warn!(
                    attempt = attempt + 1,
                    max = self.config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying submission"
                );
                metrics::inc_orders_retried();
                sleep(delay).await;
            }

            metrics::inc_orders_submitted();

            let result = timeout(self.config.call_timeout, self.exchange.submit_order(&request))
                .await
                .map_err(|_| TradingError::Timeout {
                    timeout_ms: self.config.call_timeout.as_millis() as u64,
                })
                .and_then(|r| r);

            match result {
                Ok(ack) => {
                    if let Some(order_id) = ack.order_id {
                        return Ok(order_id);
                    }
                    last_error = Some(TradingError::SubmissionFailed(
                        "no order id in response".to_string(),
                    ));
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| TradingError::SubmissionFailed("no attempts made".into())))
    }

    /// Poll order status until terminal or the call timeout elapses.
    async fn await_terminal(&self, _intent: &TradeIntent, order_id: &str) -> IntentState {
        let deadline = Instant::now() + self.config.call_timeout;

        loop {
            if Instant::now() >= deadline {
                warn!(order_id = %order_id, "Order did not reach a terminal state in time");
                return IntentState::TimedOut;
            }

            match timeout(self.config.call_timeout, self.exchange.order_state(order_id)).await {
                Ok(Ok(state)) => {
                    if let Some(status) = state.status {
                        if status.is_filled() {
                            return IntentState::Filled {
                                order_id: order_id.to_string(),
                            };
                        }
                        if status.is_terminal() {
                            return match status {
                                super::order::OrderStatus::Canceled => IntentState::Cancelled,
                                _ => IntentState::Rejected {
                                    reason: format!("terminal status {status}"),
                                },
                            };
                        }
                    }
                }
                Ok(Err(e)) => {
                    warn!(order_id = %order_id, error = %e, "Status poll failed");
                }
                Err(_) => {
                    warn!(order_id = %order_id, "Status poll timed out");
                }
            }

            sleep(self.config.status_poll_interval).await;
        }
    }

    /// Report a terminal outcome to the risk manager and the event bus.
    fn report(&self, intent: &TradeIntent, state: IntentState, pnl: Decimal) {
        self.risk.record_outcome(intent, &state, pnl);

        if !state.is_filled() && !matches!(state, IntentState::Cancelled) {
            metrics::inc_orders_failed();
        }

        self.bus.publish(BotEvent::Trade(TradeRecord {
            intent: intent.clone(),
            state,
            pnl,
            recorded_at: OffsetDateTime::now_utc(),
        }));
    }
}
