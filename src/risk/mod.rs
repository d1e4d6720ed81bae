//! Risk management: position limits, loss limits, and the circuit breaker.
//!
//! Exactly one [`RiskManager`] exists per bot. Every proposed trade passes
//! through [`RiskManager::authorize`] before submission, and every terminal
//! outcome comes back through [`RiskManager::record_outcome`]. Authorization
//! reserves exposure under the same lock that checks the limits, so two
//! concurrent trades cannot both pass a bankroll check that only one of them
//! should pass.

use std::collections::VecDeque;
use std::sync::Mutex;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use tracing::{info, warn};

use crate::config::Config;
use crate::metrics;
use crate::trading::order::{IntentRole, IntentState, TradeIntent};

/// Why a trade was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DenyReason {
    /// The circuit breaker is tripped.
    BreakerTripped {
        /// Why it tripped.
        reason: String,
    },
    /// Trade notional exceeds the per-trade share of bankroll.
    ExceedsPerTradeCap {
        /// Requested notional.
        requested: Decimal,
        /// Allowed maximum.
        cap: Decimal,
    },
    /// Today's losses have reached the daily limit.
    DailyLossLimit {
        /// Cumulative daily loss.
        loss: Decimal,
        /// Configured limit.
        limit: Decimal,
    },
    /// Too many trades already open.
    MaxConcurrentTrades {
        /// Configured maximum.
        max: usize,
    },
    /// Bankroll is effectively gone.
    BankrollDepleted,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::BreakerTripped { reason } => write!(f, "circuit breaker: {reason}"),
            DenyReason::ExceedsPerTradeCap { requested, cap } => {
                write!(f, "notional {requested} exceeds per-trade cap {cap}")
            }
            DenyReason::DailyLossLimit { loss, limit } => {
                write!(f, "daily loss {loss} reached limit {limit}")
            }
            DenyReason::MaxConcurrentTrades { max } => {
                write!(f, "max concurrent trades ({max}) reached")
            }
            DenyReason::BankrollDepleted => write!(f, "bankroll depleted"),
        }
    }
}

/// Outcome of an authorization check.
///
/// A denial is a controlled no-op, not an error. An `Allowed` decision
/// reserves exposure and MUST be paired with a later
/// [`RiskManager::record_outcome`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Trade may proceed; exposure has been reserved.
    Allowed,
    /// Trade must not be submitted.
    Denied(DenyReason),
}

impl Decision {
    /// Whether the trade may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Circuit breaker state.
///
/// Armed -> Tripped on a breach; Tripped -> Armed only on explicit reset or
/// daily rollover. While tripped, every authorization is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BreakerState {
    /// Trading allowed.
    Armed,
    /// Safety stop; all trading denied.
    Tripped {
        /// Why it tripped.
        reason: String,
        /// When it tripped.
        at: OffsetDateTime,
    },
}

impl BreakerState {
    /// Whether the breaker is tripped.
    pub fn is_tripped(&self) -> bool {
        matches!(self, BreakerState::Tripped { .. })
    }
}

/// Serializable view of the risk state, for the UI feed and the persistence
/// collaborator. Also accepted back at startup to seed daily counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Current bankroll.
    pub bankroll: Decimal,
    /// Bankroll at start.
    pub initial_bankroll: Decimal,
    /// Cumulative profit and loss today.
    pub daily_pnl: Decimal,
    /// Trades completed today.
    pub trades_today: u32,
    /// Winning trades today.
    pub wins_today: u32,
    /// Losing trades today.
    pub losses_today: u32,
    /// Current losing streak.
    pub consecutive_losses: u32,
    /// Trades currently open.
    pub open_trades: usize,
    /// Whether the breaker is tripped.
    pub breaker_tripped: bool,
    /// Trip reason when tripped.
    pub breaker_reason: Option<String>,
    /// Day the counters belong to (ISO date).
    pub day: Date,
}

struct RiskState {
    bankroll: Decimal,
    daily_pnl: Decimal,
    trades_today: u32,
    wins_today: u32,
    losses_today: u32,
    consecutive_losses: u32,
    open_trades: usize,
    open_exposure: Decimal,
    breaker: BreakerState,
    day: Date,
    error_times: VecDeque<OffsetDateTime>,
}

/// Gates every trade and owns the circuit breaker.
pub struct RiskManager {
    initial_bankroll: Decimal,
    max_trade_amount: Decimal,
    max_daily_loss: Decimal,
    max_concurrent_trades: usize,
    consecutive_loss_limit: u32,
    error_window: time::Duration,
    error_threshold: u32,
    state: Mutex<RiskState>,
}

impl RiskManager {
    /// Create a risk manager from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            initial_bankroll: config.bankroll,
            max_trade_amount: config.max_trade_amount(),
            max_daily_loss: config.max_daily_loss(),
            max_concurrent_trades: config.max_concurrent_trades,
            consecutive_loss_limit: config.breaker_consecutive_losses,
            error_window: time::Duration::seconds(config.breaker_error_window_s as i64),
            error_threshold: config.breaker_error_threshold,
            state: Mutex::new(RiskState {
                bankroll: config.bankroll,
                daily_pnl: Decimal::ZERO,
                trades_today: 0,
                wins_today: 0,
                losses_today: 0,
                consecutive_losses: 0,
                open_trades: 0,
                open_exposure: Decimal::ZERO,
                breaker: BreakerState::Armed,
                day: OffsetDateTime::now_utc().date(),
                error_times: VecDeque::new(),
            }),
        }
    }

    /// Create a risk manager, restoring daily counters from a persisted
    /// snapshot when it belongs to today. A snapshot from a previous day is
    /// ignored so counters start fresh.
    pub fn with_seed(config: &Config, seed: &RiskSnapshot) -> Self {
        let manager = Self::new(config);

        if seed.day == OffsetDateTime::now_utc().date() {
            let mut state = manager.state.lock().expect("risk lock poisoned");
            state.bankroll = seed.bankroll;
            state.daily_pnl = seed.daily_pnl;
            state.trades_today = seed.trades_today;
            state.wins_today = seed.wins_today;
            state.losses_today = seed.losses_today;
            state.consecutive_losses = seed.consecutive_losses;
            if seed.breaker_tripped {
                state.breaker = BreakerState::Tripped {
                    reason: seed
                        .breaker_reason
                        .clone()
                        .unwrap_or_else(|| "restored from snapshot".to_string()),
                    at: OffsetDateTime::now_utc(),
                };
            }
            info!(daily_pnl = %state.daily_pnl, trades = state.trades_today, "Risk state seeded");
        }

        manager
    }

    /// Gate a proposed trade. An `Allowed` decision reserves the intent's
    /// notional and open-trade slot; the caller must report the outcome via
    /// [`Self::record_outcome`] no matter what happens.
    pub fn authorize(&self, intent: &TradeIntent) -> Decision {
        let mut state = self.state.lock().expect("risk lock poisoned");
        Self::rollover_if_new_day(&mut state);

        if let BreakerState::Tripped { reason, .. } = &state.breaker {
            metrics::inc_risk_denials();
            return Decision::Denied(DenyReason::BreakerTripped {
                reason: reason.clone(),
            });
        }

        if state.open_trades >= self.max_concurrent_trades {
            metrics::inc_risk_denials();
            return Decision::Denied(DenyReason::MaxConcurrentTrades {
                max: self.max_concurrent_trades,
            });
        }

        if state.bankroll < Decimal::ONE {
            self.trip_locked(&mut state, "bankroll depleted");
            metrics::inc_risk_denials();
            return Decision::Denied(DenyReason::BankrollDepleted);
        }

        if -state.daily_pnl >= self.max_daily_loss {
            self.trip_locked(&mut state, "daily loss limit reached");
            metrics::inc_risk_denials();
            return Decision::Denied(DenyReason::DailyLossLimit {
                loss: -state.daily_pnl,
                limit: self.max_daily_loss,
            });
        }

        let notional = intent.notional();
        // The per-trade cap gates position-taking orders. Bait probes are
        // bounded by the configured micro size instead; their notional still
        // reserves exposure below.
        //
        // Reserved exposure from trades still in flight counts against the
        // cap, so parallel authorizations cannot overcommit the bankroll.
        if intent.role == IntentRole::Frontrun
            && state.open_exposure + notional > self.max_trade_amount
        {
            metrics::inc_risk_denials();
            return Decision::Denied(DenyReason::ExceedsPerTradeCap {
                requested: notional,
                cap: self.max_trade_amount,
            });
        }

        state.open_trades += 1;
        state.open_exposure += notional;
        Decision::Allowed
    }

    /// Record the terminal outcome of an authorized intent. Runs in O(1):
    /// counters are updated in place, never recomputed from history.
    pub fn record_outcome(&self, intent: &TradeIntent, outcome: &IntentState, pnl: Decimal) {
        let mut state = self.state.lock().expect("risk lock poisoned");
        Self::rollover_if_new_day(&mut state);

        state.open_trades = state.open_trades.saturating_sub(1);
        state.open_exposure -= intent.notional();
        if state.open_exposure < Decimal::ZERO {
            state.open_exposure = Decimal::ZERO;
        }

        match outcome {
            IntentState::Filled { .. } => {
                state.bankroll += pnl;
                state.daily_pnl += pnl;
                state.trades_today += 1;

                if pnl >= Decimal::ZERO {
                    state.wins_today += 1;
                    state.consecutive_losses = 0;
                } else {
                    state.losses_today += 1;
                    state.consecutive_losses += 1;
                }

                info!(
                    token_id = %intent.token_id,
                    role = %intent.role,
                    pnl = %pnl,
                    bankroll = %state.bankroll,
                    "Trade outcome recorded"
                );
            }
            IntentState::Cancelled => {
                // A cancelled bait never traded; only the reservation is
                // released.
            }
            IntentState::Rejected { .. } | IntentState::TimedOut => {
                self.record_error_locked(&mut state);
            }
        }

        self.evaluate_breaker_locked(&mut state);
    }

    fn record_error_locked(&self, state: &mut RiskState) {
        let now = OffsetDateTime::now_utc();
        state.error_times.push_back(now);

        let cutoff = now - self.error_window;
        while state.error_times.front().is_some_and(|t| *t < cutoff) {
            state.error_times.pop_front();
        }
    }

    fn evaluate_breaker_locked(&self, state: &mut RiskState) {
        if state.breaker.is_tripped() {
            return;
        }

        if -state.daily_pnl >= self.max_daily_loss {
            self.trip_locked(state, "daily loss limit reached");
        } else if state.consecutive_losses >= self.consecutive_loss_limit {
            self.trip_locked(state, "consecutive loss limit reached");
        } else if state.error_times.len() as u32 >= self.error_threshold {
            self.trip_locked(state, "execution error rate too high");
        }
    }

    fn trip_locked(&self, state: &mut RiskState, reason: &str) {
        if state.breaker.is_tripped() {
            return;
        }
        warn!(reason = reason, "Circuit breaker tripped");
        metrics::inc_breaker_trips();
        state.breaker = BreakerState::Tripped {
            reason: reason.to_string(),
            at: OffsetDateTime::now_utc(),
        };
    }

    fn rollover_if_new_day(state: &mut RiskState) {
        let today = OffsetDateTime::now_utc().date();
        if state.day != today {
            info!(from = %state.day, to = %today, "Daily rollover, resetting risk counters");
            Self::reset_daily(state, today);
        }
    }

    fn reset_daily(state: &mut RiskState, day: Date) {
        state.daily_pnl = Decimal::ZERO;
        state.trades_today = 0;
        state.wins_today = 0;
        state.losses_today = 0;
        state.consecutive_losses = 0;
        state.error_times.clear();
        state.breaker = BreakerState::Armed;
        state.day = day;
    }

    /// Whether trading is currently possible at all.
    pub fn can_trade(&self) -> bool {
        !self.state.lock().expect("risk lock poisoned").breaker.is_tripped()
    }

    /// Trip the breaker immediately. Used by the emergency stop signal.
    pub fn trip(&self, reason: &str) {
        let mut state = self.state.lock().expect("risk lock poisoned");
        self.trip_locked(&mut state, reason);
    }

    /// Re-arm the breaker without touching daily counters. The next breach
    /// will trip it again.
    pub fn reset_breaker(&self) {
        let mut state = self.state.lock().expect("risk lock poisoned");
        if state.breaker.is_tripped() {
            info!("Circuit breaker manually reset");
        }
        state.breaker = BreakerState::Armed;
        state.consecutive_losses = 0;
        state.error_times.clear();
    }

    /// Force a daily rollover: daily counters go to zero and the breaker
    /// re-arms. Normally triggered automatically when the UTC date changes.
    pub fn rollover(&self) {
        let mut state = self.state.lock().expect("risk lock poisoned");
        let today = OffsetDateTime::now_utc().date();
        info!("Daily rollover forced");
        Self::reset_daily(&mut state, today);
    }

    /// Current state as a serializable snapshot.
    pub fn snapshot(&self) -> RiskSnapshot {
        let state = self.state.lock().expect("risk lock poisoned");
        let (breaker_tripped, breaker_reason) = match &state.breaker {
            BreakerState::Armed => (false, None),
            BreakerState::Tripped { reason, .. } => (true, Some(reason.clone())),
        };

        RiskSnapshot {
            bankroll: state.bankroll,
            initial_bankroll: self.initial_bankroll,
            daily_pnl: state.daily_pnl,
            trades_today: state.trades_today,
            wins_today: state.wins_today,
            losses_today: state.losses_today,
            consecutive_losses: state.consecutive_losses,
            open_trades: state.open_trades,
            breaker_tripped,
            breaker_reason,
            day: state.day,
        }
    }
}
