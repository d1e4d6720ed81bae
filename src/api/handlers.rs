//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::warn;

use crate::events::ControlSignal;
use crate::feed::ConnectionState;
use crate::risk::{RiskManager, RiskSnapshot};
use crate::strategy::{EngineStats, FrontrunEngine};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the bot is ready to trade.
    pub ready: Arc<AtomicBool>,
    /// Risk manager, for snapshots and the emergency stop.
    pub risk: Arc<RiskManager>,
    /// Engine, for statistics.
    pub engine: Arc<FrontrunEngine>,
    /// Feed connection state.
    pub connection: watch::Receiver<ConnectionState>,
    /// Control channel into the strategy loop.
    pub control_tx: mpsc::Sender<ControlSignal>,
    /// Prometheus render handle, when metrics are exported.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create app state.
    pub fn new(
        risk: Arc<RiskManager>,
        engine: Arc<FrontrunEngine>,
        connection: watch::Receiver<ConnectionState>,
        control_tx: mpsc::Sender<ControlSignal>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            risk,
            engine,
            connection,
            control_tx,
            prometheus,
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the bot is ready.
    pub ready: bool,
    /// Current feed connection state.
    pub connection: ConnectionState,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Current feed connection state.
    pub connection: ConnectionState,
    /// Engine statistics.
    pub stats: EngineStats,
    /// Risk snapshot.
    pub risk: RiskSnapshot,
}

/// Control acknowledgement.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    /// Whether the signal was accepted.
    pub accepted: bool,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();

    let response = ReadyResponse {
        ready: is_ready,
        connection: state.connection_state(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - connection, engine stats, and risk in one place.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        connection: state.connection_state(),
        stats: state.engine.stats(),
        risk: state.risk.snapshot(),
    })
}

/// Full risk snapshot.
pub async fn risk(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.risk.snapshot())
}

/// Pause scanning.
pub async fn pause(State(state): State<AppState>) -> impl IntoResponse {
    send_control(&state, ControlSignal::Pause).await
}

/// Resume scanning.
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    send_control(&state, ControlSignal::Resume).await
}

/// Emergency stop: the breaker trips right here, before the signal is even
/// delivered, so no in-flight authorization can pass after this returns.
pub async fn emergency_stop(State(state): State<AppState>) -> impl IntoResponse {
    state.risk.trip("emergency stop");
    send_control(&state, ControlSignal::EmergencyStop).await
}

/// Re-arm the circuit breaker.
pub async fn reset_breaker(State(state): State<AppState>) -> impl IntoResponse {
    state.risk.reset_breaker();
    (StatusCode::OK, Json(ControlResponse { accepted: true }))
}

/// Prometheus metrics in text exposition format.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics exporter disabled".to_string()),
    }
}

async fn send_control(state: &AppState, signal: ControlSignal) -> (StatusCode, Json<ControlResponse>) {
    match state.control_tx.send(signal).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(ControlResponse { accepted: true })),
        Err(e) => {
            warn!(error = %e, "Control channel closed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ControlResponse { accepted: false }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_state;

    #[test]
    fn app_state_ready_toggle() {
        let (state, _control_rx) = test_state();
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }
}
