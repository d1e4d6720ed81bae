//! Prometheus metrics for latency tracking and monitoring.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use tracing::debug;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// WebSocket message latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// Counter-order detection latency metric name.
pub const METRIC_DETECTION_LATENCY: &str = "counter_order_detection_latency_ms";
/// Market scan latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "market_scan_latency_ms";
/// Order book fetch latency metric name.
pub const METRIC_BOOK_FETCH_LATENCY: &str = "book_fetch_latency_ms";
/// Orders submitted counter metric name.
pub const METRIC_ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Orders retried counter metric name.
pub const METRIC_ORDERS_RETRIED: &str = "orders_retried_total";
/// Orders failed counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Bait orders placed counter metric name.
pub const METRIC_BAITS_PLACED: &str = "bait_orders_placed_total";
/// Counter-orders detected counter metric name.
pub const METRIC_COUNTER_ORDERS_DETECTED: &str = "counter_orders_detected_total";
/// Frontruns attempted counter metric name.
pub const METRIC_FRONTRUNS_ATTEMPTED: &str = "frontruns_attempted_total";
/// Risk denials counter metric name.
pub const METRIC_RISK_DENIALS: &str = "risk_denials_total";
/// Breaker trips counter metric name.
pub const METRIC_BREAKER_TRIPS: &str = "circuit_breaker_trips_total";
/// Deltas computed counter metric name.
pub const METRIC_DELTAS_COMPUTED: &str = "book_deltas_computed_total";
/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Poll-mode snapshots counter metric name.
pub const METRIC_POLL_SNAPSHOTS: &str = "poll_snapshots_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds"
    );
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_histogram!(
        METRIC_DETECTION_LATENCY,
        "Time from bait placement to qualifying counter-order in milliseconds"
    );
    describe_histogram!(METRIC_SCAN_LATENCY, "Full market scan latency in milliseconds");
    describe_histogram!(
        METRIC_BOOK_FETCH_LATENCY,
        "Order book fetch latency in milliseconds"
    );

    describe_counter!(METRIC_ORDERS_SUBMITTED, "Total number of orders submitted");
    describe_counter!(METRIC_ORDERS_RETRIED, "Total number of order submission retries");
    describe_counter!(METRIC_ORDERS_FAILED, "Total number of orders that failed");
    describe_counter!(METRIC_BAITS_PLACED, "Total number of bait orders placed");
    describe_counter!(
        METRIC_COUNTER_ORDERS_DETECTED,
        "Total number of qualifying counter-orders detected"
    );
    describe_counter!(METRIC_FRONTRUNS_ATTEMPTED, "Total number of frontrun orders attempted");
    describe_counter!(METRIC_RISK_DENIALS, "Total number of trades denied by the risk manager");
    describe_counter!(METRIC_BREAKER_TRIPS, "Total number of circuit breaker trips");
    describe_counter!(METRIC_DELTAS_COMPUTED, "Total number of order book deltas computed");
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received"
    );
    describe_counter!(METRIC_WS_RECONNECTS, "Total number of WebSocket reconnections");
    describe_counter!(
        METRIC_POLL_SNAPSHOTS,
        "Total number of snapshots fetched by the polling fallback"
    );

    debug!("Metrics initialized");
}

/// Record order submission latency.
pub fn record_order_submit_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDER_SUBMIT_LATENCY).record(latency_ms);
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(latency_ms);
}

/// Record bait-to-counter-order detection latency.
pub fn record_detection_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_DETECTION_LATENCY).record(latency_ms);
}

/// Record full scan latency.
pub fn record_scan_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_SCAN_LATENCY).record(latency_ms);
}

/// Record order book fetch latency.
pub fn record_book_fetch_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_BOOK_FETCH_LATENCY).record(latency_ms);
}

/// Increment orders submitted counter.
pub fn inc_orders_submitted() {
    counter!(METRIC_ORDERS_SUBMITTED).increment(1);
}

/// Increment order retry counter.
pub fn inc_orders_retried() {
    counter!(METRIC_ORDERS_RETRIED).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed() {
    counter!(METRIC_ORDERS_FAILED).increment(1);
}

/// Increment bait orders placed counter.
pub fn inc_baits_placed() {
    counter!(METRIC_BAITS_PLACED).increment(1);
}

/// Increment counter-orders detected counter.
pub fn inc_counter_orders_detected() {
    counter!(METRIC_COUNTER_ORDERS_DETECTED).increment(1);
}

/// Increment frontruns attempted counter.
pub fn inc_frontruns_attempted() {
    counter!(METRIC_FRONTRUNS_ATTEMPTED).increment(1);
}

/// Increment risk denial counter.
pub fn inc_risk_denials() {
    counter!(METRIC_RISK_DENIALS).increment(1);
}

/// Increment breaker trip counter.
pub fn inc_breaker_trips() {
    counter!(METRIC_BREAKER_TRIPS).increment(1);
}

/// Increment delta counter.
pub fn inc_deltas_computed() {
    counter!(METRIC_DELTAS_COMPUTED).increment(1);
}

/// Increment WebSocket messages received counter.
pub fn inc_ws_messages_received() {
    counter!(METRIC_WS_MESSAGES_RECEIVED).increment(1);
}

/// Increment WebSocket reconnects counter.
pub fn inc_ws_reconnects() {
    counter!(METRIC_WS_RECONNECTS).increment(1);
}

/// Increment poll snapshot counter.
pub fn inc_poll_snapshots() {
    counter!(METRIC_POLL_SNAPSHOTS).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 9.0); // Allow some tolerance
        // Timer will record on drop
    }
}
