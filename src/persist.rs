//! Persistence collaborator seam.
//!
//! The core does not own storage. It forwards terminal trade records and
//! periodic risk snapshots from the event bus to a [`RecordSink`], and can
//! take an optional [`RiskSnapshot`] seed back at startup so daily counters
//! survive a restart. Schema and storage engine are the sink's business.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::events::{BotEvent, EventBus, TradeRecord};
use crate::risk::{RiskManager, RiskSnapshot};

/// Receives the core's persistent stream.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append a terminal trade record.
    async fn record_trade(&self, record: &TradeRecord) -> std::io::Result<()>;

    /// Append a risk snapshot.
    async fn record_risk(&self, snapshot: &RiskSnapshot) -> std::io::Result<()>;
}

/// Sink that appends JSON lines to a file. Good enough for local runs and
/// replay tooling; swap in a real store without touching the core.
pub struct JsonlSink {
    path: PathBuf,
}

impl JsonlSink {
    /// Create a sink appending to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn append(&self, line: String) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn record_trade(&self, record: &TradeRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "kind": "trade",
            "record": record,
        }))?;
        self.append(line)
    }

    async fn record_risk(&self, snapshot: &RiskSnapshot) -> std::io::Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "kind": "risk",
            "snapshot": snapshot,
        }))?;
        self.append(line)
    }
}

/// Load the most recent risk snapshot from a JSONL file written by
/// [`JsonlSink`], for seeding the risk manager at startup.
pub fn load_risk_seed(path: &std::path::Path) -> Option<RiskSnapshot> {
    let content = std::fs::read_to_string(path).ok()?;

    content
        .lines()
        .rev()
        .find_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).ok()?;
            if value.get("kind")?.as_str()? != "risk" {
                return None;
            }
            serde_json::from_value(value.get("snapshot")?.clone()).ok()
        })
}

/// Forward trade records and risk snapshots from the bus to a sink, and
/// push a fresh risk snapshot every `risk_interval` regardless of activity.
///
/// Sink failures are logged and skipped; persistence never stalls trading.
pub fn spawn_recorder(
    bus: &EventBus,
    risk: Arc<RiskManager>,
    sink: Arc<dyn RecordSink>,
    risk_interval: Duration,
) -> JoinHandle<()> {
    let mut events = bus.subscribe();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(risk_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(BotEvent::Trade(record)) => {
                        if let Err(e) = sink.record_trade(&record).await {
                            warn!(error = %e, "Trade record not persisted");
                        }
                    }
                    Ok(BotEvent::Risk(snapshot)) => {
                        if let Err(e) = sink.record_risk(&snapshot).await {
                            warn!(error = %e, "Risk snapshot not persisted");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "Recorder lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Event bus closed, recorder exiting");
                        return;
                    }
                },
                _ = ticker.tick() => {
                    let snapshot = risk.snapshot();
                    if let Err(e) = sink.record_risk(&snapshot).await {
                        warn!(error = %e, "Periodic risk snapshot not persisted");
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::trading::order::{IntentState, Side, TradeIntent};
    use rust_decimal_macros::dec;
    use time::OffsetDateTime;

    fn temp_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("frontrun-test-{}-{}", std::process::id(), name));
        path
    }

    #[tokio::test]
    async fn jsonl_sink_round_trips_risk_seed() {
        let path = temp_path("seed.jsonl");
        let _ = std::fs::remove_file(&path);

        let config = Config::default();
        let risk = RiskManager::new(&config);
        let intent = TradeIntent::frontrun("token", Side::Buy, dec!(0.30), dec!(3));
        assert!(risk.authorize(&intent).is_allowed());
        risk.record_outcome(
            &intent,
            &IntentState::Filled { order_id: "x".to_string() },
            dec!(-0.25),
        );

        let sink = JsonlSink::new(&path);
        sink.record_risk(&risk.snapshot()).await.unwrap();

        let seed = load_risk_seed(&path).unwrap();
        assert_eq!(seed.daily_pnl, dec!(-0.25));
        assert_eq!(seed.trades_today, 1);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn jsonl_sink_appends_trades() {
        let path = temp_path("trades.jsonl");
        let _ = std::fs::remove_file(&path);

        let sink = JsonlSink::new(&path);
        let record = TradeRecord {
            intent: TradeIntent::frontrun("token", Side::Buy, dec!(0.30), dec!(3)),
            state: IntentState::Filled { order_id: "x".to_string() },
            pnl: dec!(0.06),
            recorded_at: OffsetDateTime::now_utc(),
        };

        sink.record_trade(&record).await.unwrap();
        sink.record_trade(&record).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("\"kind\":\"trade\""));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_risk_seed_takes_the_latest_snapshot() {
        let path = temp_path("latest.jsonl");
        let _ = std::fs::remove_file(&path);

        let config = Config::default();
        let risk = RiskManager::new(&config);

        let mut older = risk.snapshot();
        older.trades_today = 1;
        let mut newer = risk.snapshot();
        newer.trades_today = 7;

        let sink = JsonlSink::new(&path);
        futures::executor::block_on(async {
            sink.record_risk(&older).await.unwrap();
            sink.record_risk(&newer).await.unwrap();
        });

        let seed = load_risk_seed(&path).unwrap();
        assert_eq!(seed.trades_today, 7);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_yields_no_seed() {
        assert!(load_risk_seed(std::path::Path::new("/nonexistent/seed.jsonl")).is_none());
    }
}
