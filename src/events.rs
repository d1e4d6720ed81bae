//! Observable event feed and control signals.
//!
//! The core publishes everything an external observer needs onto a single
//! broadcast bus: connection transitions, book deltas, terminal trades, and
//! risk snapshots. The UI and the persistence collaborator subscribe; the
//! core never depends on them being present.

use rust_decimal::Decimal;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::feed::ConnectionState;
use crate::orderbook::DeltaEvent;
use crate::risk::RiskSnapshot;
use crate::trading::order::{IntentState, TradeIntent};

/// A trade intent that reached a terminal state.
#[derive(Debug, Clone, Serialize)]
pub struct TradeRecord {
    /// The intent as created by the strategy.
    pub intent: TradeIntent,
    /// Terminal state.
    pub state: IntentState,
    /// Estimated profit and loss attributed to the trade.
    pub pnl: Decimal,
    /// When the outcome was recorded.
    pub recorded_at: OffsetDateTime,
}

/// Everything the core emits for observers.
#[derive(Debug, Clone, Serialize)]
pub enum BotEvent {
    /// Feed connection transition.
    Connection(ConnectionState),
    /// Order book delta for a tracked market.
    Delta(DeltaEvent),
    /// Terminal trade outcome.
    Trade(TradeRecord),
    /// Periodic or on-change risk snapshot.
    Risk(RiskSnapshot),
}

/// External control of the trading loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop scanning; keep the process alive.
    Pause,
    /// Resume scanning.
    Resume,
    /// Shut the bot down.
    Stop,
    /// Trip the circuit breaker and stop placing orders immediately.
    EmergencyStop,
}

/// Broadcast bus for [`BotEvent`]s.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// simply dropped, and slow subscribers lag rather than backpressure the
/// trading path.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BotEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event: BotEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(BotEvent::Connection(ConnectionState::Connected));

        assert!(matches!(
            a.recv().await.unwrap(),
            BotEvent::Connection(ConnectionState::Connected)
        ));
        assert!(matches!(
            b.recv().await.unwrap(),
            BotEvent::Connection(ConnectionState::Connected)
        ));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.publish(BotEvent::Connection(ConnectionState::Degraded));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let bus = EventBus::new(8);
        bus.publish(BotEvent::Connection(ConnectionState::Connecting));

        let mut rx = bus.subscribe();
        bus.publish(BotEvent::Connection(ConnectionState::Connected));

        assert!(matches!(
            rx.recv().await.unwrap(),
            BotEvent::Connection(ConnectionState::Connected)
        ));
    }
}
