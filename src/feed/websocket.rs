//! WebSocket push session for the Polymarket CLOB market channel.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::WsError;
use crate::metrics;
use crate::orderbook::{BookUpdate, PriceLevel};

use super::{ConnectionState, FeedConfig, SessionEnd, SessionResult};

/// Deadline for establishing a connection; no connect may hang forever.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

async fn connect(url: &str) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, WsError> {
    let (stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
        .await
        .map_err(|_| WsError::ConnectionFailed("connect timed out".to_string()))?
        .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;
    Ok(stream)
}

/// Price level from the wire, prices and sizes as strings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsLevel {
    /// Price as string.
    pub price: String,
    /// Size as string.
    pub size: String,
}

impl WsLevel {
    fn to_price_level(&self) -> Option<PriceLevel> {
        let price: Decimal = self.price.parse().ok()?;
        let size: Decimal = self.size.parse().ok()?;
        Some(PriceLevel { price, size })
    }
}

/// Incremental price change from the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct WsPriceChange {
    /// Asset the change belongs to.
    pub asset_id: Option<String>,
    /// Price as string.
    pub price: String,
    /// New size as string; zero removes the level.
    pub size: String,
    /// Side: "BUY" or "SELL".
    pub side: String,
}

/// Event envelope from the market channel.
#[derive(Debug, Clone, Deserialize)]
pub struct WsEvent {
    /// Event type: "book" or "price_change".
    pub event_type: Option<String>,
    /// Asset ID (for book events).
    pub asset_id: Option<String>,
    /// Bid levels (for book events).
    pub bids: Option<Vec<WsLevel>>,
    /// Ask levels (for book events).
    pub asks: Option<Vec<WsLevel>>,
    /// Price changes (for price_change events).
    pub price_changes: Option<Vec<WsPriceChange>>,
    /// Timestamp in milliseconds.
    pub timestamp: Option<i64>,
}

/// Subscription message for the market channel.
#[derive(Debug, Serialize)]
struct SubscribeMessage {
    #[serde(rename = "type")]
    msg_type: String,
    assets_ids: Vec<String>,
}

/// Mutable L2 book maintained from push events, keyed by price.
#[derive(Debug, Clone, Default)]
struct L2Book {
    bids: HashMap<Decimal, Decimal>,
    asks: HashMap<Decimal, Decimal>,
}

impl L2Book {
    fn apply_snapshot(&mut self, bids: &[WsLevel], asks: &[WsLevel]) {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            if let Some(l) = level.to_price_level() {
                if l.size > Decimal::ZERO {
                    self.bids.insert(l.price, l.size);
                }
            }
        }
        for level in asks {
            if let Some(l) = level.to_price_level() {
                if l.size > Decimal::ZERO {
                    self.asks.insert(l.price, l.size);
                }
            }
        }
    }

    fn apply_change(&mut self, change: &WsPriceChange) {
        let price: Decimal = match change.price.parse() {
            Ok(p) => p,
            Err(_) => return,
        };
        let size: Decimal = match change.size.parse() {
            Ok(s) => s,
            Err(_) => return,
        };

        let side = match change.side.to_uppercase().as_str() {
            "BUY" => &mut self.bids,
            "SELL" => &mut self.asks,
            _ => return,
        };

        if size <= Decimal::ZERO {
            side.remove(&price);
        } else {
            side.insert(price, size);
        }
    }

    fn to_update(&self, token_id: &str, timestamp_ms: Option<i64>) -> BookUpdate {
        BookUpdate {
            token_id: token_id.to_string(),
            bids: self.bids.iter().map(|(&price, &size)| PriceLevel { price, size }).collect(),
            asks: self.asks.iter().map(|(&price, &size)| PriceLevel { price, size }).collect(),
            timestamp_ms,
        }
    }
}

/// Check that the push endpoint accepts connections, then hang up.
/// Used while degraded to decide when to leave polling mode.
pub async fn probe(config: &FeedConfig) -> Result<(), WsError> {
    let url = market_url(&config.ws_url);
    let stream = connect(&url).await?;
    drop(stream);
    Ok(())
}

fn market_url(base: &str) -> String {
    format!("{}/ws/market", base.trim_end_matches('/'))
}

/// Connect, subscribe to the given assets, and pump book updates into `tx`
/// until the stream ends or stalls.
///
/// Returns `Err` only when the connection or subscription itself fails;
/// anything after a successful subscribe ends as `Ok(SessionEnd)`.
pub async fn run_session(
    config: &FeedConfig,
    assets: Vec<String>,
    tx: &mpsc::Sender<BookUpdate>,
    state_tx: &watch::Sender<ConnectionState>,
) -> SessionResult {
    let url = market_url(&config.ws_url);

    info!(url = %url, assets = assets.len(), "Connecting to push feed");

    let ws_stream = connect(&url).await?;
    let (mut write, mut read) = ws_stream.split();

    // Resubscribe the exact set of markets tracked at connect time.
    let subscribe = SubscribeMessage {
        msg_type: "MARKET".to_string(),
        assets_ids: assets,
    };
    let payload = serde_json::to_string(&subscribe)
        .map_err(|e| WsError::SendFailed(e.to_string()))?;
    write
        .send(Message::Text(payload))
        .await
        .map_err(|e| WsError::SendFailed(e.to_string()))?;

    state_tx.send_replace(ConnectionState::Connected);
    info!("Push feed subscribed");

    let stale_after = config.heartbeat_interval * 2;
    let mut last_message = Instant::now();
    let mut last_ping = Instant::now();
    let mut books: HashMap<String, L2Book> = HashMap::new();

    loop {
        if last_ping.elapsed() >= config.heartbeat_interval {
            last_ping = Instant::now();
            if write.send(Message::Ping(Vec::new())).await.is_err() {
                return Ok(SessionEnd::Closed);
            }
        }

        let idle = stale_after.saturating_sub(last_message.elapsed());
        if idle.is_zero() {
            warn!(stale_ms = last_message.elapsed().as_millis() as u64, "Feed stalled");
            return Ok(SessionEnd::Stalled);
        }

        let message = tokio::select! {
            msg = read.next() => msg,
            _ = tokio::time::sleep(idle.min(Duration::from_secs(1))) => continue,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                last_message = Instant::now();
                let start = Instant::now();
                metrics::inc_ws_messages_received();

                for update in handle_text(&mut books, &text) {
                    if tx.send(update).await.is_err() {
                        return Ok(SessionEnd::Closed);
                    }
                }

                metrics::record_ws_message_latency(start);
            }
            Some(Ok(Message::Ping(payload))) => {
                last_message = Instant::now();
                let _ = write.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Pong(_))) => {
                last_message = Instant::now();
                debug!("Received pong");
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Push feed closed");
                return Ok(SessionEnd::Closed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!(error = %e, "Push feed read error");
                return Ok(SessionEnd::Closed);
            }
            None => return Ok(SessionEnd::Closed),
        }
    }
}

/// Apply one text frame to the book state, returning the full snapshots of
/// every asset the frame touched.
fn handle_text(books: &mut HashMap<String, L2Book>, text: &str) -> Vec<BookUpdate> {
    // Frames can carry a single event or an array of them.
    let events: Vec<WsEvent> = if text.trim_start().starts_with('[') {
        serde_json::from_str(text).unwrap_or_default()
    } else {
        serde_json::from_str(text).map(|e| vec![e]).unwrap_or_default()
    };

    let mut updates = Vec::new();

    for event in events {
        match event.event_type.as_deref() {
            Some("book") => {
                let Some(asset_id) = event.asset_id.as_deref() else { continue };
                let book = books.entry(asset_id.to_string()).or_default();
                book.apply_snapshot(
                    event.bids.as_deref().unwrap_or_default(),
                    event.asks.as_deref().unwrap_or_default(),
                );
                updates.push(book.to_update(asset_id, event.timestamp));
            }
            Some("price_change") => {
                for change in event.price_changes.as_deref().unwrap_or_default() {
                    let Some(asset_id) = change.asset_id.as_deref() else { continue };
                    let book = books.entry(asset_id.to_string()).or_default();
                    book.apply_change(change);
                    updates.push(book.to_update(asset_id, event.timestamp));
                }
            }
            _ => {}
        }
    }

    updates
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn book_event_replaces_state() {
        let mut books = HashMap::new();

        let frame = r#"{
            "event_type": "book",
            "asset_id": "token-1",
            "bids": [{"price": "0.48", "size": "100"}, {"price": "0.47", "size": "50"}],
            "asks": [{"price": "0.52", "size": "80"}],
            "timestamp": 1700000000000
        }"#;

        let updates = handle_text(&mut books, frame);
        assert_eq!(updates.len(), 1);

        let update = &updates[0];
        assert_eq!(update.token_id, "token-1");
        assert_eq!(update.bids.len(), 2);
        assert_eq!(update.asks.len(), 1);
        assert_eq!(update.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn price_change_mutates_and_removes_levels() {
        let mut books = HashMap::new();

        handle_text(
            &mut books,
            r#"{"event_type": "book", "asset_id": "t", "bids": [{"price": "0.48", "size": "100"}], "asks": []}"#,
        );

        // Grow the level, then delete it with size zero.
        let updates = handle_text(
            &mut books,
            r#"{"event_type": "price_change", "price_changes": [
                {"asset_id": "t", "price": "0.48", "size": "160", "side": "BUY"}
            ]}"#,
        );
        assert_eq!(updates[0].bids[0].size, dec!(160));

        let updates = handle_text(
            &mut books,
            r#"{"event_type": "price_change", "price_changes": [
                {"asset_id": "t", "price": "0.48", "size": "0", "side": "BUY"}
            ]}"#,
        );
        assert!(updates[0].bids.is_empty());
    }

    #[test]
    fn array_frames_touch_multiple_assets() {
        let mut books = HashMap::new();

        let frame = r#"[
            {"event_type": "book", "asset_id": "a", "bids": [{"price": "0.40", "size": "10"}], "asks": []},
            {"event_type": "book", "asset_id": "b", "bids": [], "asks": [{"price": "0.60", "size": "20"}]}
        ]"#;

        let updates = handle_text(&mut books, frame);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].token_id, "a");
        assert_eq!(updates[1].token_id, "b");
    }

    #[test]
    fn unknown_and_malformed_frames_are_ignored() {
        let mut books = HashMap::new();
        assert!(handle_text(&mut books, r#"{"event_type": "subscribed"}"#).is_empty());
        assert!(handle_text(&mut books, "not json").is_empty());
        assert!(handle_text(&mut books, r#"{"price": "0.5"}"#).is_empty());
    }

    #[test]
    fn bad_levels_are_skipped() {
        let mut books = HashMap::new();
        let frame = r#"{
            "event_type": "book",
            "asset_id": "t",
            "bids": [{"price": "oops", "size": "10"}, {"price": "0.44", "size": "7"}],
            "asks": []
        }"#;

        let updates = handle_text(&mut books, frame);
        assert_eq!(updates[0].bids.len(), 1);
        assert_eq!(updates[0].bids[0].price, dec!(0.44));
    }
}
