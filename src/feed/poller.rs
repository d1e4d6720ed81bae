//! REST polling fallback for order book snapshots.

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::market::ClobExchange;
use crate::metrics;
use crate::orderbook::BookUpdate;

/// Fetch one snapshot for every tracked market, fanning out up to
/// `concurrency` requests at a time, and push the results into `tx`.
///
/// Individual fetch failures are logged and skipped; a market that cannot
/// be fetched this cycle is simply retried on the next one.
pub async fn poll_cycle(
    exchange: &dyn ClobExchange,
    token_ids: &[String],
    tx: &mpsc::Sender<BookUpdate>,
    concurrency: usize,
) {
    if token_ids.is_empty() {
        return;
    }

    let updates: Vec<Option<BookUpdate>> = stream::iter(token_ids)
        .map(|token_id| async move {
            match exchange.fetch_book(token_id).await {
                Ok(update) => Some(update),
                Err(e) => {
                    debug!(token_id = %token_id, error = %e, "Poll fetch failed");
                    None
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for update in updates.into_iter().flatten() {
        metrics::inc_poll_snapshots();
        if tx.send(update).await.is_err() {
            return;
        }
    }
}
