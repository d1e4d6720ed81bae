//! Bounded LRU cache of market snapshots with delta detection on insert.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::delta::diff;
use super::types::{BookSnapshot, BookUpdate, DeltaEvent};

/// Cache statistics for diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Entries currently held.
    pub size: usize,
    /// Configured capacity.
    pub capacity: usize,
    /// Lookup hits.
    pub hits: u64,
    /// Lookup misses.
    pub misses: u64,
    /// Evictions performed.
    pub evictions: u64,
}

struct CacheInner {
    snapshots: HashMap<String, BookSnapshot>,
    // Recency order, least recently used at the front.
    order: VecDeque<String>,
    // Markets with an open trade; never evicted.
    pinned: HashSet<String>,
    next_seq: HashMap<String, u64>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded, least-recently-used store of per-market order book snapshots.
///
/// The cache is the single owner of live snapshots. All mutation goes
/// through the inner mutex, so concurrent upserts from the feed and the
/// scanner serialize cleanly.
pub struct MarketCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl MarketCache {
    /// Create a cache bounded at `capacity` markets.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                snapshots: HashMap::new(),
                order: VecDeque::new(),
                pinned: HashSet::new(),
                next_seq: HashMap::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Insert or replace a market snapshot, returning the delta versus the
    /// prior snapshot when one existed.
    ///
    /// Evicts the least recently used unpinned market when at capacity.
    pub fn upsert(&self, update: BookUpdate) -> Option<DeltaEvent> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let token_id = update.token_id.clone();
        let seq = {
            let counter = inner.next_seq.entry(token_id.clone()).or_insert(0);
            *counter += 1;
            *counter
        };
        let snapshot = BookSnapshot::from_update(update, seq);

        let previous = inner.snapshots.insert(token_id.clone(), snapshot);
        let delta = previous.as_ref().map(|old| {
            let new = &inner.snapshots[&token_id];
            diff(old, new)
        });

        Self::touch(&mut inner.order, &token_id);

        if inner.snapshots.len() > self.capacity {
            self.evict_one(&mut inner);
        }

        delta
    }

    fn touch(order: &mut VecDeque<String>, token_id: &str) {
        if let Some(pos) = order.iter().position(|k| k == token_id) {
            order.remove(pos);
        }
        order.push_back(token_id.to_string());
    }

    fn evict_one(&self, inner: &mut CacheInner) {
        let victim = inner
            .order
            .iter()
            .find(|k| !inner.pinned.contains(*k))
            .cloned();

        match victim {
            Some(key) => {
                if let Some(pos) = inner.order.iter().position(|k| *k == key) {
                    inner.order.remove(pos);
                }
                inner.snapshots.remove(&key);
                inner.next_seq.remove(&key);
                inner.evictions += 1;
                debug!(token_id = %key, "Evicted market from cache");
            }
            None => {
                // Every entry has an open trade. Exceed capacity rather than
                // drop state a live intent depends on.
                warn!(
                    size = inner.snapshots.len(),
                    capacity = self.capacity,
                    "All cached markets pinned, skipping eviction"
                );
            }
        }
    }

    /// Get the current snapshot for a market, refreshing its recency.
    pub fn get(&self, token_id: &str) -> Option<BookSnapshot> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.snapshots.contains_key(token_id) {
            inner.hits += 1;
            Self::touch(&mut inner.order, token_id);
            inner.snapshots.get(token_id).cloned()
        } else {
            inner.misses += 1;
            None
        }
    }

    /// Check for a snapshot without refreshing recency or counting stats.
    pub fn peek(&self, token_id: &str) -> Option<BookSnapshot> {
        let inner = self.inner.lock().expect("cache lock poisoned");
        inner.snapshots.get(token_id).cloned()
    }

    /// Pin a market so eviction skips it while a trade is open.
    pub fn pin(&self, token_id: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.pinned.insert(token_id.to_string());
    }

    /// Release a pin once the trade reaches a terminal state.
    pub fn unpin(&self, token_id: &str) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.pinned.remove(token_id);
    }

    /// Number of markets currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").snapshots.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            size: inner.snapshots.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::types::PriceLevel;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn update(token_id: &str, bid: Decimal, bid_size: Decimal) -> BookUpdate {
        BookUpdate {
            token_id: token_id.to_string(),
            bids: vec![PriceLevel::new(bid, bid_size)],
            asks: vec![PriceLevel::new(bid + dec!(0.10), dec!(10))],
            timestamp_ms: None,
        }
    }

    #[test]
    fn first_upsert_yields_no_delta() {
        let cache = MarketCache::new(10);
        assert!(cache.upsert(update("a", dec!(0.40), dec!(10))).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn second_upsert_yields_delta_in_sequence_order() {
        let cache = MarketCache::new(10);
        cache.upsert(update("a", dec!(0.40), dec!(10)));
        let delta = cache.upsert(update("a", dec!(0.40), dec!(70))).unwrap();

        assert_eq!(delta.seq, 2);
        assert_eq!(delta.changes.len(), 1);
        assert!(delta.qualifying_counter_order(dec!(50)).is_some());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = MarketCache::new(3);
        for i in 0..10 {
            cache.upsert(update(&format!("m{i}"), dec!(0.40), dec!(10)));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.stats().evictions, 7);
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let cache = MarketCache::new(2);
        cache.upsert(update("a", dec!(0.40), dec!(10)));
        cache.upsert(update("b", dec!(0.40), dec!(10)));

        // Touch "a" so "b" becomes the LRU entry.
        assert!(cache.get("a").is_some());

        cache.upsert(update("c", dec!(0.40), dec!(10)));
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());
        assert!(cache.peek("c").is_some());
    }

    #[test]
    fn eviction_skips_pinned_markets() {
        let cache = MarketCache::new(2);
        cache.upsert(update("a", dec!(0.40), dec!(10)));
        cache.upsert(update("b", dec!(0.40), dec!(10)));
        cache.pin("a");

        // "a" is the LRU entry but holds an open trade; "b" goes instead.
        cache.upsert(update("c", dec!(0.40), dec!(10)));
        assert!(cache.peek("a").is_some());
        assert!(cache.peek("b").is_none());

        cache.unpin("a");
        cache.upsert(update("d", dec!(0.40), dec!(10)));
        assert!(cache.peek("a").is_none());
    }

    #[test]
    fn all_pinned_exceeds_capacity_instead_of_dropping() {
        let cache = MarketCache::new(2);
        cache.upsert(update("a", dec!(0.40), dec!(10)));
        cache.upsert(update("b", dec!(0.40), dec!(10)));
        cache.pin("a");
        cache.pin("b");
        cache.pin("c");

        cache.upsert(update("c", dec!(0.40), dec!(10)));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn sequence_numbers_are_monotonic_per_market() {
        let cache = MarketCache::new(10);
        cache.upsert(update("a", dec!(0.40), dec!(10)));
        cache.upsert(update("b", dec!(0.40), dec!(10)));
        cache.upsert(update("a", dec!(0.41), dec!(10)));

        assert_eq!(cache.peek("a").unwrap().seq, 2);
        assert_eq!(cache.peek("b").unwrap().seq, 1);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = MarketCache::new(10);
        cache.upsert(update("a", dec!(0.40), dec!(10)));

        cache.get("a");
        cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }
}
