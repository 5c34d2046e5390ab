//! Response caching and per-client rate limiting for the search surface.
//!
//! Both structures take their notion of time from a [`Clock`], so tests can
//! advance time deterministically with [`ManualClock`]. Neither is
//! internally synchronized; wrap them in a `Mutex` when shared.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::SearchResponse;

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Wall-clock time since construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Clock advanced by hand.
#[derive(Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

struct CacheEntry {
    response: SearchResponse,
    stored_at: Duration,
}

/// TTL cache of search responses keyed by normalized query and `top_k`.
///
/// Any write to the record store must call
/// [`invalidate_all`](SearchCache::invalidate_all), since a cached response
/// would otherwise hide newly added records.
pub struct SearchCache {
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    entries: HashMap<(String, usize), CacheEntry>,
    generation: u64,
}

impl SearchCache {
    pub fn new(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            max_entries,
            clock,
            entries: HashMap::new(),
            generation: 0,
        }
    }

    fn key(query: &str, top_k: usize) -> (String, usize) {
        (
            query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
            top_k,
        )
    }

    /// A fresh cached response, if present. Expired entries are dropped.
    pub fn get(&mut self, query: &str, top_k: usize) -> Option<SearchResponse> {
        let key = Self::key(query, top_k);
        let now = self.clock.now();
        let fresh = match self.entries.get(&key) {
            Some(entry) => now.saturating_sub(entry.stored_at) < self.ttl,
            None => return None,
        };
        if fresh {
            self.entries.get(&key).map(|e| e.response.clone())
        } else {
            self.entries.remove(&key);
            None
        }
    }

    pub fn insert(&mut self, query: &str, top_k: usize, response: SearchResponse) {
        if self.max_entries == 0 || self.ttl.is_zero() {
            return;
        }
        let now = self.clock.now();
        if self.entries.len() >= self.max_entries {
            self.evict_expired();
        }
        if self.entries.len() >= self.max_entries {
            // Still full: drop the oldest entry.
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.stored_at)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            Self::key(query, top_k),
            CacheEntry {
                response,
                stored_at: now,
            },
        );
    }

    /// Counter bumped by every [`invalidate_all`](SearchCache::invalidate_all).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Insert only if no invalidation happened since `generation` was read.
    /// A response computed from a corpus loaded before a write is dropped.
    pub fn insert_if_current(
        &mut self,
        generation: u64,
        query: &str,
        top_k: usize,
        response: SearchResponse,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        self.insert(query, top_k, response);
        true
    }

    pub fn evict_expired(&mut self) {
        let now = self.clock.now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, e| now.saturating_sub(e.stored_at) < ttl);
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
        self.generation += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fixed-window request limiter keyed by client identity.
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: HashMap<String, (Duration, u32)>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit,
            window,
            clock,
            windows: HashMap::new(),
        }
    }

    /// Count one request for `client` and report whether it is allowed.
    pub fn check(&mut self, client: &str) -> bool {
        let now = self.clock.now();
        let window = self.window;
        if self.windows.len() > 4096 {
            self.windows
                .retain(|_, (start, _)| now.saturating_sub(*start) < window);
        }
        let slot = self
            .windows
            .entry(client.to_string())
            .or_insert((now, 0));
        if now.saturating_sub(slot.0) >= window {
            *slot = (now, 0);
        }
        if slot.1 >= self.limit {
            return false;
        }
        slot.1 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(tag: &str) -> SearchResponse {
        SearchResponse {
            suggestions: vec![tag.to_string()],
            ..SearchResponse::default()
        }
    }

    #[test]
    fn test_cache_hit_until_ttl() {
        let clock = Arc::new(ManualClock::new());
        let mut cache = SearchCache::new(Duration::from_secs(60), 16, clock.clone());
        cache.insert("Signal  Fault", 10, response("a"));

        assert_eq!(cache.get("signal fault", 10).unwrap().suggestions, vec!["a"]);
        assert!(cache.get("signal fault", 5).is_none());

        clock.advance(Duration::from_secs(59));
        assert!(cache.get("signal fault", 10).is_some());
        clock.advance(Duration::from_secs(1));
        assert!(cache.get("signal fault", 10).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_bounded_and_invalidated() {
        let clock = Arc::new(ManualClock::new());
        let mut cache = SearchCache::new(Duration::from_secs(60), 2, clock.clone());
        cache.insert("one", 10, response("1"));
        clock.advance(Duration::from_millis(10));
        cache.insert("two", 10, response("2"));
        clock.advance(Duration::from_millis(10));
        cache.insert("three", 10, response("3"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("one", 10).is_none());
        assert!(cache.get("three", 10).is_some());

        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_after_invalidation_is_dropped() {
        let mut cache = SearchCache::new(Duration::from_secs(60), 16, Arc::new(ManualClock::new()));
        let before = cache.generation();
        cache.invalidate_all();
        assert!(!cache.insert_if_current(before, "derailment", 10, response("stale")));
        assert!(cache.get("derailment", 10).is_none());

        let current = cache.generation();
        assert!(cache.insert_if_current(current, "derailment", 10, response("fresh")));
        assert_eq!(cache.get("derailment", 10).unwrap().suggestions, vec!["fresh"]);
    }

    #[test]
    fn test_rate_limiter_window() {
        let clock = Arc::new(ManualClock::new());
        let mut limiter = RateLimiter::new(10, Duration::from_secs(5), clock.clone());
        for _ in 0..10 {
            assert!(limiter.check("alice"));
        }
        assert!(!limiter.check("alice"));
        assert!(limiter.check("bob"));

        clock.advance(Duration::from_secs(5));
        assert!(limiter.check("alice"));
    }
}
