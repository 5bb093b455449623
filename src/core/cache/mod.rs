//! Content-addressable response cache with TTL and LRU eviction
//!
//! Keys are derived from the semantically relevant request fields via a
//! stable SHA-256 hash. `get` never returns an entry older than its TTL and
//! evicts stale entries when it finds them; `put` evicts the least recently
//! accessed entry once at capacity.

pub mod tiered;

pub use tiered::{CacheTier, MultiTierCache};

use crate::config::CacheConfig;
use crate::core::types::{CompletionRequest, CompletionResponse};
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Stable cache key for a request
///
/// Only fields that change the completion participate: prompt, explicit
/// provider override, temperature and max-tokens.
pub fn cache_key(request: &CompletionRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.prompt.as_bytes());
    if let Some(provider) = request.provider {
        hasher.update(provider.as_str().as_bytes());
    }
    if let Some(temperature) = request.temperature {
        hasher.update(temperature.to_bits().to_le_bytes());
    }
    if let Some(max_tokens) = request.max_tokens {
        hasher.update(max_tokens.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// One stored completion
#[derive(Debug, Clone)]
struct CacheEntry {
    response: CompletionResponse,
    created_at: Instant,
    ttl: Duration,
    access_count: u64,
    last_accessed: Instant,
}

impl CacheEntry {
    fn new(response: CompletionResponse, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            response,
            created_at: now,
            ttl,
            access_count: 0,
            last_accessed: now,
        }
    }

    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

/// Lock-free counters updated on the hot path
#[derive(Debug, Default)]
struct AtomicCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

/// Cache statistics snapshot
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`; zero before any lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU+TTL response cache
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
    stats: AtomicCacheStats,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity)
            .unwrap_or_else(|| NonZeroUsize::new(1).expect("1 is non-zero"));
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: config.ttl,
            stats: AtomicCacheStats::default(),
        }
    }

    /// Look up a response; stale entries are evicted and reported as misses
    ///
    /// Returns an owned clone so callers can never mutate cached state.
    pub fn get(&self, key: &str) -> Option<CompletionResponse> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                entry.access_count += 1;
                entry.last_accessed = Instant::now();
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %&key[..12.min(key.len())], "cache hit");
                return Some(entry.response.clone());
            }
        }
        // Absent, or present but past its TTL
        if entries.pop(key).is_some() {
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert a response, evicting the least recently accessed entry when at
    /// capacity
    pub fn put(&self, key: String, response: CompletionResponse) {
        let mut entries = self.entries.lock();
        let at_capacity = entries.len() == usize::from(entries.cap()) && !entries.contains(&key);
        if at_capacity {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        entries.push(key, CacheEntry::new(response, self.ttl));
    }

    /// Drop every entry past its TTL
    pub fn clear_expired(&self) {
        let mut entries = self.entries.lock();
        let stale: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            entries.pop(&key);
            self.stats.expirations.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Statistics snapshot
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            entries: self.entries.lock().len(),
        }
    }
}
