//! Multi-tier cache variant
//!
//! Three independently configured tiers with increasing TTLs. Reads walk the
//! tiers in TTL order and return the first hit; writes target an explicitly
//! chosen tier.

use super::{CacheStats, ResponseCache};
use crate::config::CacheConfig;
use crate::core::types::CompletionResponse;
use serde::{Deserialize, Serialize};

/// Tier selector, ordered by TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Short,
    Medium,
    Long,
}

impl CacheTier {
    const ORDER: [CacheTier; 3] = [CacheTier::Short, CacheTier::Medium, CacheTier::Long];
}

/// Three-tier cache
pub struct MultiTierCache {
    short: ResponseCache,
    medium: ResponseCache,
    long: ResponseCache,
}

impl MultiTierCache {
    pub fn new(short: &CacheConfig, medium: &CacheConfig, long: &CacheConfig) -> Self {
        Self {
            short: ResponseCache::new(short),
            medium: ResponseCache::new(medium),
            long: ResponseCache::new(long),
        }
    }

    fn tier(&self, tier: CacheTier) -> &ResponseCache {
        match tier {
            CacheTier::Short => &self.short,
            CacheTier::Medium => &self.medium,
            CacheTier::Long => &self.long,
        }
    }

    /// Read tiers in increasing-TTL order, returning the first hit
    pub fn get(&self, key: &str) -> Option<CompletionResponse> {
        CacheTier::ORDER
            .into_iter()
            .find_map(|tier| self.tier(tier).get(key))
    }

    /// Write into one explicit tier
    pub fn put(&self, tier: CacheTier, key: String, response: CompletionResponse) {
        self.tier(tier).put(key, response);
    }

    /// Drop expired entries from every tier
    pub fn clear_expired(&self) {
        for tier in CacheTier::ORDER {
            self.tier(tier).clear_expired();
        }
    }

    /// Drop everything from every tier
    pub fn clear(&self) {
        for tier in CacheTier::ORDER {
            self.tier(tier).clear();
        }
    }

    /// Per-tier statistics, in TTL order
    pub fn stats(&self) -> [(CacheTier, CacheStats); 3] {
        [
            (CacheTier::Short, self.short.stats()),
            (CacheTier::Medium, self.medium.stats()),
            (CacheTier::Long, self.long.stats()),
        ]
    }
}
