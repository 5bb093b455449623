//! Per-provider token-bucket rate limiter
//!
//! Refills at `requests_per_minute / 60` tokens per second, with a separate
//! hourly counter. Exhaustion is a local policy refusal; it causes fallback,
//! not retry.

use crate::config::RateLimitConfig;
use crate::core::types::Provider;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    hourly_count: u32,
    hourly_reset: Instant,
}

/// Rate limiter over all providers
pub struct RateLimiter {
    buckets: DashMap<Provider, TokenBucket>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    /// Try to take one token for the provider
    pub fn check(&self, provider: Provider) -> bool {
        if !self.config.enabled {
            return true;
        }
        let now = Instant::now();
        let mut bucket = self.buckets.entry(provider).or_insert_with(|| TokenBucket {
            tokens: self.config.requests_per_minute as f64,
            last_refill: now,
            hourly_count: 0,
            hourly_reset: now + Duration::from_secs(3600),
        });

        if now >= bucket.hourly_reset {
            bucket.hourly_count = 0;
            bucket.hourly_reset = now + Duration::from_secs(3600);
        }
        if bucket.hourly_count >= self.config.requests_per_hour {
            debug!(provider = %provider, "hourly rate limit reached");
            return false;
        }

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        let refill_rate = self.config.requests_per_minute as f64 / 60.0;
        bucket.tokens =
            (bucket.tokens + elapsed * refill_rate).min(self.config.requests_per_minute as f64);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            bucket.hourly_count += 1;
            true
        } else {
            debug!(provider = %provider, "per-minute rate limit reached");
            false
        }
    }
}
