//! # polyllm
//!
//! Multi-provider AI completion gateway core. One request API in front of
//! several LLM backends, with task-based routing, automatic fallback,
//! health tracking, cost and budget accounting, retries with a circuit
//! breaker, response caching and bounded streaming sessions.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use polyllm::{CompletionRequest, Gateway, GatewayConfig, Provider, TaskType};
//! use std::sync::Arc;
//!
//! # fn adapter() -> Arc<dyn polyllm::ProviderClient> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut gateway = Gateway::new(GatewayConfig::default());
//!     gateway.register_provider(Provider::Anthropic, adapter());
//!
//!     let request = CompletionRequest::new("Summarize this diff")
//!         .with_max_tokens(512);
//!     let response = gateway.complete_for_task(request, TaskType::Review).await?;
//!     println!("{}", response.text);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod utils;

// Re-export the main surface
pub use config::{
    BudgetConfig, CacheConfig, CircuitBreakerConfig, GatewayConfig, HealthConfig, PricingModel,
    ProviderSettings, RateLimitConfig, RetryConfig, RoutingConfig, RoutingMode, StreamingConfig,
    TaskRouting,
};
pub use crate::core::cache::tiered::{CacheTier, MultiTierCache};
pub use crate::core::cache::{cache_key, CacheStats, ResponseCache};
pub use crate::core::cost::{BudgetUsage, CostTracker};
pub use crate::core::gateway::{Gateway, GatewayStats};
pub use crate::core::health::{HealthCheckResult, HealthMonitor};
pub use crate::core::rate_limit::RateLimiter;
pub use crate::core::router::Router;
pub use crate::core::retry::circuit_breaker::{CircuitBreaker, CircuitState};
pub use crate::core::retry::{AdaptiveRetryPolicy, RetryPolicy};
pub use crate::core::streaming::sse::{SseEvent, SseParser};
pub use crate::core::streaming::{
    chunk_stream, StreamChunk, StreamManager, StreamSession, StreamState, StreamSummary,
};
pub use crate::core::traits::{ChunkStream, ProviderClient};
pub use crate::core::types::{
    CompletionRequest, CompletionResponse, Provider, TaskType, TokenUsage,
};
pub use utils::error::{GatewayError, PolicyError, ProviderError, Result, TransientError};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
