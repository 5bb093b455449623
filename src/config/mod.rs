//! Configuration model for the gateway
//!
//! Loading from files or environment variables is a caller concern; the
//! gateway consumes an already-constructed [`GatewayConfig`] value read-only.

use crate::core::types::{Provider, TaskType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Pricing model for a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum PricingModel {
    /// No per-request charge
    Free,
    /// Separate USD rates per million input and output tokens
    Token {
        input_per_million: f64,
        output_per_million: f64,
    },
    /// Flat recurring cost; tracked for reporting, not charged per request
    Subscription { monthly_cost: f64 },
    /// Caller-defined flat cost per request
    Custom { per_request: f64 },
}

impl PricingModel {
    /// Cost in USD for a completed request under this model
    pub fn request_cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        match self {
            PricingModel::Free | PricingModel::Subscription { .. } => 0.0,
            PricingModel::Token {
                input_per_million,
                output_per_million,
            } => {
                (input_tokens as f64 / 1_000_000.0) * input_per_million
                    + (output_tokens as f64 / 1_000_000.0) * output_per_million
            }
            PricingModel::Custom { per_request } => *per_request,
        }
    }
}

/// Per-provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether the provider participates in routing
    pub enabled: bool,
    /// Pricing model used by the cost tracker
    pub pricing: PricingModel,
    /// Default model identifier passed to the adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            pricing: PricingModel::Free,
            model: None,
        }
    }
}

/// (primary, optional fallback) provider pair for one task type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskRouting {
    pub primary: Provider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Provider>,
}

impl TaskRouting {
    pub fn new(primary: Provider, fallback: Option<Provider>) -> Self {
        Self { primary, fallback }
    }
}

/// Routing mode selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Per-task routing table with fallback chain (default)
    Task,
    /// Round-robin over the load-balance set
    RoundRobin,
}

/// Routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    pub mode: RoutingMode,
    /// Task-specific (primary, fallback) pairs
    pub task_routing: HashMap<TaskType, TaskRouting>,
    /// Ordered chain scanned when the task routing yields nothing
    pub fallback_chain: Vec<Provider>,
    /// Providers participating in round-robin mode
    pub load_balance: Vec<Provider>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RoutingMode::Task,
            task_routing: HashMap::new(),
            fallback_chain: vec![Provider::Anthropic, Provider::OpenAi, Provider::Ollama],
            load_balance: Vec::new(),
        }
    }
}

/// Health monitor thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Consecutive failures before a provider is unhealthy
    pub max_consecutive_failures: u32,
    /// Success-rate floor once enough requests were observed
    pub min_success_rate: f64,
    /// Requests required before the rate check applies
    pub min_requests_for_rate: u64,
    /// Skip unhealthy providers during orchestration
    pub auto_disable_on_failure: bool,
    /// Re-admit providers as soon as they test healthy again
    pub auto_enable_on_recovery: bool,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            min_success_rate: 0.5,
            min_requests_for_rate: 10,
            auto_disable_on_failure: true,
            auto_enable_on_recovery: true,
        }
    }
}

/// Budget limits and advisory thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Daily spend limit in USD
    pub daily_limit: f64,
    /// Monthly spend limit in USD
    pub monthly_limit: f64,
    /// Fraction of a limit at which to warn
    pub warn_threshold: f64,
    /// Fraction of a limit at which to pause
    pub pause_threshold: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            daily_limit: 10.0,
            monthly_limit: 100.0,
            warn_threshold: 0.8,
            pause_threshold: 0.95,
        }
    }
}

/// Retry backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Add ±25% jitter to computed delays
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// Cooldown before a half-open probe is allowed
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of entries
    pub capacity: usize,
    /// Time-to-live for entries
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            ttl: Duration::from_secs(300),
        }
    }
}

/// Streaming session pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Hard cap on concurrently active sessions
    pub max_concurrent_streams: usize,
    /// Channel capacity per session
    pub channel_capacity: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 16,
            channel_capacity: 64,
        }
    }
}

/// Local token-bucket rate limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_minute: 60,
            requests_per_hour: 1000,
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub providers: HashMap<Provider, ProviderSettings>,
    pub routing: RoutingConfig,
    pub health: HealthConfig,
    pub budget: BudgetConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub streaming: StreamingConfig,
    pub rate_limit: RateLimitConfig,
    /// Upper bound on a single outbound provider call
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            routing: RoutingConfig::default(),
            health: HealthConfig::default(),
            budget: BudgetConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            streaming: StreamingConfig::default(),
            rate_limit: RateLimitConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    /// Whether a provider is configuration-enabled
    pub fn is_enabled(&self, provider: Provider) -> bool {
        self.providers
            .get(&provider)
            .map(|p| p.enabled)
            .unwrap_or(false)
    }

    /// Pricing model for a provider; unconfigured providers price as free
    pub fn pricing(&self, provider: Provider) -> PricingModel {
        self.providers
            .get(&provider)
            .map(|p| p.pricing.clone())
            .unwrap_or(PricingModel::Free)
    }

    /// Enabled providers in declaration order
    pub fn enabled_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.is_enabled(*p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_pricing() {
        let pricing = PricingModel::Token {
            input_per_million: 3.0,
            output_per_million: 15.0,
        };
        let cost = pricing.request_cost(1000, 500);
        assert!((cost - 0.0105).abs() < 1e-4);
    }

    #[test]
    fn test_free_and_subscription_cost_nothing_per_request() {
        assert_eq!(PricingModel::Free.request_cost(1_000_000, 1_000_000), 0.0);
        let sub = PricingModel::Subscription { monthly_cost: 20.0 };
        assert_eq!(sub.request_cost(1_000_000, 1_000_000), 0.0);
    }

    #[test]
    fn test_unconfigured_provider_is_disabled() {
        let config = GatewayConfig::default();
        assert!(!config.is_enabled(Provider::Anthropic));
        assert!(config.enabled_providers().is_empty());
    }

    #[test]
    fn test_enabled_providers_follow_declaration_order() {
        let mut config = GatewayConfig::default();
        config
            .providers
            .insert(Provider::Ollama, ProviderSettings::default());
        config
            .providers
            .insert(Provider::Anthropic, ProviderSettings::default());

        assert_eq!(
            config.enabled_providers(),
            vec![Provider::Anthropic, Provider::Ollama]
        );
    }
}
