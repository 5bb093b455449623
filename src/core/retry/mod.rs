//! Retry classification and exponential backoff
//!
//! Delay follows `initial_delay * multiplier^attempt`, capped at `max_delay`,
//! with optional ±25% jitter so concurrent callers do not retry in lockstep.

pub mod circuit_breaker;

pub use circuit_breaker::{CircuitBreaker, CircuitState};

use crate::config::RetryConfig;
use crate::utils::error::GatewayError;
use rand::Rng;
use std::time::Duration;
use tracing::debug;

/// Retry policy with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum attempts before the last error surfaces to the caller
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Whether the error class is worth retrying against the same provider
    pub fn is_retryable(&self, error: &GatewayError) -> bool {
        error.is_retryable()
    }

    /// Backoff delay for a zero-based attempt number
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.unjittered_delay(attempt);
        if !self.config.jitter {
            return base;
        }
        // ±25% jitter
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base.as_millis() as f64 * factor) as u64)
    }

    /// Delay without jitter; exposed for deterministic assertions
    pub fn unjittered_delay(&self, attempt: u32) -> Duration {
        let millis =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(attempt as i32);
        let capped = millis.min(self.config.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Adaptive retry: tunes the base config per transient error class
///
/// Rate-limit errors get a longer initial delay and steeper multiplier;
/// timeouts get a shorter delay and a higher attempt budget.
#[derive(Debug, Clone)]
pub struct AdaptiveRetryPolicy {
    base: RetryConfig,
}

impl AdaptiveRetryPolicy {
    pub fn new(base: RetryConfig) -> Self {
        Self { base }
    }

    /// Untuned policy built from the base config
    pub fn base(&self) -> RetryPolicy {
        RetryPolicy::new(self.base.clone())
    }

    /// Policy tuned for one observed error
    pub fn policy_for(&self, error: &GatewayError) -> RetryPolicy {
        use crate::utils::error::TransientError;

        let config = match error {
            GatewayError::Transient(TransientError::RateLimited { .. }) => RetryConfig {
                initial_delay: self.base.initial_delay * 4,
                multiplier: self.base.multiplier * 1.5,
                ..self.base.clone()
            },
            GatewayError::Transient(TransientError::Timeout { .. }) => RetryConfig {
                initial_delay: self.base.initial_delay / 2,
                max_attempts: self.base.max_attempts + 2,
                ..self.base.clone()
            },
            _ => self.base.clone(),
        };

        debug!(
            attempts = config.max_attempts,
            initial_ms = config.initial_delay.as_millis() as u64,
            "selected adaptive retry policy"
        );
        RetryPolicy::new(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Provider;
    use crate::utils::error::{ProviderError, TransientError};

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(60_000),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_unjittered_delay_sequence() {
        let policy = RetryPolicy::new(config());
        let delays: Vec<u64> = (0..4)
            .map(|attempt| policy.unjittered_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000]);
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(config());
        assert_eq!(policy.unjittered_delay(10), Duration::from_millis(60_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut cfg = config();
        cfg.jitter = true;
        let policy = RetryPolicy::new(cfg);
        for _ in 0..50 {
            let ms = policy.delay(0).as_millis() as u64;
            assert!((750..=1250).contains(&ms), "jittered delay {} out of range", ms);
        }
    }

    #[test]
    fn test_retryable_classification() {
        let policy = RetryPolicy::new(config());
        let transient = GatewayError::Transient(TransientError::ConnectionFailed {
            provider: Provider::OpenAi,
            message: "reset".to_string(),
        });
        assert!(policy.is_retryable(&transient));

        let permanent = GatewayError::Provider(ProviderError::ModelNotFound {
            provider: Provider::OpenAi,
            model: "gpt-99".to_string(),
        });
        assert!(!policy.is_retryable(&permanent));
    }

    #[test]
    fn test_adaptive_rate_limit_backs_off_harder() {
        let adaptive = AdaptiveRetryPolicy::new(config());
        let err = GatewayError::Transient(TransientError::RateLimited {
            provider: Provider::Anthropic,
            message: "429".to_string(),
        });
        let policy = adaptive.policy_for(&err);
        assert_eq!(policy.unjittered_delay(0), Duration::from_millis(4000));
        // Steeper multiplier: 4000 * 3.0
        assert_eq!(policy.unjittered_delay(1), Duration::from_millis(12_000));
    }

    #[test]
    fn test_adaptive_timeout_retries_more_with_shorter_delay() {
        let adaptive = AdaptiveRetryPolicy::new(config());
        let err = GatewayError::Transient(TransientError::Timeout {
            provider: Provider::Anthropic,
            timeout_ms: 30_000,
        });
        let policy = adaptive.policy_for(&err);
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.unjittered_delay(0), Duration::from_millis(500));
    }

    #[test]
    fn test_adaptive_default_for_other_errors() {
        let adaptive = AdaptiveRetryPolicy::new(config());
        let err = GatewayError::Transient(TransientError::ServiceUnavailable {
            provider: Provider::Gemini,
            message: "503".to_string(),
        });
        let policy = adaptive.policy_for(&err);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.unjittered_delay(0), Duration::from_millis(1000));
    }
}
