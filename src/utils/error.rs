//! Error handling for the gateway
//!
//! Errors are grouped into four categories so callers can pattern-match on the
//! category instead of individual error names: transient failures that are
//! worth retrying against the same provider, permanent provider failures that
//! warrant falling back to another provider, policy refusals that short-circuit
//! without consuming any retry budget, and internal failures.

use crate::core::types::Provider;
use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the gateway
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// Transient failures; retried against the same provider
    #[error("transient error: {0}")]
    Transient(#[from] TransientError),

    /// Permanent provider failures; not retried, but may trigger fallback
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Policy refusals; short-circuit without consuming a retry budget
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Internal failures; fatal for the current request only
    #[error("internal error: {0}")]
    Internal(String),
}

/// Transient, retryable failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransientError {
    /// Request to the provider timed out
    #[error("request to {provider} timed out after {timeout_ms}ms")]
    Timeout { provider: Provider, timeout_ms: u64 },

    /// Connection refused or reset by the provider
    #[error("connection to {provider} failed: {message}")]
    ConnectionFailed { provider: Provider, message: String },

    /// Provider returned a 5xx-class condition
    #[error("{provider} service unavailable: {message}")]
    ServiceUnavailable { provider: Provider, message: String },

    /// Provider-side rate limit hit
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: Provider, message: String },

    /// Streaming response ended before the terminal event
    #[error("stream from {provider} truncated after {chunks} chunks")]
    StreamTruncated { provider: Provider, chunks: u64 },
}

/// Permanent provider failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Credentials rejected by the provider
    #[error("invalid credentials for {provider}")]
    InvalidCredentials { provider: Provider },

    /// Account quota exhausted at the provider
    #[error("quota exceeded for {provider}: {message}")]
    QuotaExceeded { provider: Provider, message: String },

    /// Requested model does not exist at the provider
    #[error("model not found at {provider}: {model}")]
    ModelNotFound { provider: Provider, model: String },

    /// Response could not be understood
    #[error("malformed response from {provider}: {message}")]
    MalformedResponse { provider: Provider, message: String },
}

/// Policy refusals raised by the gateway itself
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// Every candidate provider is disabled or unconfigured
    #[error("no provider available for task")]
    NoProviderAvailable,

    /// Daily or monthly budget pause threshold reached
    #[error("budget exceeded: {message}")]
    BudgetExceeded { message: String },

    /// Circuit breaker is open for the provider
    #[error("circuit open for {provider}")]
    CircuitOpen { provider: Provider },

    /// Streaming session pool is at its concurrency cap
    #[error("too many concurrent streams (limit {limit})")]
    TooManyStreams { limit: usize },

    /// Local token-bucket limiter refused the request
    #[error("local rate limit exceeded for {provider}")]
    RateLimitExceeded { provider: Provider },
}

impl GatewayError {
    /// Whether the error is worth retrying against the same provider
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Whether the error should advance the fallback chain instead of
    /// aborting the request outright
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            GatewayError::Transient(_)
                | GatewayError::Provider(_)
                | GatewayError::Policy(PolicyError::CircuitOpen { .. })
                | GatewayError::Policy(PolicyError::RateLimitExceeded { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        let err = GatewayError::Transient(TransientError::Timeout {
            provider: Provider::Anthropic,
            timeout_ms: 30_000,
        });
        assert!(err.is_retryable());

        let err = GatewayError::Transient(TransientError::RateLimited {
            provider: Provider::OpenAi,
            message: "429".to_string(),
        });
        assert!(err.is_retryable());
    }

    #[test]
    fn test_provider_errors_are_not_retryable() {
        let err = GatewayError::Provider(ProviderError::InvalidCredentials {
            provider: Provider::Gemini,
        });
        assert!(!err.is_retryable());
        assert!(err.triggers_fallback());
    }

    #[test]
    fn test_policy_errors_short_circuit() {
        let err = GatewayError::Policy(PolicyError::BudgetExceeded {
            message: "daily limit".to_string(),
        });
        assert!(!err.is_retryable());
        assert!(!err.triggers_fallback());
    }

    #[test]
    fn test_circuit_open_triggers_fallback() {
        let err = GatewayError::Policy(PolicyError::CircuitOpen {
            provider: Provider::Xai,
        });
        assert!(!err.is_retryable());
        assert!(err.triggers_fallback());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Transient(TransientError::StreamTruncated {
            provider: Provider::Ollama,
            chunks: 7,
        });
        assert!(err.to_string().contains("truncated after 7 chunks"));
    }
}
