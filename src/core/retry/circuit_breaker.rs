//! Per-provider circuit breaker
//!
//! A fast binary gate evaluated before every call: `closed` in normal
//! operation, `open` after enough consecutive failures, `half_open` after the
//! cooldown, admitting exactly one probe. This counter is intentionally
//! separate from the health monitor's consecutive-failure statistic; the two
//! gate at different layers with independent thresholds.

use crate::config::CircuitBreakerConfig;
use crate::core::types::Provider;
use dashmap::DashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected until the cooldown elapses
    Open,
    /// One probe request is in flight
    HalfOpen,
}

#[derive(Debug)]
struct ProviderCircuit {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl Default for ProviderCircuit {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
        }
    }
}

/// Circuit breaker over all providers
pub struct CircuitBreaker {
    circuits: DashMap<Provider, ProviderCircuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            circuits: DashMap::new(),
            config,
        }
    }

    /// Whether a request to the provider may proceed
    ///
    /// When open and the cooldown has elapsed, transitions to half-open and
    /// admits exactly one probe; concurrent callers see half-open and are
    /// rejected until the probe resolves.
    pub fn allow_request(&self, provider: Provider) -> bool {
        let mut circuit = self.circuits.entry(provider).or_default();
        match circuit.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| at.elapsed() >= self.config.timeout)
                    .unwrap_or(false);
                if elapsed {
                    debug!(provider = %provider, "circuit transitioning to half-open, admitting probe");
                    circuit.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => false,
        }
    }

    /// Record a successful request; closes the circuit and resets the counter
    pub fn record_success(&self, provider: Provider) {
        let mut circuit = self.circuits.entry(provider).or_default();
        if circuit.state != CircuitState::Closed {
            debug!(provider = %provider, "circuit closing after successful probe");
        }
        circuit.state = CircuitState::Closed;
        circuit.consecutive_failures = 0;
        circuit.opened_at = None;
    }

    /// Record a failed request; opens the circuit at the threshold, and
    /// reopens with a fresh timer when the half-open probe fails
    pub fn record_failure(&self, provider: Provider) {
        let mut circuit = self.circuits.entry(provider).or_default();
        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        provider = %provider,
                        failures = circuit.consecutive_failures,
                        "circuit opening"
                    );
                    circuit.state = CircuitState::Open;
                    circuit.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!(provider = %provider, "half-open probe failed, circuit reopening");
                circuit.state = CircuitState::Open;
                circuit.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Current state for a provider; unknown providers are closed
    pub fn state(&self, provider: Provider) -> CircuitState {
        self.circuits
            .get(&provider)
            .map(|c| c.state)
            .unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            timeout,
        })
    }

    #[test]
    fn test_starts_closed_and_allows() {
        let breaker = breaker(3, Duration::from_secs(30));
        assert_eq!(breaker.state(Provider::Anthropic), CircuitState::Closed);
        assert!(breaker.allow_request(Provider::Anthropic));
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let breaker = breaker(3, Duration::from_secs(30));
        for _ in 0..3 {
            breaker.record_failure(Provider::OpenAi);
        }
        assert_eq!(breaker.state(Provider::OpenAi), CircuitState::Open);
        assert!(!breaker.allow_request(Provider::OpenAi));
        // A different provider keeps its own circuit
        assert!(breaker.allow_request(Provider::Gemini));
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let breaker = breaker(3, Duration::from_secs(30));
        breaker.record_failure(Provider::Xai);
        breaker.record_failure(Provider::Xai);
        assert_eq!(breaker.state(Provider::Xai), CircuitState::Closed);
        assert!(breaker.allow_request(Provider::Xai));
    }

    #[test]
    fn test_half_open_admits_exactly_one_probe() {
        let breaker = breaker(3, Duration::from_millis(10));
        for _ in 0..3 {
            breaker.record_failure(Provider::Anthropic);
        }
        std::thread::sleep(Duration::from_millis(20));

        // First call after cooldown becomes the probe
        assert!(breaker.allow_request(Provider::Anthropic));
        assert_eq!(breaker.state(Provider::Anthropic), CircuitState::HalfOpen);
        // Concurrent callers are rejected while the probe is outstanding
        assert!(!breaker.allow_request(Provider::Anthropic));
    }

    #[test]
    fn test_probe_success_closes_and_resets() {
        let breaker = breaker(3, Duration::from_millis(10));
        for _ in 0..3 {
            breaker.record_failure(Provider::Anthropic);
        }
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.allow_request(Provider::Anthropic));

        breaker.record_success(Provider::Anthropic);
        assert_eq!(breaker.state(Provider::Anthropic), CircuitState::Closed);
        // Counter was reset: two more failures do not reopen
        breaker.record_failure(Provider::Anthropic);
        breaker.record_failure(Provider::Anthropic);
        assert_eq!(breaker.state(Provider::Anthropic), CircuitState::Closed);
    }

    #[test]
    fn test_probe_failure_reopens_with_fresh_timer() {
        let breaker = breaker(3, Duration::from_millis(50));
        for _ in 0..3 {
            breaker.record_failure(Provider::Anthropic);
        }
        std::thread::sleep(Duration::from_millis(60));
        assert!(breaker.allow_request(Provider::Anthropic));

        breaker.record_failure(Provider::Anthropic);
        assert_eq!(breaker.state(Provider::Anthropic), CircuitState::Open);
        // Fresh timer: a request right away is still rejected
        assert!(!breaker.allow_request(Provider::Anthropic));
    }

    #[test]
    fn test_success_in_closed_state_resets_counter() {
        let breaker = breaker(3, Duration::from_secs(30));
        breaker.record_failure(Provider::Ollama);
        breaker.record_failure(Provider::Ollama);
        breaker.record_success(Provider::Ollama);
        breaker.record_failure(Provider::Ollama);
        breaker.record_failure(Provider::Ollama);
        assert_eq!(breaker.state(Provider::Ollama), CircuitState::Closed);
    }
}
