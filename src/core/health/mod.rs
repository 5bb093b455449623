//! Per-provider rolling health statistics
//!
//! The monitor is a statistical routing signal: a provider is unhealthy once
//! it fails too many times in a row, or once its long-run success rate drops
//! below the configured floor. It is deliberately separate from the circuit
//! breaker, which is a fast binary gate with its own consecutive-failure
//! counter evaluated before every call.

use crate::config::HealthConfig;
use crate::core::types::Provider;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Mutable per-provider health state
///
/// Mutated only via `record_success` / `record_failure`; lives for the
/// process lifetime once created.
#[derive(Debug, Clone, Default)]
struct ProviderHealthState {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    consecutive_failures: u32,
    /// Cumulative latency over successful requests only
    total_latency_ms: u64,
    last_error: Option<String>,
    last_check: Option<DateTime<Utc>>,
}

/// Read-only health snapshot for one provider
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub provider: Provider,
    pub healthy: bool,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    /// Mean latency over successful requests; `None` until one succeeds
    pub avg_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

/// Health monitor over all providers
pub struct HealthMonitor {
    states: DashMap<Provider, ProviderHealthState>,
    config: HealthConfig,
}

impl HealthMonitor {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            states: DashMap::new(),
            config,
        }
    }

    /// Record a successful request and its latency
    ///
    /// Any success resets the consecutive-failure counter; historical totals
    /// feeding the rate computation are kept.
    pub fn record_success(&self, provider: Provider, latency_ms: u64) {
        let mut state = self.states.entry(provider).or_default();
        state.total_requests += 1;
        state.successful_requests += 1;
        state.consecutive_failures = 0;
        state.total_latency_ms += latency_ms;
        state.last_check = Some(Utc::now());
        debug!(provider = %provider, latency_ms, "recorded provider success");
    }

    /// Record a failed request with its error text
    pub fn record_failure(&self, provider: Provider, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.states.entry(provider).or_default();
        state.total_requests += 1;
        state.failed_requests += 1;
        state.consecutive_failures += 1;
        state.last_error = Some(message.clone());
        state.last_check = Some(Utc::now());

        if state.consecutive_failures == self.config.max_consecutive_failures {
            warn!(
                provider = %provider,
                failures = state.consecutive_failures,
                error = %message,
                "provider crossed consecutive-failure threshold"
            );
        }
    }

    /// Whether the provider is currently considered healthy
    ///
    /// Providers never observed are healthy by default.
    pub fn is_healthy(&self, provider: Provider) -> bool {
        match self.states.get(&provider) {
            None => true,
            Some(state) => {
                if state.consecutive_failures >= self.config.max_consecutive_failures {
                    return false;
                }
                if state.total_requests >= self.config.min_requests_for_rate {
                    let rate = state.successful_requests as f64 / state.total_requests as f64;
                    if rate < self.config.min_success_rate {
                        return false;
                    }
                }
                true
            }
        }
    }

    /// Snapshot of one provider's health
    pub fn health_of(&self, provider: Provider) -> HealthCheckResult {
        let healthy = self.is_healthy(provider);
        match self.states.get(&provider) {
            None => HealthCheckResult {
                provider,
                healthy,
                total_requests: 0,
                successful_requests: 0,
                failed_requests: 0,
                consecutive_failures: 0,
                success_rate: 1.0,
                avg_latency_ms: None,
                last_error: None,
                last_check: None,
            },
            Some(state) => {
                let success_rate = if state.total_requests == 0 {
                    1.0
                } else {
                    state.successful_requests as f64 / state.total_requests as f64
                };
                let avg_latency_ms = if state.successful_requests > 0 {
                    Some(state.total_latency_ms / state.successful_requests)
                } else {
                    None
                };
                HealthCheckResult {
                    provider,
                    healthy,
                    total_requests: state.total_requests,
                    successful_requests: state.successful_requests,
                    failed_requests: state.failed_requests,
                    consecutive_failures: state.consecutive_failures,
                    success_rate,
                    avg_latency_ms,
                    last_error: state.last_error.clone(),
                    last_check: state.last_check,
                }
            }
        }
    }

    /// Snapshots for every known provider
    pub fn all_health(&self) -> Vec<HealthCheckResult> {
        Provider::ALL
            .into_iter()
            .map(|provider| self.health_of(provider))
            .collect()
    }

    /// Human-readable multi-line report
    pub fn health_report(&self) -> String {
        let mut report = String::from("Provider health\n");
        for result in self.all_health() {
            let status = if result.healthy { "healthy" } else { "UNHEALTHY" };
            let latency = result
                .avg_latency_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                report,
                "  {:<16} {:<10} requests={} ok={} failed={} streak={} rate={:.0}% avg={}",
                result.provider,
                status,
                result.total_requests,
                result.successful_requests,
                result.failed_requests,
                result.consecutive_failures,
                result.success_rate * 100.0,
                latency
            );
        }
        report
    }
}
