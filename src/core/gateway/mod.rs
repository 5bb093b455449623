//! Gateway orchestrator
//!
//! Composes the router, health monitor, cost tracker, response cache,
//! circuit breaker, retry policy, rate limiter and stream pool into the
//! single entry point callers use. A completion walks: cache lookup,
//! budget gate, provider selection, per-candidate gating, invocation with
//! retries, accounting. Exhausting the fallback chain yields a failure
//! response rather than an error so callers always get a usable value.

use crate::config::GatewayConfig;
use crate::core::cache::{cache_key, CacheStats, ResponseCache};
use crate::core::cost::{BudgetUsage, CostTracker};
use crate::core::health::{HealthCheckResult, HealthMonitor};
use crate::core::rate_limit::RateLimiter;
use crate::core::retry::circuit_breaker::CircuitBreaker;
use crate::core::retry::AdaptiveRetryPolicy;
use crate::core::router::Router;
use crate::core::streaming::{StreamChunk, StreamManager, StreamSession};
use crate::core::traits::ProviderClient;
use crate::core::types::{
    estimate_tokens, CompletionRequest, CompletionResponse, Provider, TaskType,
};
use crate::utils::error::{GatewayError, PolicyError, Result, TransientError};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Fallback output-token estimate when the request carries no cap
const DEFAULT_OUTPUT_TOKENS: u64 = 512;

#[derive(Default)]
struct GatewayCounters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time snapshot of gateway counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fallbacks: u64,
}

/// Multi-provider completion gateway
pub struct Gateway {
    config: Arc<GatewayConfig>,
    clients: HashMap<Provider, Arc<dyn ProviderClient>>,
    router: Router,
    health: Arc<HealthMonitor>,
    cost: Arc<CostTracker>,
    cache: ResponseCache,
    breaker: Arc<CircuitBreaker>,
    retry: AdaptiveRetryPolicy,
    rate_limiter: RateLimiter,
    streams: Arc<StreamManager>,
    counters: GatewayCounters,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let config = Arc::new(config);
        Self {
            router: Router::new(Arc::clone(&config)),
            health: Arc::new(HealthMonitor::new(config.health.clone())),
            cost: Arc::new(CostTracker::new(Arc::clone(&config))),
            cache: ResponseCache::new(&config.cache),
            breaker: Arc::new(CircuitBreaker::new(config.circuit_breaker.clone())),
            retry: AdaptiveRetryPolicy::new(config.retry.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            streams: Arc::new(StreamManager::new(config.streaming.clone())),
            clients: HashMap::new(),
            counters: GatewayCounters::default(),
            config,
        }
    }

    /// Register a backend adapter for a provider
    pub fn register_provider(&mut self, provider: Provider, client: Arc<dyn ProviderClient>) {
        debug!(provider = %provider, adapter = client.name(), "provider registered");
        self.clients.insert(provider, client);
    }

    /// Health summaries for providers with a registered adapter, in
    /// canonical order
    pub fn list_providers(&self) -> Vec<HealthCheckResult> {
        Provider::ALL
            .into_iter()
            .filter(|p| self.clients.contains_key(p))
            .map(|p| self.health.health_of(p))
            .collect()
    }

    /// Complete a request as a generic completion task
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.complete_for_task(request, TaskType::Completion).await
    }

    /// Complete a request, routing by task type
    ///
    /// Returns `Err` only for policy violations that make the request itself
    /// unserviceable (budget pause, no provider configured, open circuit on
    /// an explicit override). Provider failures after a valid selection are
    /// reported as a failure response once the chain is exhausted.
    pub async fn complete_for_task(
        &self,
        request: CompletionRequest,
        task: TaskType,
    ) -> Result<CompletionResponse> {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let key = cache_key(&request);
        if self.config.cache.enabled {
            if let Some(cached) = self.cache.get(&key) {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(task = %task, "cache hit");
                return Ok(cached);
            }
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        // Budget pause is a hard gate; not even an explicit override passes it
        if self.cost.should_pause_budget() {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            let usage = self.cost.budget_usage();
            return Err(GatewayError::Policy(PolicyError::BudgetExceeded {
                message: format!(
                    "spending paused: daily {:.1}%, monthly {:.1}% of budget",
                    usage.daily * 100.0,
                    usage.monthly * 100.0
                ),
            }));
        }
        if self.cost.should_warn_budget() {
            let usage = self.cost.budget_usage();
            warn!(
                daily_pct = usage.daily * 100.0,
                monthly_pct = usage.monthly * 100.0,
                "budget warning threshold crossed"
            );
        }

        let is_override = request.provider.is_some();
        let selected = self.router.select_provider(task, request.provider)?;

        // An explicit override pins the request to one provider; otherwise
        // the fallback chain extends the candidate list.
        let mut candidates = vec![selected];
        if !is_override {
            candidates.extend(self.router.fallback_candidates(selected));
        }

        let estimated_tokens =
            estimate_tokens(&request.prompt) + request.max_tokens.map_or(DEFAULT_OUTPUT_TOKENS, u64::from);

        let mut last_error: Option<GatewayError> = None;
        for candidate in candidates {
            if let Some(error) = self.gate_candidate(candidate, is_override, estimated_tokens) {
                if is_override {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(error);
                }
                last_error = Some(error);
                continue;
            }

            let Some(client) = self.clients.get(&candidate) else {
                last_error = Some(GatewayError::Policy(PolicyError::NoProviderAvailable));
                continue;
            };

            match self.invoke_with_retry(client.as_ref(), candidate, &request).await {
                Ok(response) => {
                    if candidate != selected {
                        self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
                        info!(from = %selected, to = %candidate, "fallback succeeded");
                    }
                    self.counters.successes.fetch_add(1, Ordering::Relaxed);
                    self.account_success(candidate, &request, &response);
                    if self.config.cache.enabled {
                        self.cache.put(key, response.clone());
                    }
                    return Ok(response);
                }
                Err(error) => {
                    if !error.triggers_fallback() {
                        self.counters.failures.fetch_add(1, Ordering::Relaxed);
                        return Ok(CompletionResponse::failure(
                            candidate,
                            error.to_string(),
                            started.elapsed().as_millis() as u64,
                        ));
                    }
                    warn!(provider = %candidate, error = %error, "provider failed, trying next");
                    last_error = Some(error);
                }
            }
        }

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "all providers exhausted".to_string());
        Ok(CompletionResponse::failure(
            selected,
            format!("all providers failed: {message}"),
            started.elapsed().as_millis() as u64,
        ))
    }

    /// Start a streaming completion
    ///
    /// Chunks arrive on the returned receiver; the session handle exposes
    /// state and cancellation. The pump honors cancellation at the next
    /// chunk boundary, then drops the provider stream.
    pub async fn complete_streaming(
        &self,
        request: CompletionRequest,
        task: TaskType,
    ) -> Result<(Arc<StreamSession>, mpsc::Receiver<StreamChunk>)> {
        if self.cost.should_pause_budget() {
            return Err(GatewayError::Policy(PolicyError::BudgetExceeded {
                message: "spending paused by budget threshold".to_string(),
            }));
        }

        let is_override = request.provider.is_some();
        let provider = self.router.select_provider(task, request.provider)?;
        let estimated_tokens =
            estimate_tokens(&request.prompt) + request.max_tokens.map_or(DEFAULT_OUTPUT_TOKENS, u64::from);
        if let Some(error) = self.gate_candidate(provider, is_override, estimated_tokens) {
            return Err(error);
        }
        let client = self
            .clients
            .get(&provider)
            .cloned()
            .ok_or(GatewayError::Policy(PolicyError::NoProviderAvailable))?;

        let (session, receiver) = self.streams.create_stream(provider)?;
        session.mark_connecting();

        let upstream = match tokio::time::timeout(
            self.config.request_timeout,
            client.complete_streaming(&request),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) => {
                session.fail(error.to_string());
                self.streams.remove(session.id());
                self.health.record_failure(provider, error.to_string());
                self.breaker.record_failure(provider);
                return Err(error);
            }
            Err(_) => {
                let error = GatewayError::Transient(TransientError::Timeout {
                    provider,
                    timeout_ms: self.config.request_timeout.as_millis() as u64,
                });
                session.fail(error.to_string());
                self.streams.remove(session.id());
                self.health.record_failure(provider, error.to_string());
                self.breaker.record_failure(provider);
                return Err(error);
            }
        };

        let pump_session = Arc::clone(&session);
        let health = Arc::clone(&self.health);
        let cost = Arc::clone(&self.cost);
        let breaker = Arc::clone(&self.breaker);
        let streams = Arc::clone(&self.streams);
        tokio::spawn(async move {
            let mut upstream = upstream;
            let mut failed = None;
            while let Some(item) = upstream.next().await {
                if pump_session.is_cancelled() {
                    break;
                }
                match item {
                    Ok(data) => {
                        if pump_session.process_chunk(&data).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        failed = Some(error);
                        break;
                    }
                }
            }

            if let Some(error) = failed {
                let summary = pump_session.fail(error.to_string());
                health.record_failure(summary.provider, error.to_string());
                breaker.record_failure(summary.provider);
            } else if pump_session.is_cancelled() {
                debug!(session = %pump_session.id(), "stream pump stopped by cancellation");
            } else {
                let summary = pump_session.complete();
                health.record_success(summary.provider, summary.latency_ms);
                breaker.record_success(summary.provider);
                cost.record_request(summary.provider, 0, summary.total_tokens);
                info!(
                    session = %summary.session_id,
                    provider = %summary.provider,
                    chunks = summary.total_chunks,
                    "stream completed"
                );
            }
            streams.remove(pump_session.id());
        });

        Ok((session, receiver))
    }

    /// Check a candidate against circuit, health and rate gates
    ///
    /// Per-request routing gates (health, per-candidate budget) are skipped
    /// for explicit overrides; the circuit and rate gates always apply.
    fn gate_candidate(
        &self,
        provider: Provider,
        is_override: bool,
        estimated_tokens: u64,
    ) -> Option<GatewayError> {
        if !self.breaker.allow_request(provider) {
            return Some(GatewayError::Policy(PolicyError::CircuitOpen { provider }));
        }
        if !is_override {
            if self.config.health.auto_disable_on_failure && !self.health.is_healthy(provider) {
                debug!(provider = %provider, "skipping unhealthy provider");
                return Some(GatewayError::Transient(TransientError::ServiceUnavailable {
                    provider,
                    message: "marked unhealthy by the health monitor".to_string(),
                }));
            }
            if !self.cost.can_afford(provider, estimated_tokens) {
                return Some(GatewayError::Policy(PolicyError::BudgetExceeded {
                    message: format!("estimated cost for {provider} exceeds remaining budget"),
                }));
            }
        }
        if !self.rate_limiter.check(provider) {
            return Some(GatewayError::Policy(PolicyError::RateLimitExceeded {
                provider,
            }));
        }
        None
    }

    /// Invoke one provider with timeout and adaptive retries
    async fn invoke_with_retry(
        &self,
        client: &dyn ProviderClient,
        provider: Provider,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        let max_attempts = self.retry.base().max_attempts();
        let mut attempt = 0u32;
        loop {
            let outcome =
                match tokio::time::timeout(self.config.request_timeout, client.complete(request))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(GatewayError::Transient(TransientError::Timeout {
                        provider,
                        timeout_ms: self.config.request_timeout.as_millis() as u64,
                    })),
                };

            match outcome {
                Ok(response) => return Ok(response),
                Err(error) => {
                    self.health.record_failure(provider, error.to_string());
                    self.breaker.record_failure(provider);

                    let policy = self.retry.policy_for(&error);
                    if !error.is_retryable() || attempt + 1 >= policy.max_attempts().max(max_attempts)
                    {
                        return Err(error);
                    }
                    let delay = policy.delay(attempt);
                    debug!(
                        provider = %provider,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn account_success(
        &self,
        provider: Provider,
        request: &CompletionRequest,
        response: &CompletionResponse,
    ) {
        self.health.record_success(provider, response.latency_ms);
        self.breaker.record_success(provider);
        let (input, output) = match &response.usage {
            Some(usage) => (usage.input_tokens, usage.output_tokens),
            None => (
                estimate_tokens(&request.prompt),
                estimate_tokens(&response.text),
            ),
        };
        self.cost.record_request(provider, input, output);
    }

    /// Snapshot of request counters
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            fallbacks: self.counters.fallbacks.load(Ordering::Relaxed),
        }
    }

    pub fn is_provider_healthy(&self, provider: Provider) -> bool {
        self.health.is_healthy(provider)
    }

    pub fn all_health(&self) -> Vec<HealthCheckResult> {
        self.health.all_health()
    }

    pub fn health_report(&self) -> String {
        self.health.health_report()
    }

    pub fn budget_usage(&self) -> BudgetUsage {
        self.cost.budget_usage()
    }

    pub fn total_cost(&self) -> f64 {
        self.cost.total_cost()
    }

    pub fn cost_report(&self) -> String {
        self.cost.cost_report()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn active_streams(&self) -> usize {
        self.streams.active_count()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
