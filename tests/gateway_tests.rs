//! End-to-end gateway behavior against scripted provider adapters

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use polyllm::{
    ChunkStream, CircuitBreakerConfig, CompletionRequest, CompletionResponse, Gateway,
    GatewayConfig, GatewayError, HealthConfig, PolicyError, PricingModel, Provider,
    ProviderClient, ProviderError, ProviderSettings, Result, RetryConfig, StreamState,
    TaskRouting, TaskType, TokenUsage, TransientError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Adapter that replays a scripted outcome sequence, then a steady default
struct ScriptedClient {
    provider: Provider,
    script: Mutex<VecDeque<Result<CompletionResponse>>>,
    default: Result<CompletionResponse>,
    calls: AtomicU64,
}

impl ScriptedClient {
    fn succeeding(provider: Provider, text: &str) -> Arc<Self> {
        Arc::new(Self {
            provider,
            script: Mutex::new(VecDeque::new()),
            default: Ok(CompletionResponse::success(text, provider, 5)),
            calls: AtomicU64::new(0),
        })
    }

    fn failing(provider: Provider, error: GatewayError) -> Arc<Self> {
        Arc::new(Self {
            provider,
            script: Mutex::new(VecDeque::new()),
            default: Err(error),
            calls: AtomicU64::new(0),
        })
    }

    fn scripted(
        provider: Provider,
        script: Vec<Result<CompletionResponse>>,
        default: Result<CompletionResponse>,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            script: Mutex::new(script.into()),
            default,
            calls: AtomicU64::new(0),
        })
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderClient for ScriptedClient {
    fn name(&self) -> &'static str {
        self.provider.as_str()
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Adapter that streams a fixed chunk sequence, optionally pacing chunks
struct StreamingClient {
    provider: Provider,
    chunks: Vec<&'static str>,
    delay: Duration,
}

#[async_trait]
impl ProviderClient for StreamingClient {
    fn name(&self) -> &'static str {
        self.provider.as_str()
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<CompletionResponse> {
        Err(GatewayError::Internal("completion not scripted".to_string()))
    }

    async fn complete_streaming(&self, _request: &CompletionRequest) -> Result<ChunkStream> {
        let chunks: Vec<Result<String>> =
            self.chunks.iter().map(|c| Ok((*c).to_string())).collect();
        let delay = self.delay;
        Ok(futures::stream::iter(chunks)
            .then(move |chunk| async move {
                tokio::time::sleep(delay).await;
                chunk
            })
            .boxed())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn base_config() -> GatewayConfig {
    init_tracing();
    let mut config = GatewayConfig::default();
    for provider in [Provider::Anthropic, Provider::OpenAi, Provider::Ollama] {
        config
            .providers
            .insert(provider, ProviderSettings::default());
    }
    config.routing.task_routing.insert(
        TaskType::Completion,
        TaskRouting::new(Provider::Anthropic, Some(Provider::OpenAi)),
    );
    config.routing.fallback_chain = vec![Provider::Anthropic, Provider::OpenAi, Provider::Ollama];
    // Keep retries fast in tests
    config.retry = RetryConfig {
        max_attempts: 1,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        multiplier: 2.0,
        jitter: false,
    };
    config
}

fn connection_failed(provider: Provider) -> GatewayError {
    GatewayError::Transient(TransientError::ConnectionFailed {
        provider,
        message: "refused".to_string(),
    })
}

#[tokio::test]
async fn test_completion_routes_to_task_primary() {
    let mut gateway = Gateway::new(base_config());
    let primary = ScriptedClient::succeeding(Provider::Anthropic, "primary answer");
    let secondary = ScriptedClient::succeeding(Provider::OpenAi, "secondary answer");
    gateway.register_provider(Provider::Anthropic, primary.clone());
    gateway.register_provider(Provider::OpenAi, secondary.clone());

    let response = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.text, "primary answer");
    assert_eq!(response.provider, Provider::Anthropic);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);

    let stats = gateway.stats();
    assert_eq!(stats.requests, 1);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.fallbacks, 0);
}

#[tokio::test]
async fn test_fallback_on_provider_error() {
    let mut gateway = Gateway::new(base_config());
    let primary = ScriptedClient::failing(
        Provider::Anthropic,
        GatewayError::Provider(ProviderError::InvalidCredentials {
            provider: Provider::Anthropic,
        }),
    );
    let secondary = ScriptedClient::succeeding(Provider::OpenAi, "fallback answer");
    gateway.register_provider(Provider::Anthropic, primary.clone());
    gateway.register_provider(Provider::OpenAi, secondary.clone());

    let response = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.provider, Provider::OpenAi);
    assert_eq!(primary.calls(), 1);
    assert_eq!(gateway.stats().fallbacks, 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried_on_same_provider() {
    let mut config = base_config();
    config.retry.max_attempts = 3;
    let mut gateway = Gateway::new(config);
    let primary = ScriptedClient::scripted(
        Provider::Anthropic,
        vec![
            Err(connection_failed(Provider::Anthropic)),
            Err(connection_failed(Provider::Anthropic)),
        ],
        Ok(CompletionResponse::success(
            "third time lucky",
            Provider::Anthropic,
            5,
        )),
    );
    gateway.register_provider(Provider::Anthropic, primary.clone());

    let response = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.text, "third time lucky");
    assert_eq!(primary.calls(), 3);
    assert_eq!(gateway.stats().fallbacks, 0);
}

#[tokio::test]
async fn test_chain_exhaustion_returns_failure_response() {
    let mut gateway = Gateway::new(base_config());
    for provider in [Provider::Anthropic, Provider::OpenAi, Provider::Ollama] {
        gateway.register_provider(
            provider,
            ScriptedClient::failing(provider, connection_failed(provider)),
        );
    }

    let response = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap();

    assert!(!response.success);
    assert!(response.error.is_some());
    assert!(response.error.unwrap().contains("all providers failed"));
    assert_eq!(gateway.stats().failures, 1);
}

#[tokio::test]
async fn test_no_provider_configured_is_policy_error() {
    let mut config = base_config();
    for settings in config.providers.values_mut() {
        settings.enabled = false;
    }
    let gateway = Gateway::new(config);

    let err = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::Policy(PolicyError::NoProviderAvailable));
}

#[tokio::test]
async fn test_explicit_override_bypasses_routing() {
    let mut gateway = Gateway::new(base_config());
    let primary = ScriptedClient::succeeding(Provider::Anthropic, "primary");
    let pinned = ScriptedClient::succeeding(Provider::Ollama, "pinned");
    gateway.register_provider(Provider::Anthropic, primary.clone());
    gateway.register_provider(Provider::Ollama, pinned.clone());

    let request = CompletionRequest::new("hello").with_provider(Provider::Ollama);
    let response = gateway.complete(request).await.unwrap();

    assert_eq!(response.provider, Provider::Ollama);
    assert_eq!(primary.calls(), 0);
    assert_eq!(pinned.calls(), 1);
}

#[tokio::test]
async fn test_cache_serves_repeat_request_without_provider_call() {
    let mut gateway = Gateway::new(base_config());
    let primary = ScriptedClient::succeeding(Provider::Anthropic, "cached answer");
    gateway.register_provider(Provider::Anthropic, primary.clone());

    let request = CompletionRequest::new("same prompt").with_temperature(0.2);
    let first = gateway.complete(request.clone()).await.unwrap();
    let second = gateway.complete(request).await.unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(primary.calls(), 1);
    let stats = gateway.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}

#[tokio::test]
async fn test_budget_pause_rejects_further_requests() {
    let mut config = base_config();
    config.providers.insert(
        Provider::Anthropic,
        ProviderSettings {
            enabled: true,
            pricing: PricingModel::Token {
                input_per_million: 3.0,
                output_per_million: 15.0,
            },
            model: None,
        },
    );
    config.budget.daily_limit = 0.01;
    config.cache.enabled = false;
    let mut gateway = Gateway::new(config);
    let client = ScriptedClient::scripted(
        Provider::Anthropic,
        Vec::new(),
        Ok(
            CompletionResponse::success("expensive", Provider::Anthropic, 5)
                .with_usage(TokenUsage::new(1000, 500)),
        ),
    );
    gateway.register_provider(Provider::Anthropic, client.clone());

    // First request records $0.0105, crossing 95% of the $0.01 daily limit
    let response = gateway
        .complete(CompletionRequest::new("spend"))
        .await
        .unwrap();
    assert!(response.success);

    let err = gateway
        .complete(CompletionRequest::new("spend again"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Policy(PolicyError::BudgetExceeded { .. })
    ));
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_circuit_opens_and_rejects_override() {
    let mut config = base_config();
    config.circuit_breaker = CircuitBreakerConfig {
        failure_threshold: 2,
        timeout: Duration::from_secs(60),
    };
    config.cache.enabled = false;
    let mut gateway = Gateway::new(config);
    let client = ScriptedClient::failing(Provider::Ollama, connection_failed(Provider::Ollama));
    gateway.register_provider(Provider::Ollama, client.clone());

    // Two failing calls trip the breaker
    for _ in 0..2 {
        let request = CompletionRequest::new("boom").with_provider(Provider::Ollama);
        let _ = gateway.complete(request).await;
    }

    let request = CompletionRequest::new("boom").with_provider(Provider::Ollama);
    let err = gateway.complete(request).await.unwrap_err();
    assert_eq!(
        err,
        GatewayError::Policy(PolicyError::CircuitOpen {
            provider: Provider::Ollama
        })
    );
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn test_unhealthy_provider_is_skipped() {
    let mut config = base_config();
    config.health = HealthConfig {
        max_consecutive_failures: 3,
        ..Default::default()
    };
    // Breaker threshold above the health threshold so health gating acts first
    config.circuit_breaker.failure_threshold = 100;
    config.cache.enabled = false;
    let mut gateway = Gateway::new(config);
    let primary = ScriptedClient::failing(
        Provider::Anthropic,
        GatewayError::Provider(ProviderError::QuotaExceeded {
            provider: Provider::Anthropic,
            message: "out of credits".to_string(),
        }),
    );
    let secondary = ScriptedClient::succeeding(Provider::OpenAi, "backup");
    gateway.register_provider(Provider::Anthropic, primary.clone());
    gateway.register_provider(Provider::OpenAi, secondary.clone());

    for _ in 0..3 {
        let response = gateway
            .complete(CompletionRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(response.provider, Provider::OpenAi);
    }
    assert_eq!(primary.calls(), 3);
    assert!(!gateway.is_provider_healthy(Provider::Anthropic));

    // Now the primary is skipped without being invoked
    let response = gateway
        .complete(CompletionRequest::new("hello"))
        .await
        .unwrap();
    assert_eq!(response.provider, Provider::OpenAi);
    assert_eq!(primary.calls(), 3);
}

#[tokio::test]
async fn test_streaming_delivers_chunks_in_order() {
    let mut gateway = Gateway::new(base_config());
    gateway.register_provider(
        Provider::Anthropic,
        Arc::new(StreamingClient {
            provider: Provider::Anthropic,
            chunks: vec!["Hello", ", ", "world"],
            delay: Duration::ZERO,
        }),
    );

    let (session, receiver) = gateway
        .complete_streaming(CompletionRequest::new("stream"), TaskType::Chat)
        .await
        .unwrap();

    let collected: String = polyllm::chunk_stream(receiver)
        .take(3)
        .map(|chunk| chunk.data)
        .collect()
        .await;
    assert_eq!(collected, "Hello, world");

    // The pump finishes shortly after the last chunk is consumed
    for _ in 0..50 {
        if session.state() == StreamState::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.state(), StreamState::Completed);
    assert_eq!(gateway.active_streams(), 0);
}

#[tokio::test]
async fn test_streaming_cancellation_stops_delivery() {
    let mut gateway = Gateway::new(base_config());
    gateway.register_provider(
        Provider::Anthropic,
        Arc::new(StreamingClient {
            provider: Provider::Anthropic,
            chunks: vec!["a", "b", "c", "d"],
            delay: Duration::from_millis(40),
        }),
    );

    let (session, mut receiver) = gateway
        .complete_streaming(CompletionRequest::new("stream"), TaskType::Chat)
        .await
        .unwrap();

    let first = receiver.recv().await.expect("first chunk");
    assert_eq!(first.data, "a");
    session.cancel();
    assert_eq!(session.state(), StreamState::Cancelled);

    // Remaining buffered chunks may already be in flight, but the pump stops
    // and the session never completes
    for _ in 0..50 {
        if gateway.active_streams() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gateway.active_streams(), 0);
    assert_ne!(session.state(), StreamState::Completed);
}
