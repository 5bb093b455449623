//! Core value types shared across the gateway
//!
//! Requests are immutable once constructed; responses are plain `Clone` values
//! so cached copies can never be mutated through a returned handle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend completion provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Anthropic,
    OpenAi,
    Gemini,
    Xai,
    Ollama,
    GithubCopilot,
}

impl Provider {
    /// All known providers, in declaration order
    pub const ALL: [Provider; 6] = [
        Provider::Anthropic,
        Provider::OpenAi,
        Provider::Gemini,
        Provider::Xai,
        Provider::Ollama,
        Provider::GithubCopilot,
    ];

    /// Stable lowercase identifier used in configs, logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
            Provider::Xai => "xai",
            Provider::Ollama => "ollama",
            Provider::GithubCopilot => "github_copilot",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            "xai" => Ok(Provider::Xai),
            "ollama" => Ok(Provider::Ollama),
            "github_copilot" | "copilot" => Ok(Provider::GithubCopilot),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Functional category of a request, used for routing preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Completion,
    Chat,
    Review,
    Explain,
    Refactor,
    CommitMessage,
    SemanticSearch,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Completion => "completion",
            TaskType::Chat => "chat",
            TaskType::Review => "review",
            TaskType::Explain => "explain",
            TaskType::Refactor => "refactor",
            TaskType::CommitMessage => "commit_message",
            TaskType::SemanticSearch => "semantic_search",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized completion request
///
/// Immutable once constructed; use [`CompletionRequest::new`] and the
/// builder-style setters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Prompt text
    pub prompt: String,
    /// Optional language hint (e.g. "rust", "python")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Explicit provider override; bypasses routing preference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// System prompt prepended by the provider adapter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl CompletionRequest {
    /// Create a request with only a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            language: None,
            provider: None,
            max_tokens: None,
            temperature: None,
            system_prompt: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Token usage reported by a provider adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Rough token estimate at ~4 characters per token, used when a provider
/// reports no usage
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as f64 / 4.0).ceil() as u64
}

/// Normalized completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Result text
    pub text: String,
    /// Provider that actually served the request
    pub provider: Provider,
    /// Confidence score in `[0.0, 1.0]`
    pub confidence: f32,
    /// Observed end-to-end latency in milliseconds
    pub latency_ms: u64,
    /// Whether the request ultimately succeeded
    pub success: bool,
    /// Error message when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Token usage when the adapter reports it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Build a successful response
    pub fn success(text: impl Into<String>, provider: Provider, latency_ms: u64) -> Self {
        Self {
            text: text.into(),
            provider,
            confidence: 1.0,
            latency_ms,
            success: true,
            error: None,
            usage: None,
        }
    }

    /// Build a failed response carrying the terminal error message
    pub fn failure(provider: Provider, error: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            text: String::new(),
            provider,
            confidence: 0.0,
            latency_ms,
            success: false,
            error: Some(error.into()),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}
