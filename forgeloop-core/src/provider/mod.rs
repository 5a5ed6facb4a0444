//! Chat-completion transport
//!
//! Everything the oracle needs to send one prompt to a hosted or local model.
//! Only the OpenAI wire format is spoken; Groq, OpenAI, vLLM and Ollama all
//! accept it. `ProviderError` is transport-level and is turned into the
//! workspace `Error` by the oracle.

pub mod openai;

pub use openai::OpenAIProvider;

use crate::error::{Error, ErrorKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
        }
    }
}

/// A single-turn request. Unset fields fall back to the provider defaults.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Why the model stopped producing tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    /// Cut off by `max_tokens`; the code fence is probably left open
    Length,
    Other,
}

impl FinishReason {
    pub fn parse(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") | Some("eos") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            _ => FinishReason::Other,
        }
    }

    pub fn is_truncated(self) -> bool {
        self == FinishReason::Length
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

#[derive(Debug)]
pub enum ProviderError {
    /// Connection refused, DNS failure, reset mid-body
    Network(String),
    /// No answer within the configured number of seconds
    Timeout(u64),
    /// Non-success HTTP status other than 401 and 429
    Api { status: u16, message: String },
    /// The body was not a chat completion
    Parse(String),
    RateLimited { retry_after: Option<u64> },
    AuthenticationFailed,
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(reason) => write!(f, "could not reach provider: {}", reason),
            Self::Timeout(secs) => write!(f, "no answer after {}s", secs),
            Self::Api { status, message } if message.is_empty() => write!(f, "HTTP {}", status),
            Self::Api { status, message } => write!(f, "HTTP {}: {}", status, message),
            Self::Parse(reason) => write!(f, "unreadable completion: {}", reason),
            Self::RateLimited { retry_after: Some(secs) } => {
                write!(f, "rate limited, retry after {}s", secs)
            }
            Self::RateLimited { retry_after: None } => write!(f, "rate limited"),
            Self::AuthenticationFailed => write!(f, "API key rejected"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::NetworkFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::AuthenticationFailed => ErrorKind::AuthenticationFailed,
            Self::Api { status, .. } if *status >= 500 => ErrorKind::ProviderUnavailable,
            Self::Api { .. } | Self::Parse(_) | Self::Other(_) => ErrorKind::InferenceFailed,
        }
    }

    /// Wrap as a workspace error; the transport error stays as the source.
    pub fn into_error(self, provider: &str) -> Error {
        let mut err = Error::new(self.kind(), self.to_string()).with_context("provider", provider);
        if let Self::Api { status, .. } = &self {
            err = err.with_context("status", status.to_string());
        }
        err.set_source(self)
    }
}

#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Short provider name for logs and error context
    fn name(&self) -> &str;

    /// Model used when a request does not name one
    fn default_model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Groq,
    OpenAI,
    #[serde(alias = "ollama", alias = "vllm")]
    Local,
}

/// Where a provider lives and what it runs unless told otherwise
struct Preset {
    base_url: &'static str,
    model: &'static str,
    timeout_secs: u64,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Groq => "groq",
            ProviderType::OpenAI => "openai",
            ProviderType::Local => "local",
        }
    }

    /// Environment variable conventionally holding this provider's key
    pub fn key_env_var(&self) -> Option<&'static str> {
        match self {
            ProviderType::Groq => Some("GROQ_API_KEY"),
            ProviderType::OpenAI => Some("OPENAI_API_KEY"),
            ProviderType::Local => None,
        }
    }

    fn preset(&self) -> Preset {
        match self {
            ProviderType::Groq => Preset {
                base_url: "https://api.groq.com/openai/v1",
                model: "llama-3.3-70b-versatile",
                timeout_secs: 120,
            },
            ProviderType::OpenAI => Preset {
                base_url: "https://api.openai.com/v1",
                model: "gpt-4o",
                timeout_secs: 120,
            },
            // Local models on CPU can take minutes for a full program
            ProviderType::Local => Preset {
                base_url: "http://localhost:11434/v1",
                model: "qwen2.5-coder",
                timeout_secs: 300,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_type: ProviderType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    fn from_preset(provider_type: ProviderType, api_key: Option<String>) -> Self {
        let preset = provider_type.preset();
        Self {
            provider_type,
            api_key,
            base_url: Some(preset.base_url.to_string()),
            default_model: Some(preset.model.to_string()),
            timeout_secs: Some(preset.timeout_secs),
        }
    }

    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::from_preset(ProviderType::Groq, Some(api_key.into()))
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::from_preset(ProviderType::OpenAI, Some(api_key.into()))
    }

    /// An OpenAI-compatible server on this machine (Ollama, vLLM, llama.cpp)
    pub fn local(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self::from_preset(ProviderType::Local, None)
            .with_base_url(base_url)
            .with_model(model)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

/// Running token totals for one session
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub calls: usize,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, usage: &Usage) {
        self.calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens + self.completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_turn_request() {
        let request = CompletionRequest::new(vec![ChatMessage::user("Write a Fortran program")])
            .with_model("llama-3.3-70b-versatile")
            .with_max_tokens(1000);

        assert_eq!(request.messages[0].role, Role::User);
        assert_eq!(request.model.as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.temperature, None);
    }

    #[test]
    fn test_finish_reason() {
        assert!(FinishReason::parse(Some("length")).is_truncated());
        assert_eq!(FinishReason::parse(Some("stop")), FinishReason::Stop);
        assert_eq!(FinishReason::parse(None), FinishReason::Other);
    }

    #[test]
    fn test_presets() {
        let config = ProviderConfig::groq("gsk-test");
        assert_eq!(config.provider_type, ProviderType::Groq);
        assert_eq!(config.base_url.as_deref(), Some("https://api.groq.com/openai/v1"));
        assert_eq!(config.timeout_secs, Some(120));

        let config = ProviderConfig::local("http://localhost:8000/v1", "deepseek-coder").with_timeout(30);
        assert!(config.api_key.is_none());
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:8000/v1"));
        assert_eq!(config.default_model.as_deref(), Some("deepseek-coder"));
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn test_provider_type_keys() {
        assert_eq!(ProviderType::OpenAI.as_str(), "openai");
        assert_eq!(ProviderType::Groq.key_env_var(), Some("GROQ_API_KEY"));
        assert_eq!(ProviderType::Local.key_env_var(), None);
    }

    #[test]
    fn test_provider_error_mapping() {
        let err = ProviderError::RateLimited { retry_after: Some(3) }.into_error("groq");
        assert_eq!(err.kind(), ErrorKind::RateLimited);
        assert_eq!(err.message(), "rate limited, retry after 3s");
        assert!(err.is_retryable());

        let err = ProviderError::Api { status: 503, message: "overloaded".into() }.into_error("groq");
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert_eq!(err.context_value("status"), Some("503"));

        let err = ProviderError::Api { status: 400, message: String::new() }.into_error("groq");
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert_eq!(err.message(), "HTTP 400");

        let err = ProviderError::AuthenticationFailed.into_error("openai");
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(err.context_value("provider"), Some("openai"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_usage_tracker() {
        let mut tracker = UsageTracker::new();
        tracker.track(&Usage { prompt_tokens: 100, completion_tokens: 50, total_tokens: 150 });
        tracker.track(&Usage { prompt_tokens: 200, completion_tokens: 100, total_tokens: 300 });

        assert_eq!(tracker.calls, 2);
        assert_eq!(tracker.total_tokens(), 450);
    }
}
