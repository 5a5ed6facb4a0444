//! OpenAI-compatible chat completions
//!
//! Groq, OpenAI, vLLM and Ollama all accept the same `/chat/completions`
//! wire format, so one client covers every configured provider.

use super::*;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub struct OpenAIProvider {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIProvider {
    pub fn new(config: ProviderConfig) -> crate::Result<Self> {
        let timeout = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout))
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::ProviderUnavailable, "failed to create HTTP client")
                    .with_operation("openai::new")
                    .with_context("provider", config.provider_type.as_str())
                    .set_source(e)
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatBody<'a> {
        ChatBody {
            model: request.model.as_deref().unwrap_or(self.default_model()),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

/// Map a non-success HTTP status to a provider error
fn status_error(status: StatusCode, retry_after: Option<u64>, body: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED => ProviderError::AuthenticationFailed,
        _ => ProviderError::Api {
            status: status.as_u16(),
            message: body,
        },
    }
}

impl LlmProvider for OpenAIProvider {
    fn name(&self) -> &str {
        self.config.provider_type.as_str()
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("gpt-4o")
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut http = self.client.post(self.endpoint()).json(&self.body(&request));
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(self.config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, retry_after, body));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        reply.into_response()
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ReplyChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ReplyChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

impl ChatReply {
    fn into_response(self) -> Result<CompletionResponse, ProviderError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("no choices in response".into()))?;

        Ok(CompletionResponse {
            id: self.id,
            model: self.model,
            content: choice.message.content,
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
            usage: self.usage.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_defaults() {
        let provider = OpenAIProvider::new(ProviderConfig::groq("gsk-test")).unwrap();
        assert_eq!(provider.name(), "groq");
        assert_eq!(provider.default_model(), "llama-3.3-70b-versatile");
        assert_eq!(provider.endpoint(), "https://api.groq.com/openai/v1/chat/completions");
    }

    #[test]
    fn test_body_skips_unset_fields() {
        let provider = OpenAIProvider::new(ProviderConfig::groq("gsk-test")).unwrap();
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]).with_max_tokens(1000);
        let json = serde_json::to_value(provider.body(&request)).unwrap();

        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_reply_parsing() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "model": "llama-3.3-70b-versatile",
            "choices": [{
                "message": {"role": "assistant", "content": "```fortran\nend\n```"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17}
        });
        let reply: ChatReply = serde_json::from_value(body).unwrap();
        let response = reply.into_response().unwrap();

        assert_eq!(response.content.as_deref(), Some("```fortran\nend\n```"));
        assert_eq!(response.usage.total_tokens, 17);
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[test]
    fn test_reply_without_choices() {
        let reply: ChatReply = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(matches!(reply.into_response(), Err(ProviderError::Other(_))));
    }

    #[test]
    fn test_status_errors() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(7), String::new()),
            ProviderError::RateLimited { retry_after: Some(7) }
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, String::new()),
            ProviderError::AuthenticationFailed
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, None, "upstream".into()),
            ProviderError::Api { status: 502, .. }
        ));
    }
}
