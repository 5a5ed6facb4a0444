//! The code-generating oracle
//!
//! `Oracle` is the seam the refinement loop talks to: one prompt in, one
//! text answer out, plus the wall-clock latency of the call. There is no
//! retry here; a failed call ends the session and the loop retries only by
//! sending a revised prompt.

use crate::error::{Error, Result};
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use std::time::{Duration, Instant};

/// One answer from the oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub latency: Duration,
}

impl Generation {
    pub fn new(text: impl Into<String>, latency: Duration) -> Self {
        Self {
            text: text.into(),
            latency,
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Oracle {
    /// Model identifier, used for the candidate header
    fn model(&self) -> &str;

    /// Ask the oracle for a completion of `prompt`
    async fn generate(&mut self, prompt: &str) -> Result<Generation>;
}

/// An `Oracle` backed by any chat-completion provider
pub struct ProviderOracle<P: LlmProvider> {
    provider: P,
    model: String,
    max_tokens: Option<usize>,
    temperature: Option<f32>,
    usage: UsageTracker,
}

impl<P: LlmProvider> ProviderOracle<P> {
    pub fn new(provider: P) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            model,
            max_tokens: None,
            temperature: None,
            usage: UsageTracker::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Token ceiling passed through to the service; not enforced locally.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    fn request(&self, prompt: &str) -> CompletionRequest {
        let mut request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_model(&self.model);
        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }
        request
    }
}

impl<P: LlmProvider> Oracle for ProviderOracle<P> {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&mut self, prompt: &str) -> Result<Generation> {
        let request = self.request(prompt);
        tracing::debug!(
            provider = self.provider.name(),
            model = %self.model,
            prompt_chars = prompt.len(),
            "sending prompt to oracle"
        );

        let start = Instant::now();
        let response = self.provider.complete(request).await;
        let latency = start.elapsed();

        let response = response.map_err(|e| {
            e.into_error(self.provider.name())
                .with_operation("oracle::generate")
                .with_context("model", self.model.clone())
        })?;

        self.usage.track(&response.usage);
        if response.finish_reason.is_truncated() {
            tracing::warn!(
                model = %self.model,
                max_tokens = ?self.max_tokens,
                "answer cut off at the token ceiling"
            );
        }
        tracing::debug!(
            latency_ms = latency.as_millis() as u64,
            completion_tokens = response.usage.completion_tokens,
            finish_reason = ?response.finish_reason,
            "oracle answered"
        );

        let text = response
            .content
            .ok_or_else(|| Error::empty_response(self.model.clone()).with_operation("oracle::generate"))?;

        Ok(Generation { text, latency })
    }
}
