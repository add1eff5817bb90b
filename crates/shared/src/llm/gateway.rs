use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type LlmGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<LlmCompletion, LlmGatewayError>> + Send + 'a>>;

/// A single-prompt text completion request.
#[derive(Debug, Clone)]
pub struct LlmCompletionRequest {
    pub requester_id: Option<String>,
    pub prompt: String,
    pub temperature: f32,
}

impl LlmCompletionRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            requester_id: None,
            prompt: prompt.into(),
            temperature,
        }
    }

    pub fn with_requester_id(mut self, requester_id: impl AsRef<str>) -> Self {
        let trimmed = requester_id.as_ref().trim();
        if !trimmed.is_empty() {
            self.requester_id = Some(trimmed.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmTokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCompletion {
    pub model: String,
    pub provider_request_id: Option<String>,
    /// Completion text exactly as the provider returned it.
    pub text: String,
    pub usage: Option<LlmTokenUsage>,
}

#[derive(Debug, Error)]
pub enum LlmGatewayError {
    #[error("llm provider request timed out")]
    Timeout,
    #[error("llm provider request failed: {0}")]
    ProviderFailure(String),
    #[error("llm provider returned an invalid payload: {0}")]
    InvalidProviderPayload(String),
}

pub trait LlmGateway: Send + Sync {
    fn complete<'a>(&'a self, request: LlmCompletionRequest) -> LlmGatewayFuture<'a>;
}
