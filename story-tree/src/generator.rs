//! Generation port.
//!
//! The growth engine asks a [`Generator`] for raw text and classifies the
//! answer itself. Retries, backoff and transport concerns stay on this side of
//! the port; the engine propagates every failure unchanged.

use crate::config::GeneratorConfig;
use async_trait::async_trait;
use claude::{Claude, Message, Request, StopReason};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub system_instruction: String,
    pub user_content: String,
    /// Upper bound for this call, enforced by the generator.
    pub timeout: Option<Duration>,
}

/// Errors from the generation service.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("generation timed out")]
    Timeout,

    #[error("generation API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("generator unavailable: {0}")]
    Unavailable(String),
}

impl From<claude::Error> for GeneratorError {
    fn from(err: claude::Error) -> Self {
        match err {
            claude::Error::Network(message) => GeneratorError::Transport(message),
            claude::Error::Timeout => GeneratorError::Timeout,
            claude::Error::RateLimited(message) => GeneratorError::RateLimited(message),
            claude::Error::Api { status, message } => GeneratorError::Api { status, message },
            other => GeneratorError::Unavailable(other.to_string()),
        }
    }
}

/// Produces raw continuation text for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GeneratorError>;
}

/// [`Generator`] backed by the Claude Messages API.
#[derive(Clone)]
pub struct ClaudeGenerator {
    client: Claude,
    config: GeneratorConfig,
}

impl ClaudeGenerator {
    pub fn new(client: Claude, config: GeneratorConfig) -> Self {
        Self { client, config }
    }

    /// Create a generator from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env(config: GeneratorConfig) -> Result<Self, GeneratorError> {
        Ok(Self::new(Claude::from_env()?, config))
    }

    fn build_request(&self, request: GenerationRequest) -> Request {
        let mut api_request = Request::new(vec![Message::user(request.user_content)])
            .with_system(request.system_instruction)
            .with_max_tokens(self.config.max_tokens);

        if let Some(ref model) = self.config.model {
            api_request = api_request.with_model(model);
        }
        if let Some(temperature) = self.config.temperature {
            api_request = api_request.with_temperature(temperature);
        }
        if let Some(timeout) = request.timeout {
            api_request = api_request.with_timeout(timeout);
        }
        api_request
    }
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GeneratorError> {
        let response = self.client.complete(self.build_request(request)).await?;

        if response.stop_reason == StopReason::MaxTokens {
            warn!(
                output_tokens = response.usage.output_tokens,
                "generation hit the token limit; the response is likely truncated"
            );
        }

        Ok(response.text())
    }
}
