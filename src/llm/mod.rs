//! LLM client module: a text-in/text-out completion capability.
//!
//! The research core only needs `complete(messages, options) -> text`. The
//! default implementation speaks the OpenAI chat-completions dialect, which
//! covers Moonshot, OpenRouter and most hosted models.

mod error;
mod openai;

pub use error::{classify_http_status, LlmError, LlmErrorKind, RetryConfig};
pub use openai::OpenAiCompatibleClient;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call generation options.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Sampling temperature; lower is more deterministic
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    /// Overrides the client's default per-call timeout
    pub timeout: Option<Duration>,
}

impl ChatOptions {
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Trait for LLM providers.
///
/// Implementations retry transient failures internally; an `Err` means the
/// call is treated as failed.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage], options: &ChatOptions) -> anyhow::Result<String>;
}
