//! Abstract AI channel contract.
//!
//! The orchestrator never talks to a vendor directly: it consumes a
//! synchronous [`AiChannel`] that takes chat messages and returns content
//! plus usage counters. The concrete transport (HTTP client, local model,
//! test double) lives outside the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Credentials for a named vendor deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentCredentials {
    pub deployment_id: String,
    pub deployment_token: String,
}

/// A resolved deployment passed along with a request.
#[derive(Debug, Clone)]
pub struct DeploymentRef {
    /// Task name the credentials were registered under ("planning",
    /// "coding", ...).
    pub name: String,
    pub credentials: DeploymentCredentials,
}

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// When absent the channel is invoked without credentials and may
    /// degrade to a deterministic fallback.
    pub deployment: Option<DeploymentRef>,
}

/// A chat completion response with usage counters.
///
/// Channels that cannot report usage leave the counters at zero; the
/// orchestrator then falls back to its own estimates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub finish_reason: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Vendor-specific payload, if the channel keeps one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

impl ChatResponse {
    /// Build a response, normalizing the total token count from the
    /// prompt/completion split when it is absent.
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            finish_reason: "stop".to_string(),
            ..Self::default()
        }
    }

    /// Attach usage counters, filling in the total when zero.
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.prompt_tokens = prompt_tokens;
        self.completion_tokens = completion_tokens;
        if self.total_tokens == 0 {
            self.total_tokens = prompt_tokens + completion_tokens;
        }
        self
    }

    /// Whether the channel reported any usage counters at all.
    pub fn has_usage(&self) -> bool {
        self.prompt_tokens > 0 || self.completion_tokens > 0 || self.total_tokens > 0
    }

    /// Total tokens, derived from the split when not reported directly.
    pub fn total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// Error surfaced by a channel.
#[derive(Error, Debug, Clone)]
#[error("AI channel error: {0}")]
pub struct AiError(pub String);

impl AiError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

/// Synchronous chat channel to an AI vendor.
pub trait AiChannel {
    /// Run a chat completion to completion.
    fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError>;

    /// Streaming variant: deliver content deltas through `on_delta`, then
    /// return the final summary response.
    ///
    /// The default implementation delegates to [`AiChannel::chat`] and
    /// emits the whole content as a single delta.
    fn chat_stream(
        &self,
        request: &ChatRequest,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<ChatResponse, AiError> {
        let response = self.chat(request)?;
        on_delta(&response.content);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoChannel;

    impl AiChannel for EchoChannel {
        fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AiError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(ChatResponse::new(last, request.model.clone()).with_usage(10, 5))
        }
    }

    #[test]
    fn test_usage_normalization() {
        let response = ChatResponse::new("hi", "m").with_usage(10, 5);
        assert_eq!(response.total_tokens, 15);
        assert_eq!(response.total(), 15);
        assert!(response.has_usage());

        let empty = ChatResponse::new("hi", "m");
        assert!(!empty.has_usage());
        assert_eq!(empty.total(), 0);
    }

    #[test]
    fn test_default_stream_emits_single_delta() {
        let channel = EchoChannel;
        let request = ChatRequest {
            messages: vec![ChatMessage::user("stream me")],
            model: "m".to_string(),
            max_tokens: 128,
            temperature: 0.1,
            deployment: None,
        };

        let mut chunks = Vec::new();
        let response = channel
            .chat_stream(&request, &mut |delta| chunks.push(delta.to_string()))
            .unwrap();

        assert_eq!(chunks, vec!["stream me"]);
        assert_eq!(response.content, "stream me");
        assert_eq!(response.total(), 15);
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(ChatMessage::system("s").role, Role::System);
        assert_eq!(ChatMessage::user("u").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
    }
}
