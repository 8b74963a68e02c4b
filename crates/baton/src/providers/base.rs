use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Provider API error: {0}")]
    Api(String),

    #[error("Context length exceeded. Message: {0}")]
    ContextLengthExceeded(String),

    #[error("Invalid completion request: {0}")]
    InvalidRequest(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// A provider-neutral chat completion request.
///
/// `messages` already carries the system message synthesized from the
/// agent's instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<String>,
    pub parallel_tool_calls: bool,
}

/// A fragment of a tool call in a streamed response, keyed by its index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionChunk {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallDelta>,
    pub finish_reason: Option<String>,
}

pub type CompletionStream = BoxStream<'static, Result<CompletionChunk, ProviderError>>;

/// Base trait for chat-completion providers. Implementations translate
/// requests and responses only; they do not retry or cache.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next assistant message in one shot
    async fn complete(&self, request: &CompletionRequest) -> Result<(Message, Usage), ProviderError>;

    /// Generate the next assistant message as a stream of chunks
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, ProviderError>;
}
