use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use super::base::{
    CompletionChunk, CompletionRequest, CompletionStream, Provider, ProviderError, ToolCallDelta,
    Usage,
};
use crate::models::message::Message;

/// A mock provider that returns pre-configured responses for testing and
/// records every request it receives
#[derive(Clone, Default)]
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    error: Option<String>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            ..Self::default()
        }
    }

    /// A provider whose every call fails with an API error
    pub fn failing<S: Into<String>>(error: S) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: &CompletionRequest) -> Result<Message, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(error) = &self.error {
            return Err(ProviderError::Api(error.clone()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok(Message::assistant().with_text(""))
        } else {
            Ok(responses.remove(0))
        }
    }
}

/// Split a message into the chunks a streaming provider would send: the
/// content in two halves, then each tool call as a header and two argument
/// fragments.
fn fragment(message: Message) -> Vec<CompletionChunk> {
    let mut chunks = Vec::new();

    let split = message
        .content
        .char_indices()
        .nth(message.content.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(message.content.len());
    let (head, tail) = message.content.split_at(split);
    for part in [head, tail] {
        if !part.is_empty() {
            chunks.push(CompletionChunk {
                content: Some(part.to_string()),
                ..CompletionChunk::default()
            });
        }
    }

    for (index, call) in message.tool_calls.into_iter().enumerate() {
        chunks.push(CompletionChunk {
            tool_calls: vec![ToolCallDelta {
                index,
                id: Some(call.id),
                name: Some(call.name),
                arguments: Some(String::new()),
            }],
            ..CompletionChunk::default()
        });
        let split = call
            .arguments
            .char_indices()
            .nth(call.arguments.chars().count() / 2)
            .map(|(i, _)| i)
            .unwrap_or(call.arguments.len());
        let (head, tail) = call.arguments.split_at(split);
        for part in [head, tail] {
            chunks.push(CompletionChunk {
                tool_calls: vec![ToolCallDelta {
                    index,
                    arguments: Some(part.to_string()),
                    ..ToolCallDelta::default()
                }],
                ..CompletionChunk::default()
            });
        }
    }

    chunks.push(CompletionChunk {
        finish_reason: Some("stop".to_string()),
        ..CompletionChunk::default()
    });
    chunks
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(Message, Usage), ProviderError> {
        Ok((self.next(request)?, Usage::default()))
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, ProviderError> {
        let chunks = fragment(self.next(request)?);
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}
