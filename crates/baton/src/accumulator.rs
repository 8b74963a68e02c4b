use std::collections::BTreeMap;

use crate::models::message::Message;
use crate::models::tool::ToolCallRequest;
use crate::providers::base::CompletionChunk;

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Rebuilds one assistant message from streamed chunks, in arrival order.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, PartialCall>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &CompletionChunk) {
        if let Some(content) = &chunk.content {
            self.content.push_str(content);
        }

        for delta in &chunk.tool_calls {
            let call = self.tool_calls.entry(delta.index).or_default();
            if let Some(id) = delta.id.as_deref().filter(|id| !id.is_empty()) {
                call.id = id.to_string();
            }
            // Some servers repeat the full name on every delta
            if let Some(name) = delta.name.as_deref().filter(|_| call.name.is_empty()) {
                call.name = name.to_string();
            }
            if let Some(arguments) = &delta.arguments {
                call.arguments.push_str(arguments);
            }
        }
    }

    /// The accumulated assistant message, tool calls ordered by index
    pub fn finish(self) -> Message {
        let mut message = Message::assistant().with_text(self.content);
        for call in self.tool_calls.into_values() {
            message = message.with_tool_call(ToolCallRequest::new(call.id, call.name, call.arguments));
        }
        message
    }
}
