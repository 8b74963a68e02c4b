use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::role::Role;
use super::tool::ToolCallRequest;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    pub created: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// Name of the agent that produced an assistant message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn new(role: Role) -> Self {
        Message {
            role,
            created: Utc::now().timestamp(),
            content: String::new(),
            tool_calls: Vec::new(),
            sender: None,
            tool_call_id: None,
            tool_name: None,
        }
    }

    /// Create a new system message with the current timestamp
    pub fn system() -> Self {
        Self::new(Role::System)
    }

    /// Create a new user message with the current timestamp
    pub fn user() -> Self {
        Self::new(Role::User)
    }

    /// Create a new assistant message with the current timestamp
    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Create the tool message answering the tool call `id`
    pub fn tool<I, N, C>(id: I, tool_name: N, content: C) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        C: Into<String>,
    {
        let mut message = Self::new(Role::Tool);
        message.tool_call_id = Some(id.into());
        message.tool_name = Some(tool_name.into());
        message.content = content.into();
        message
    }

    /// Set the text content of the message
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.content = text.into();
        self
    }

    /// Add a tool call to the message
    pub fn with_tool_call(mut self, tool_call: ToolCallRequest) -> Self {
        self.tool_calls.push(tool_call);
        self
    }

    pub fn with_sender<S: Into<String>>(mut self, sender: S) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}
