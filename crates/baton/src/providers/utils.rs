use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::base::{CompletionChunk, ProviderError, ToolCallDelta};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{Tool, ToolCallRequest};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Convert internal Message format to OpenAI's API message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role {
            Role::System | Role::User => json!({
                "role": message.role,
                "content": message.content,
            }),
            Role::Assistant => {
                let mut converted = json!({ "role": "assistant" });
                if !message.content.is_empty() || message.tool_calls.is_empty() {
                    converted["content"] = json!(message.content);
                } else {
                    converted["content"] = Value::Null;
                }
                if !message.tool_calls.is_empty() {
                    let tool_calls: Vec<Value> = message
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": sanitize_function_name(&call.name),
                                    "arguments": call.arguments,
                                }
                            })
                        })
                        .collect();
                    converted["tool_calls"] = json!(tool_calls);
                }
                converted
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id,
                "content": message.content,
            }),
        })
        .collect()
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>, ProviderError> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(ProviderError::InvalidRequest(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.parameters,
            }
        }));
    }

    Ok(result)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message, ProviderError> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(|c| c.as_str()) {
        message.content = text.to_string();
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(|t| t.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(name) {
                tracing::warn!(
                    function = %name,
                    "The provided function name had invalid characters, it must match [a-zA-Z0-9_-]+"
                );
            }
            message
                .tool_calls
                .push(ToolCallRequest::new(id, name, arguments));
        }
    }

    Ok(message)
}

/// Convert one streamed chunk into a provider-neutral delta
pub fn openai_chunk_to_delta(chunk: &Value) -> CompletionChunk {
    let choice = &chunk["choices"][0];
    let delta = &choice["delta"];

    let tool_calls = delta["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(position, call)| ToolCallDelta {
                    index: call["index"]
                        .as_u64()
                        .map(|i| i as usize)
                        .unwrap_or(position),
                    id: call["id"].as_str().map(String::from),
                    name: call["function"]["name"].as_str().map(String::from),
                    arguments: call["function"]["arguments"].as_str().map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    CompletionChunk {
        content: delta["content"].as_str().map(String::from),
        tool_calls,
        finish_reason: choice["finish_reason"].as_str().map(String::from),
    }
}

pub fn usage_from_response(data: &Value) -> super::base::Usage {
    let usage = &data["usage"];
    let input_tokens = usage["prompt_tokens"].as_i64().map(|v| v as i32);
    let output_tokens = usage["completion_tokens"].as_i64().map(|v| v as i32);
    let total_tokens = usage["total_tokens"]
        .as_i64()
        .map(|v| v as i32)
        .or_else(|| match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input + output),
            _ => None,
        });

    super::base::Usage::new(input_tokens, output_tokens, total_tokens)
}

fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

pub fn check_openai_context_length_error(error: &Value) -> Option<ProviderError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ProviderError::ContextLengthExceeded(message))
    } else {
        None
    }
}
