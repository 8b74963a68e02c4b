use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::agent::Agent;
use crate::errors::{ToolError, ToolResult};
use crate::handler::{ToolArguments, ToolDescriptor, ToolHandler};
use crate::models::tool::Tool;

/// Describe a tool for the model. Never fails, and describing the same
/// descriptor twice gives the same spec.
pub fn describe(descriptor: &ToolDescriptor) -> Tool {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in &descriptor.parameters {
        let mut property = json!({ "type": param.kind.json_type() });
        if let Some(description) = &param.description {
            property["description"] = json!(description);
        }
        properties.insert(param.name.clone(), property);
        if param.required {
            required.push(json!(param.name));
        }
    }

    Tool::new(
        &descriptor.name,
        &descriptor.description,
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    )
}

/// Parse raw JSON arguments and check them against the declared parameters.
///
/// Undeclared arguments are dropped; an empty string is read as `{}`.
pub fn bind(descriptor: &ToolDescriptor, raw: &str) -> ToolResult<ToolArguments> {
    let raw = raw.trim();
    let parsed: Value = if raw.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_str(raw).map_err(|e| {
            ToolError::InvalidArguments(format!(
                "Could not parse arguments for {}: {}",
                descriptor.name, e
            ))
        })?
    };

    let mut given = match parsed {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(ToolError::InvalidArguments(format!(
                "Arguments for {} must be a JSON object, got {}",
                descriptor.name, other
            )))
        }
    };

    let mut bound = Map::new();
    for param in &descriptor.parameters {
        match given.remove(&param.name) {
            Some(Value::Null) | None if param.required => {
                return Err(ToolError::InvalidArguments(format!(
                    "Missing required argument '{}' for {}",
                    param.name, descriptor.name
                )));
            }
            Some(Value::Null) | None => {}
            Some(value) => {
                if !param.kind.accepts(&value) {
                    return Err(ToolError::InvalidArguments(format!(
                        "Argument '{}' for {} must be of type {}",
                        param.name,
                        descriptor.name,
                        param.kind.json_type()
                    )));
                }
                bound.insert(param.name.clone(), value);
            }
        }
    }

    if !given.is_empty() {
        tracing::debug!(
            tool = %descriptor.name,
            ignored = ?given.keys().collect::<Vec<_>>(),
            "Dropping undeclared tool arguments"
        );
    }

    Ok(ToolArguments::new(bound))
}

/// Maps tool names to the handlers that implement them.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its descriptor name, replacing any previous one
    pub fn register<H: ToolHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ToolHandler>) -> &mut Self {
        let name = handler.descriptor().name.clone();
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(tool = %name, "Replacing previously registered tool");
        }
        self
    }

    pub fn with<H: ToolHandler + 'static>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn describe(&self, name: &str) -> Option<Tool> {
        self.handlers.get(name).map(|h| describe(h.descriptor()))
    }

    /// Specs for the agent's functions, in the agent's order. Names that are
    /// not registered are skipped here and reported when the model calls them.
    /// A repeated name is offered once, at its first position.
    pub fn tools_for(&self, agent: &Agent) -> Vec<Tool> {
        let mut seen = HashSet::new();
        agent
            .functions
            .iter()
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| {
                let tool = self.describe(name);
                if tool.is_none() {
                    tracing::debug!(agent = %agent.name, tool = %name, "Agent lists an unregistered tool");
                }
                tool
            })
            .collect()
    }
}
