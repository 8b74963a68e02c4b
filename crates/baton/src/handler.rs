use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::agent::{Agent, ContextVariables};
use crate::errors::{ToolError, ToolResult};

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Float,
    Boolean,
    Array,
    String,
    Untyped,
}

impl ParamKind {
    /// The JSON schema type advertised to the model
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::Integer | ParamKind::Float => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::String | ParamKind::Untyped => "string",
        }
    }

    /// Whether a JSON argument value can be bound to this parameter
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamKind::Integer => value.as_f64().is_some_and(|f| f.fract() == 0.0),
            ParamKind::Float => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::String => value.is_string(),
            ParamKind::Untyped => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    pub description: Option<String>,
}

impl Parameter {
    pub fn new<S: Into<String>>(name: S, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Name, documentation and ordered parameter list of a callable tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
}

impl ToolDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn param(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }
}

/// Arguments of one tool call, already checked against the descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> ToolResult<&str> {
        self.opt_str(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{}' argument", name)))
    }

    pub fn opt_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.0.get(name).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Deserialize all arguments into a typed struct
    pub fn parse<T: DeserializeOwned>(&self) -> ToolResult<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// Read-only snapshot of the run state handed to a tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    context_variables: Arc<ContextVariables>,
    agent: Arc<Agent>,
}

impl ToolContext {
    pub fn new(context_variables: Arc<ContextVariables>, agent: Arc<Agent>) -> Self {
        Self {
            context_variables,
            agent,
        }
    }

    pub fn context_variables(&self) -> &ContextVariables {
        &self.context_variables
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context_variables.get(key)
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

/// The uniform result envelope of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub value: String,
    pub agent: Option<Agent>,
    pub context_variables: ContextVariables,
}

impl ToolOutput {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_context_variable<K: Into<String>>(mut self, key: K, value: Value) -> Self {
        self.context_variables.insert(key.into(), value);
        self
    }
}

/// What a tool returns before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    Value(String),
    /// Arbitrary JSON, coerced to text by the executor
    Json(Value),
    /// Hand the conversation to another agent
    Handoff(Agent),
    Structured(ToolOutput),
}

impl From<String> for ToolOutcome {
    fn from(value: String) -> Self {
        ToolOutcome::Value(value)
    }
}

impl From<&str> for ToolOutcome {
    fn from(value: &str) -> Self {
        ToolOutcome::Value(value.to_string())
    }
}

impl From<Agent> for ToolOutcome {
    fn from(agent: Agent) -> Self {
        ToolOutcome::Handoff(agent)
    }
}

impl From<ToolOutput> for ToolOutcome {
    fn from(output: ToolOutput) -> Self {
        ToolOutcome::Structured(output)
    }
}

/// A named function the model can invoke.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    async fn call(&self, arguments: ToolArguments, context: ToolContext)
        -> ToolResult<ToolOutcome>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnTool<F> {
    descriptor: ToolDescriptor,
    f: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<ToolOutcome>> + Send,
{
    pub fn new(descriptor: ToolDescriptor, f: F) -> Self {
        Self { descriptor, f }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync,
    Fut: Future<Output = ToolResult<ToolOutcome>> + Send,
{
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(
        &self,
        arguments: ToolArguments,
        context: ToolContext,
    ) -> ToolResult<ToolOutcome> {
        (self.f)(arguments, context).await
    }
}

/// A tool that hands the conversation to `target`.
pub fn transfer_to(target: Agent) -> impl ToolHandler {
    let descriptor = ToolDescriptor::new(format!("transfer_to_{}", target.name))
        .with_description(format!("Transfer the conversation to {}.", target.name));
    FnTool::new(descriptor, move |_, _| {
        let target = target.clone();
        async move { Ok(ToolOutcome::Handoff(target)) }
    })
}
