use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::prompt_template::render_instructions;

/// Key-value state threaded through a run, visible to instructions and tools.
pub type ContextVariables = HashMap<String, Value>;

pub type InstructionsFn = Arc<dyn Fn(&ContextVariables) -> String + Send + Sync>;

/// The system prompt of an agent, resolved once per completion request.
#[derive(Clone)]
pub enum Instructions {
    Static(String),
    /// A tera template rendered with the context variables
    Template(String),
    Computed(InstructionsFn),
}

impl Instructions {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        Instructions::Computed(Arc::new(f))
    }

    pub fn resolve(&self, context: &ContextVariables) -> Result<String, tera::Error> {
        match self {
            Instructions::Static(text) => Ok(text.clone()),
            Instructions::Template(template) => render_instructions(template, context),
            Instructions::Computed(f) => Ok(f(context)),
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Instructions::Static("You are a helpful agent.".to_string())
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Static(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Static(text)
    }
}

impl PartialEq for Instructions {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Instructions::Static(a), Instructions::Static(b)) => a == b,
            (Instructions::Template(a), Instructions::Template(b)) => a == b,
            (Instructions::Computed(a), Instructions::Computed(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instructions::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Instructions::Template(text) => f.debug_tuple("Template").field(text).finish(),
            Instructions::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

/// A named model, prompt and toolset that can act in a conversation.
///
/// Agents are plain configuration. The run loop owns the active one and
/// swaps it when a tool hands the conversation off.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub name: String,
    pub model: String,
    pub instructions: Instructions,
    /// Names of the registered tools this agent may call, in the order they
    /// are offered to the model
    pub functions: Vec<String>,
    pub tool_choice: Option<String>,
    pub parallel_tool_calls: bool,
}

impl Agent {
    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions<I: Into<Instructions>>(mut self, instructions: I) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_function<S: Into<String>>(mut self, name: S) -> Self {
        self.functions.push(name.into());
        self
    }

    pub fn with_functions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_tool_choice<S: Into<String>>(mut self, tool_choice: S) -> Self {
        self.tool_choice = Some(tool_choice.into());
        self
    }

    pub fn with_parallel_tool_calls(mut self, parallel: bool) -> Self {
        self.parallel_tool_calls = parallel;
        self
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: "Agent".to_string(),
            model: "gpt-4o".to_string(),
            instructions: Instructions::default(),
            functions: Vec::new(),
            tool_choice: None,
            parallel_tool_calls: true,
        }
    }
}
