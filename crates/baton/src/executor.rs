use futures::future::join_all;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};

use crate::agent::{Agent, ContextVariables};
use crate::errors::{RunError, RunResult, ToolError};
use crate::handler::{ToolContext, ToolOutcome, ToolOutput};
use crate::models::message::Message;
use crate::models::tool::ToolCallRequest;
use crate::registry::{bind, ToolRegistry};

/// Aggregated result of all tool calls of one model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolBatch {
    /// One tool message per call, in submission order
    pub messages: Vec<Message>,
    /// Context updates, merged left to right
    pub context_variables: ContextVariables,
    /// Replacement agent, if any call handed off
    pub agent: Option<Agent>,
}

/// Per-call result before aggregation. Recovered errors become tool messages.
enum Dispatched {
    Output(ToolOutput),
    Recovered(String),
}

/// Resolves tool calls against the registry and runs them.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    max_parallel: usize,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, max_parallel: usize) -> Self {
        Self {
            registry,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute every call of one turn and aggregate the results.
    ///
    /// Calls run concurrently when the agent allows parallel tool calls and
    /// there is more than one; the aggregate is identical either way.
    pub async fn execute_all(
        &self,
        tool_calls: &[ToolCallRequest],
        agent: &Agent,
        context_variables: &ContextVariables,
    ) -> RunResult<ToolBatch> {
        let context = ToolContext::new(
            Arc::new(context_variables.clone()),
            Arc::new(agent.clone()),
        );

        let results = if agent.parallel_tool_calls && tool_calls.len() > 1 {
            self.execute_parallel(tool_calls, context).await?
        } else {
            // Each call still runs in its own task, so a panicking tool
            // fails the run the same way in both modes
            let mut results = Vec::with_capacity(tool_calls.len());
            for call in tool_calls {
                let handle = spawn_dispatch(&self.registry, call.clone(), context.clone(), None);
                results.push(joined(handle.await)?);
            }
            results
        };

        Ok(aggregate(tool_calls, results))
    }

    async fn execute_parallel(
        &self,
        tool_calls: &[ToolCallRequest],
        context: ToolContext,
    ) -> RunResult<Vec<Dispatched>> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        tracing::debug!(
            calls = tool_calls.len(),
            limit = self.max_parallel,
            "Dispatching tool calls in parallel"
        );

        let handles: Vec<_> = tool_calls
            .iter()
            .cloned()
            .map(|call| {
                spawn_dispatch(
                    &self.registry,
                    call,
                    context.clone(),
                    Some(Arc::clone(&semaphore)),
                )
            })
            .collect();

        // Gather everything before surfacing the first error, so no call is
        // left running detached from the run.
        let mut results = Vec::with_capacity(handles.len());
        for handle in join_all(handles).await {
            results.push(joined(handle));
        }
        results.into_iter().collect()
    }
}

fn spawn_dispatch(
    registry: &Arc<ToolRegistry>,
    call: ToolCallRequest,
    context: ToolContext,
    semaphore: Option<Arc<Semaphore>>,
) -> JoinHandle<RunResult<Dispatched>> {
    let registry = Arc::clone(registry);
    tokio::spawn(async move {
        let _permit = match semaphore {
            Some(semaphore) => Some(
                semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| RunError::Failed(e.into()))?,
            ),
            None => None,
        };
        dispatch(&registry, &call, context).await
    })
}

fn joined(result: Result<RunResult<Dispatched>, JoinError>) -> RunResult<Dispatched> {
    result.map_err(|e| {
        tracing::error!(error = %e, "Tool task did not complete");
        RunError::Failed(e.into())
    })?
}

async fn dispatch(
    registry: &ToolRegistry,
    call: &ToolCallRequest,
    context: ToolContext,
) -> RunResult<Dispatched> {
    let handler = match registry.get(&call.name) {
        Some(handler) if context.agent().has_function(&call.name) => handler,
        _ => {
            tracing::warn!(tool = %call.name, agent = %context.agent().name, "Tool not found");
            return Ok(Dispatched::Recovered(format!(
                "Error: {}",
                ToolError::NotFound(call.name.clone())
            )));
        }
    };

    let arguments = match bind(handler.descriptor(), &call.arguments) {
        Ok(arguments) => arguments,
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "Rejected tool arguments");
            return Ok(Dispatched::Recovered(format!("Error: {}", e)));
        }
    };

    tracing::info!(tool = %call.name, id = %call.id, "Executing tool call");
    match handler.call(arguments, context).await {
        Ok(outcome) => normalize(&call.name, outcome).map(Dispatched::Output),
        Err(e) if e.is_fatal() => Err(e.into()),
        Err(e) => {
            tracing::warn!(tool = %call.name, error = %e, "Tool call failed");
            Ok(Dispatched::Recovered(format!("Error: {}", e)))
        }
    }
}

/// Turn a raw tool outcome into the uniform envelope.
pub fn normalize(tool: &str, outcome: ToolOutcome) -> RunResult<ToolOutput> {
    match outcome {
        ToolOutcome::Value(value) => Ok(ToolOutput::new(value)),
        ToolOutcome::Structured(output) => Ok(output),
        ToolOutcome::Handoff(agent) => {
            Ok(ToolOutput::new(json!({ "assistant": agent.name }).to_string()).with_agent(agent))
        }
        ToolOutcome::Json(value) => coerce(tool, value).map(ToolOutput::new),
    }
}

fn coerce(tool: &str, value: Value) -> RunResult<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Null => Err(RunError::ResultCoercion {
            tool: tool.to_string(),
            reason: "the tool returned null".to_string(),
        }),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        other => serde_json::to_string(&other).map_err(|e| RunError::ResultCoercion {
            tool: tool.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn aggregate(tool_calls: &[ToolCallRequest], results: Vec<Dispatched>) -> ToolBatch {
    let mut batch = ToolBatch::default();

    for (call, result) in tool_calls.iter().zip(results) {
        match result {
            Dispatched::Recovered(content) => {
                batch
                    .messages
                    .push(Message::tool(&call.id, &call.name, content));
            }
            Dispatched::Output(output) => {
                batch
                    .messages
                    .push(Message::tool(&call.id, &call.name, output.value));
                batch.context_variables.extend(output.context_variables);
                if let Some(agent) = output.agent {
                    if let Some(previous) = &batch.agent {
                        tracing::warn!(
                            dropped = %previous.name,
                            kept = %agent.name,
                            "Multiple hand-offs in one turn, keeping the last in call order"
                        );
                    }
                    tracing::info!(tool = %call.name, agent = %agent.name, "Tool handed off the conversation");
                    batch.agent = Some(agent);
                }
            }
        }
    }

    batch
}
