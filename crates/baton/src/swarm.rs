use anyhow::anyhow;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

use crate::accumulator::StreamAccumulator;
use crate::agent::{Agent, ContextVariables};
use crate::errors::{RunError, RunResult};
use crate::executor::ToolExecutor;
use crate::models::message::Message;
use crate::providers::base::{CompletionChunk, CompletionRequest, Provider};
use crate::registry::ToolRegistry;

pub const DEFAULT_MAX_PARALLEL_TOOLS: usize = 8;

/// Settings fixed for the lifetime of a [`Swarm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmConfig {
    /// Upper bound on tool calls running at once within a turn
    pub max_parallel_tools: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_parallel_tools: DEFAULT_MAX_PARALLEL_TOOLS,
        }
    }
}

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub context_variables: ContextVariables,
    /// Use this model instead of the active agent's
    pub model_override: Option<String>,
    pub stream: bool,
    /// Completion calls allowed in this run; `None` is unbounded
    pub max_turns: Option<usize>,
    pub execute_tools: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            context_variables: ContextVariables::new(),
            model_override: None,
            stream: false,
            max_turns: None,
            execute_tools: true,
        }
    }
}

impl RunOptions {
    pub fn with_context_variables(mut self, context_variables: ContextVariables) -> Self {
        self.context_variables = context_variables;
        self
    }

    pub fn with_model_override<S: Into<String>>(mut self, model: S) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    pub fn with_execute_tools(mut self, execute_tools: bool) -> Self {
        self.execute_tools = execute_tools;
        self
    }
}

/// The outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Messages produced during the run, after the caller's history
    pub messages: Vec<Message>,
    /// The agent active when the run ended
    pub agent: Agent,
    pub context_variables: ContextVariables,
}

/// Progress of a run, as yielded by [`Swarm::run_stream`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// A streamed completion is starting
    DeltaStart,
    Delta(CompletionChunk),
    DeltaEnd,
    /// A message was appended to the history
    Message(Message),
    /// The run finished; always the last event
    Response(Response),
}

/// Drives conversations: calls the provider, dispatches tool calls and
/// follows hand-offs until the model stops asking for tools.
pub struct Swarm {
    provider: Box<dyn Provider>,
    executor: ToolExecutor,
}

impl Swarm {
    pub fn new(provider: Box<dyn Provider>, registry: ToolRegistry) -> Self {
        Self::with_config(provider, registry, SwarmConfig::default())
    }

    pub fn with_config(
        provider: Box<dyn Provider>,
        registry: ToolRegistry,
        config: SwarmConfig,
    ) -> Self {
        Self {
            provider,
            executor: ToolExecutor::new(Arc::new(registry), config.max_parallel_tools),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    fn build_request(
        &self,
        agent: &Agent,
        history: &[Message],
        context_variables: &ContextVariables,
        model_override: Option<&str>,
    ) -> RunResult<CompletionRequest> {
        let instructions = agent.instructions.resolve(context_variables).map_err(|e| {
            RunError::Failed(
                anyhow::Error::new(e)
                    .context(format!("Failed to render instructions for {}", agent.name)),
            )
        })?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system().with_text(instructions));
        messages.extend(history.iter().cloned());

        let tools = if agent.functions.is_empty() {
            Vec::new()
        } else {
            self.registry().tools_for(agent)
        };

        Ok(CompletionRequest {
            model: model_override
                .map(String::from)
                .unwrap_or_else(|| agent.model.clone()),
            messages,
            tools,
            tool_choice: agent.tool_choice.clone(),
            parallel_tool_calls: agent.parallel_tool_calls,
        })
    }

    /// Run a conversation, yielding every delta and message as it is produced.
    ///
    /// The last item is always [`RunEvent::Response`] unless the run fails,
    /// in which case the error is the last item.
    pub fn run_stream(
        &self,
        agent: Agent,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> BoxStream<'_, RunResult<RunEvent>> {
        Box::pin(async_stream::try_stream! {
            let RunOptions {
                mut context_variables,
                model_override,
                stream,
                max_turns,
                execute_tools,
            } = options;
            let max_turns = max_turns.unwrap_or(usize::MAX);
            let mut active = agent;
            let mut history = messages;
            let init_len = history.len();
            let mut turns = 0usize;

            while turns < max_turns {
                let request = self.build_request(
                    &active,
                    &history,
                    &context_variables,
                    model_override.as_deref(),
                )?;
                tracing::debug!(agent = %active.name, model = %request.model, turn = turns, "Requesting completion");

                let message = if stream {
                    yield RunEvent::DeltaStart;
                    let mut chunks = self.provider.stream(&request).await?;
                    let mut accumulator = StreamAccumulator::new();
                    while let Some(chunk) = chunks.next().await {
                        let chunk = chunk?;
                        accumulator.push(&chunk);
                        yield RunEvent::Delta(chunk);
                    }
                    yield RunEvent::DeltaEnd;
                    accumulator.finish()
                } else {
                    let (message, usage) = self.provider.complete(&request).await?;
                    tracing::debug!(?usage, "Completion usage");
                    message
                };
                let message = message.with_sender(active.name.clone());

                history.push(message.clone());
                turns += 1;
                yield RunEvent::Message(message.clone());

                if !message.has_tool_calls() || !execute_tools {
                    tracing::debug!(agent = %active.name, turns, "Ending turn");
                    break;
                }

                let batch = self
                    .executor
                    .execute_all(&message.tool_calls, &active, &context_variables)
                    .await?;

                for tool_message in batch.messages {
                    history.push(tool_message.clone());
                    yield RunEvent::Message(tool_message);
                }
                context_variables.extend(batch.context_variables);
                if let Some(next) = batch.agent {
                    tracing::info!(from = %active.name, to = %next.name, "Switching active agent");
                    active = next;
                }
            }

            yield RunEvent::Response(Response {
                messages: history.split_off(init_len),
                agent: active,
                context_variables,
            });
        })
    }

    /// Run a conversation to completion.
    pub async fn run(
        &self,
        agent: Agent,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> RunResult<Response> {
        let mut events = self.run_stream(agent, messages, options);
        while let Some(event) = events.next().await {
            if let RunEvent::Response(response) = event? {
                return Ok(response);
            }
        }
        Err(RunError::Failed(anyhow!("run ended without a response")))
    }

    /// Offload a whole run onto the runtime. Errors surface through the handle.
    pub fn spawn_run(
        self: &Arc<Self>,
        agent: Agent,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> RunHandle {
        let swarm = Arc::clone(self);
        RunHandle {
            inner: tokio::spawn(async move { swarm.run(agent, messages, options).await }),
        }
    }
}

/// Handle to a run started with [`Swarm::spawn_run`].
pub struct RunHandle {
    inner: JoinHandle<RunResult<Response>>,
}

impl RunHandle {
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl Future for RunHandle {
    type Output = RunResult<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(RunError::Failed(e.into())),
        })
    }
}
