use anyhow::Result;
use async_trait::async_trait;
use baton::{
    agent::Agent,
    config::SandboxSettings,
    errors::{RunError, ToolError},
    handler::{
        transfer_to, FnTool, ParamKind, Parameter, ToolDescriptor, ToolHandler, ToolOutcome,
    },
    models::{message::Message, role::Role, tool::ToolCallRequest},
    providers::base::{CompletionRequest, CompletionStream, Provider, ProviderError, Usage},
    providers::{configs::OpenAiProviderConfig, openai::OpenAiProvider},
    registry::ToolRegistry,
    sandbox::builtin_registry,
    swarm::{RunOptions, Swarm, SwarmConfig},
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Replays a fixed script of assistant messages and records every request
#[derive(Clone, Default)]
struct ScriptedProvider {
    script: Arc<Mutex<Vec<Message>>>,
    seen: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Message>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script)),
            ..Self::default()
        }
    }

    fn seen(&self) -> Vec<CompletionRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<(Message, Usage), ProviderError> {
        self.seen.lock().unwrap().push(request.clone());
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            return Err(ProviderError::Api("script exhausted".to_string()));
        }
        Ok((script.remove(0), Usage::default()))
    }

    async fn stream(&self, _request: &CompletionRequest) -> Result<CompletionStream, ProviderError> {
        Err(ProviderError::InvalidRequest("streaming is not scripted".to_string()))
    }
}

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments.to_string())
}

fn sandbox_settings(root: &std::path::Path) -> SandboxSettings {
    SandboxSettings {
        root: root.to_string_lossy().into_owned(),
        ..SandboxSettings::default()
    }
}

#[tokio::test]
async fn list_files_then_answer() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("report.md"), "# Report")?;

    let provider = ScriptedProvider::new(vec![
        Message::assistant().with_tool_call(call("call_1", "list_files", json!({"dir": "."}))),
        Message::assistant().with_text("There is one report."),
    ]);
    let registry = builtin_registry(&sandbox_settings(dir.path()))?;
    let swarm = Swarm::new(Box::new(provider.clone()), registry);
    let agent = Agent::new("librarian").with_functions(["list_files", "read_file"]);

    let response = swarm
        .run(
            agent,
            vec![Message::user().with_text("What files are there?")],
            RunOptions::default(),
        )
        .await?;

    assert!(response.messages.len() >= 2);
    assert_eq!(response.messages[0].role, Role::Assistant);
    assert_eq!(response.messages[1].role, Role::Tool);
    assert_eq!(response.messages[1].content, r#"["report.md"]"#);
    assert_eq!(response.messages[1].tool_name.as_deref(), Some("list_files"));

    let seen = provider.seen();
    assert_eq!(seen.len(), 2);
    let names: Vec<&str> = seen[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["list_files", "read_file"]);
    Ok(())
}

#[tokio::test]
async fn path_escape_aborts_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let provider = ScriptedProvider::new(vec![
        Message::assistant()
            .with_tool_call(call("call_1", "read_file", json!({"path": "../../etc/passwd"}))),
        Message::assistant().with_text("never reached"),
    ]);
    let registry = builtin_registry(&sandbox_settings(dir.path()))?;
    let swarm = Swarm::new(Box::new(provider.clone()), registry);

    let err = swarm
        .run(
            Agent::new("reader").with_function("read_file"),
            vec![Message::user().with_text("Read the password file")],
            RunOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::FileOperation(_)));
    assert_eq!(provider.seen().len(), 1);
    Ok(())
}

fn sleepy() -> impl ToolHandler {
    FnTool::new(
        ToolDescriptor::new("sleepy")
            .param(Parameter::new("millis", ParamKind::Integer).required()),
        |args, _| async move {
            let millis = args
                .get("millis")
                .and_then(|v| v.as_u64())
                .ok_or_else(|| ToolError::InvalidArguments("millis".to_string()))?;
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok::<_, ToolError>(ToolOutcome::Value(format!("slept {}", millis)))
        },
    )
}

#[tokio::test]
async fn parallel_calls_keep_submission_order() -> Result<()> {
    let tool_calls = vec![
        call("a", "sleepy", json!({"millis": 60})),
        call("b", "sleepy", json!({"millis": 1})),
        call("c", "sleepy", json!({"millis": 30})),
    ];
    let mut script = Message::assistant();
    for tool_call in &tool_calls {
        script = script.with_tool_call(tool_call.clone());
    }

    for parallel in [true, false] {
        let provider = ScriptedProvider::new(vec![
            script.clone(),
            Message::assistant().with_text("rested"),
        ]);
        let registry = ToolRegistry::new().with(sleepy());
        let swarm = Swarm::with_config(
            Box::new(provider),
            registry,
            SwarmConfig {
                max_parallel_tools: 2,
            },
        );

        let response = swarm
            .run(
                Agent::new("sleeper")
                    .with_function("sleepy")
                    .with_parallel_tool_calls(parallel),
                vec![Message::user().with_text("nap")],
                RunOptions::default(),
            )
            .await?;

        let ids: Vec<Option<&str>> = response.messages[1..4]
            .iter()
            .map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec![Some("a"), Some("b"), Some("c")]);
        let contents: Vec<&str> = response.messages[1..4]
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["slept 60", "slept 1", "slept 30"]);
    }
    Ok(())
}

#[tokio::test]
async fn handoff_then_tool_on_new_agent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("invoice.txt"), "Total: 42 EUR")?;

    let billing = Agent::new("billing")
        .with_model("gpt-4o-mini")
        .with_function("read_file");
    let provider = ScriptedProvider::new(vec![
        Message::assistant().with_tool_call(call("t1", "transfer_to_billing", json!({}))),
        Message::assistant().with_tool_call(call("t2", "read_file", json!({"path": "invoice.txt"}))),
        Message::assistant().with_text("Your invoice total is 42 EUR."),
    ]);

    let mut registry = builtin_registry(&sandbox_settings(dir.path()))?;
    registry.register(transfer_to(billing.clone()));
    let swarm = Swarm::new(Box::new(provider.clone()), registry);
    let triage = Agent::new("triage").with_function("transfer_to_billing");

    let response = swarm
        .run(
            triage,
            vec![Message::user().with_text("How much do I owe?")],
            RunOptions::default(),
        )
        .await?;

    assert_eq!(response.agent, billing);
    let senders: Vec<Option<&str>> = response
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .map(|m| m.sender.as_deref())
        .collect();
    assert_eq!(senders, vec![Some("triage"), Some("billing"), Some("billing")]);
    assert_eq!(response.messages[3].content, "Total: 42 EUR");

    let seen = provider.seen();
    assert_eq!(seen[1].model, "gpt-4o-mini");
    assert_eq!(seen[1].tools.len(), 1);
    assert_eq!(seen[1].tools[0].name, "read_file");
    Ok(())
}

fn sse(events: &[serde_json::Value]) -> String {
    let mut body: String = events
        .iter()
        .map(|event| format!("data: {}\n\n", event))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn tool_fragment(index: usize, id: Option<&str>, name: Option<&str>, arguments: &str) -> serde_json::Value {
    let mut call = json!({"index": index, "function": {"arguments": arguments}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}, "finish_reason": null}]})
}

#[tokio::test]
async fn streamed_run_over_http_reassembles_tool_calls() -> Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("invoice.txt"), "Total: 42 EUR")?;

    let server = MockServer::start().await;
    let first = sse(&[
        tool_fragment(0, Some("call_1"), Some("read_file"), ""),
        tool_fragment(0, None, None, "{\"pa"),
        tool_fragment(0, None, None, "th\": \"invoice"),
        tool_fragment(0, None, None, ".txt\"}"),
    ]);
    let second = sse(&[
        json!({"choices": [{"index": 0, "delta": {"role": "assistant", "content": "You owe "}, "finish_reason": null}]}),
        json!({"choices": [{"index": 0, "delta": {"content": "42 EUR."}, "finish_reason": "stop"}]}),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(first, "text/event-stream"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(second, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new(OpenAiProviderConfig::new(server.uri(), "test_api_key"))?;
    let registry = builtin_registry(&sandbox_settings(dir.path()))?;
    let swarm = Swarm::new(Box::new(provider), registry);

    let response = swarm
        .run(
            Agent::new("reader").with_function("read_file"),
            vec![Message::user().with_text("How much do I owe?")],
            RunOptions::default().with_stream(true),
        )
        .await?;

    assert_eq!(response.messages.len(), 3);
    let tool_call = &response.messages[0].tool_calls[0];
    assert_eq!((tool_call.id.as_str(), tool_call.name.as_str()), ("call_1", "read_file"));
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&tool_call.arguments)?,
        json!({"path": "invoice.txt"})
    );
    assert_eq!(response.messages[1].content, "Total: 42 EUR");
    assert_eq!(response.messages[1].tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(response.messages[2].content, "You owe 42 EUR.");
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(2));
    Ok(())
}
