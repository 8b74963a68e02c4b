use anyhow::{anyhow, Context, Result};
use baton::agent::{Agent, ContextVariables};
use baton::config::Settings;
use baton::models::message::Message;
use baton::providers::openai::OpenAiProvider;
use baton::sandbox::{builtin_registry, BUILTIN_TOOLS};
use baton::swarm::{RunEvent, RunOptions, Swarm};
use futures::StreamExt;
use serde_json::Value;
use std::io::{self, Write};

use crate::render;
use crate::RunArgs;

const INSTRUCTIONS: &str = "You are a helpful agent working inside a sandbox directory. \
Use the available tools to inspect files, fetch documents and run commands when needed.";

/// Parse `KEY=VALUE` pairs; values that are valid JSON keep their type.
pub fn parse_context(pairs: &[String]) -> Result<ContextVariables> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Context variable '{}' must look like KEY=VALUE", pair))?;
            if key.is_empty() {
                return Err(anyhow!("Context variable '{}' has an empty key", pair));
            }
            let value = serde_json::from_str::<Value>(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            Ok((key.to_string(), value))
        })
        .collect()
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let settings = Settings::new().context("Failed to load configuration")?;

    let provider = OpenAiProvider::new(settings.provider.provider_config())
        .context("Failed to create the completion provider")?;
    let registry =
        builtin_registry(&settings.sandbox).context("Failed to set up the sandbox tools")?;
    let swarm = Swarm::with_config(
        Box::new(provider),
        registry,
        settings.sandbox.swarm_config(),
    );

    let agent = Agent::new("default")
        .with_model(settings.provider.model.clone())
        .with_instructions(INSTRUCTIONS)
        .with_functions(BUILTIN_TOOLS);

    let mut options = RunOptions::default()
        .with_context_variables(parse_context(&args.context)?)
        .with_stream(args.stream)
        .with_execute_tools(!args.no_tools);
    if let Some(model) = args.model {
        options = options.with_model_override(model);
    }
    if let Some(max_turns) = args.max_turns {
        options = options.with_max_turns(max_turns);
    }

    let mut events = swarm.run_stream(agent, vec![Message::user().with_text(&args.prompt)], options);
    while let Some(event) = events.next().await {
        match event? {
            RunEvent::DeltaStart => {}
            RunEvent::Delta(chunk) => {
                if let Some(content) = chunk.content {
                    print!("{}", content);
                    io::stdout().flush()?;
                }
            }
            RunEvent::DeltaEnd => println!(),
            RunEvent::Message(message) => render::render_message(&message, args.stream),
            RunEvent::Response(response) => render::render_summary(&response),
        }
    }

    Ok(())
}
