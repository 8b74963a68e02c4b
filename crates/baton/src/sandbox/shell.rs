use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;

use super::SandboxRoot;
use crate::errors::{ToolError, ToolResult};
use crate::handler::{
    ParamKind, Parameter, ToolArguments, ToolContext, ToolDescriptor, ToolHandler, ToolOutcome,
};

/// Runs an allow-listed program inside the sandbox root.
///
/// The command line is split on whitespace and executed directly, without a
/// shell, so pipes, redirects and command chaining are not interpreted.
pub struct ShellCommand {
    root: Arc<SandboxRoot>,
    enabled: bool,
    allowed_commands: Vec<String>,
    descriptor: ToolDescriptor,
}

impl ShellCommand {
    pub fn new(root: Arc<SandboxRoot>, enabled: bool, allowed_commands: Vec<String>) -> Self {
        let descriptor = ToolDescriptor::new("execute_shell_command")
            .with_description(
                "Run a command in the sandbox directory and return its standard output. \
                Only allow-listed programs may be run.",
            )
            .param(
                Parameter::new("command", ParamKind::String)
                    .required()
                    .description("The command line to run, e.g. 'ls -la'."),
            );
        Self {
            root,
            enabled,
            allowed_commands,
            descriptor,
        }
    }

    fn check_allowed<'a>(&self, command: &'a str) -> ToolResult<(&'a str, Vec<&'a str>)> {
        if !self.enabled {
            return Err(ToolError::CommandExecution(
                "Shell command execution is disabled".to_string(),
            ));
        }

        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ToolError::InvalidArguments("Command is empty".to_string()))?;
        if !self.allowed_commands.iter().any(|allowed| allowed == program) {
            return Err(ToolError::CommandExecution(format!(
                "Command '{}' is not in the allow-list",
                program
            )));
        }
        Ok((program, parts.collect()))
    }
}

#[async_trait]
impl ToolHandler for ShellCommand {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments, _: ToolContext) -> ToolResult<ToolOutcome> {
        let command = arguments.str("command")?;
        let (program, args) = self.check_allowed(command)?;

        tracing::info!("Executing command: {}", command);
        let output = Command::new(program)
            .args(&args)
            .current_dir(self.root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                ToolError::CommandExecution(format!("Failed to execute '{}': {}", program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::CommandExecution(format!(
                "'{}' exited with {}: {}",
                command,
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(ToolOutcome::Value(stdout.trim().to_string()))
    }
}
