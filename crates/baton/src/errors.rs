use thiserror::Error;

use crate::providers::base::ProviderError;

/// Errors raised while dispatching a single tool call.
///
/// Argument and execution failures are reported back to the model as tool
/// messages. File, network and command failures are infrastructure faults
/// and end the run.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool {0} not found.")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("File operation failed: {0}")]
    FileOperation(String),

    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Command execution failed: {0}")]
    CommandExecution(String),
}

impl ToolError {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::FileOperation(_) | ToolError::Network(_) | ToolError::CommandExecution(_)
        )
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(err: reqwest::Error) -> Self {
        ToolError::Network(err.to_string())
    }
}

pub type ToolResult<T> = Result<T, ToolError>;

/// Errors that abort a run. No partial response is produced.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("File operation failed: {0}")]
    FileOperation(String),

    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Command execution failed: {0}")]
    CommandExecution(String),

    #[error("Tool {tool} returned a value that cannot be converted to text: {reason}")]
    ResultCoercion { tool: String, reason: String },

    #[error("Run failed: {0}")]
    Failed(#[source] anyhow::Error),
}

impl From<ToolError> for RunError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::FileOperation(msg) => RunError::FileOperation(msg),
            ToolError::Network(msg) => RunError::Network(msg),
            ToolError::CommandExecution(msg) => RunError::CommandExecution(msg),
            other => RunError::Failed(anyhow::Error::new(other)),
        }
    }
}

pub type RunResult<T> = Result<T, RunError>;
