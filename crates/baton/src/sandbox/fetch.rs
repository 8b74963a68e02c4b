use async_trait::async_trait;
use reqwest::Client;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::SandboxRoot;
use crate::errors::{ToolError, ToolResult};
use crate::handler::{
    ParamKind, Parameter, ToolArguments, ToolContext, ToolDescriptor, ToolHandler, ToolOutcome,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Downloads a document over HTTP, optionally saving it into the sandbox.
pub struct RetrieveDocument {
    root: Arc<SandboxRoot>,
    allowed_extensions: Vec<String>,
    client: Client,
    descriptor: ToolDescriptor,
}

impl RetrieveDocument {
    pub fn new(root: Arc<SandboxRoot>, allowed_extensions: Vec<String>) -> ToolResult<Self> {
        let descriptor = ToolDescriptor::new("retrieve_document_from_url")
            .with_description(
                "Fetch a document from an http(s) URL. Returns its text, or saves it \
                to save_path inside the sandbox and returns a confirmation.",
            )
            .param(
                Parameter::new("url", ParamKind::String)
                    .required()
                    .description("The URL to fetch."),
            )
            .param(
                Parameter::new("save_path", ParamKind::String)
                    .description("Optional file path relative to the sandbox root."),
            );

        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            root,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            client,
            descriptor,
        })
    }

    fn check_extension(&self, path: &Path, requested: &str) -> ToolResult<()> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if self.allowed_extensions.iter().any(|allowed| *allowed == extension) {
            Ok(())
        } else {
            Err(ToolError::FileOperation(format!(
                "Saving '{}' is not allowed, permitted extensions are: {}",
                requested,
                self.allowed_extensions.join(", ")
            )))
        }
    }
}

#[async_trait]
impl ToolHandler for RetrieveDocument {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments, _: ToolContext) -> ToolResult<ToolOutcome> {
        let raw_url = arguments.str("url")?;
        let url = Url::parse(raw_url)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid URL '{}': {}", raw_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolError::InvalidArguments(format!(
                "Unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        // Validate the destination before spending a request on it
        let destination = match arguments.opt_str("save_path") {
            Some(save_path) => {
                let resolved = self.root.resolve(save_path)?;
                self.check_extension(&resolved, save_path)?;
                Some((save_path, resolved))
            }
            None => None,
        };

        tracing::info!(url = %url, "Retrieving document");
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Network(format!(
                "GET {} returned {}",
                url, status
            )));
        }
        let body = response.text().await?;

        match destination {
            Some((save_path, resolved)) => {
                if let Some(parent) = resolved.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        ToolError::FileOperation(format!("Failed to save '{}': {}", save_path, e))
                    })?;
                }
                tokio::fs::write(&resolved, &body).await.map_err(|e| {
                    ToolError::FileOperation(format!("Failed to save '{}': {}", save_path, e))
                })?;
                Ok(ToolOutcome::Value(format!(
                    "Document from {} saved to '{}'.",
                    url, save_path
                )))
            }
            None => Ok(ToolOutcome::Value(body)),
        }
    }
}
