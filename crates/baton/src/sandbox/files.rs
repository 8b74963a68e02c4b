use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::SandboxRoot;
use crate::errors::{ToolError, ToolResult};
use crate::handler::{
    ParamKind, Parameter, ToolArguments, ToolContext, ToolDescriptor, ToolHandler, ToolOutcome,
};

fn file_error(action: &str, path: &str, err: std::io::Error) -> ToolError {
    ToolError::FileOperation(format!("Failed to {} '{}': {}", action, path, err))
}

/// Lists the entries of a directory as a JSON array of names.
pub struct ListFiles {
    root: Arc<SandboxRoot>,
    descriptor: ToolDescriptor,
}

impl ListFiles {
    pub fn new(root: Arc<SandboxRoot>) -> Self {
        let descriptor = ToolDescriptor::new("list_files")
            .with_description(
                "List the files and directories in a directory of the sandbox. \
                Returns a JSON array of entry names.",
            )
            .param(
                Parameter::new("dir", ParamKind::String)
                    .required()
                    .description("Directory relative to the sandbox root, use '.' for the root."),
            );
        Self { root, descriptor }
    }
}

#[async_trait]
impl ToolHandler for ListFiles {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments, _: ToolContext) -> ToolResult<ToolOutcome> {
        let dir = arguments.str("dir")?;
        let path = self.root.resolve(dir)?;

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| file_error("list", dir, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| file_error("list", dir, e))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();

        Ok(ToolOutcome::Json(json!(names)))
    }
}

/// Returns the text content of a file.
pub struct ReadFile {
    root: Arc<SandboxRoot>,
    descriptor: ToolDescriptor,
}

impl ReadFile {
    pub fn new(root: Arc<SandboxRoot>) -> Self {
        let descriptor = ToolDescriptor::new("read_file")
            .with_description("Read the full text content of a file in the sandbox.")
            .param(
                Parameter::new("path", ParamKind::String)
                    .required()
                    .description("File path relative to the sandbox root."),
            );
        Self { root, descriptor }
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments, _: ToolContext) -> ToolResult<ToolOutcome> {
        let path = arguments.str("path")?;
        let resolved = self.root.resolve(path)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| file_error("read", path, e))?;
        Ok(ToolOutcome::Value(content))
    }
}

/// Writes text to a file, creating parent directories as needed.
pub struct WriteFile {
    root: Arc<SandboxRoot>,
    descriptor: ToolDescriptor,
}

impl WriteFile {
    pub fn new(root: Arc<SandboxRoot>) -> Self {
        let descriptor = ToolDescriptor::new("write_file")
            .with_description(
                "Write text to a file in the sandbox. Existing files are only \
                replaced when overwrite is true.",
            )
            .param(
                Parameter::new("path", ParamKind::String)
                    .required()
                    .description("File path relative to the sandbox root."),
            )
            .param(
                Parameter::new("content", ParamKind::String)
                    .required()
                    .description("The text to write."),
            )
            .param(
                Parameter::new("overwrite", ParamKind::Boolean)
                    .description("Replace the file if it already exists. Defaults to false."),
            );
        Self { root, descriptor }
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn call(&self, arguments: ToolArguments, _: ToolContext) -> ToolResult<ToolOutcome> {
        let path = arguments.str("path")?;
        let content = arguments.str("content")?;
        let overwrite = arguments.bool_or("overwrite", false);
        let resolved = self.root.resolve(path)?;

        if resolved.is_dir() {
            return Err(ToolError::FileOperation(format!(
                "'{}' is a directory",
                path
            )));
        }
        if resolved.exists() && !overwrite {
            return Ok(ToolOutcome::Value(format!(
                "File '{}' already exists. Set overwrite to true to replace it.",
                path
            )));
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| file_error("create directories for", path, e))?;
        }
        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| file_error("write", path, e))?;

        tracing::info!(path = %self.root.display(&resolved), bytes = content.len(), "Wrote file");
        Ok(ToolOutcome::Value(format!(
            "Successfully wrote {} bytes to '{}'.",
            content.len(),
            path
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use serde_json::Value;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<SandboxRoot>) {
        let dir = tempfile::tempdir().unwrap();
        let root = Arc::new(SandboxRoot::new(dir.path()).unwrap());
        (dir, root)
    }

    fn args(value: Value) -> ToolArguments {
        ToolArguments::new(value.as_object().cloned().unwrap())
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::default(), Arc::new(Agent::default()))
    }

    #[tokio::test]
    async fn test_list_files() {
        let (dir, root) = setup();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let outcome = ListFiles::new(root)
            .call(args(json!({"dir": "."})), ctx())
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::Json(json!(["a.md", "b.txt", "nested"])));
    }

    #[tokio::test]
    async fn test_list_missing_dir() {
        let (_dir, root) = setup();
        let err = ListFiles::new(root)
            .call(args(json!({"dir": "nope"})), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::FileOperation(_)));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_dir, root) = setup();
        let writer = WriteFile::new(root.clone());
        let reader = ReadFile::new(root);

        let outcome = writer
            .call(
                args(json!({"path": "notes/hello.txt", "content": "Hello, world!"})),
                ctx(),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ToolOutcome::Value("Successfully wrote 13 bytes to 'notes/hello.txt'.".to_string())
        );

        let outcome = reader
            .call(args(json!({"path": "notes/hello.txt"})), ctx())
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::Value("Hello, world!".to_string()));
    }

    #[tokio::test]
    async fn test_write_respects_overwrite() {
        let (dir, root) = setup();
        std::fs::write(dir.path().join("keep.txt"), "original").unwrap();
        let writer = WriteFile::new(root);

        let outcome = writer
            .call(args(json!({"path": "keep.txt", "content": "new"})), ctx())
            .await
            .unwrap();
        assert!(matches!(outcome, ToolOutcome::Value(msg) if msg.contains("already exists")));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(),
            "original"
        );

        writer
            .call(
                args(json!({"path": "keep.txt", "content": "new", "overwrite": true})),
                ctx(),
            )
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(),
            "new"
        );
    }

    #[tokio::test]
    async fn test_read_outside_root_fails() {
        let (_dir, root) = setup();
        let reader = ReadFile::new(root);

        for path in ["../../etc/passwd", "/etc/passwd", "sub/../../../etc/hosts"] {
            let err = reader
                .call(args(json!({ "path": path })), ctx())
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::FileOperation(_)), "{}", path);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_through_dangling_symlink_fails() {
        let (dir, root) = setup();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt")).unwrap();

        let err = WriteFile::new(root)
            .call(args(json!({"path": "link.txt", "content": "escaped"})), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::FileOperation(_)));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let (_dir, root) = setup();
        let err = ReadFile::new(root)
            .call(args(json!({"path": "missing.txt"})), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::FileOperation(msg) if msg.contains("missing.txt")));
    }
}
