//! Built-in tools confined to a sandbox directory.
//!
//! Every path a tool touches is resolved against a [`SandboxRoot`]. A path
//! whose resolved form leaves the root fails with
//! [`ToolError::FileOperation`], which ends the run.

pub mod fetch;
pub mod files;
pub mod shell;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::config::SandboxSettings;
use crate::errors::{ToolError, ToolResult};
use crate::registry::ToolRegistry;

pub use fetch::RetrieveDocument;
pub use files::{ListFiles, ReadFile, WriteFile};
pub use shell::ShellCommand;

/// Names of the tools registered by [`builtin_registry`], in the order
/// they are offered to the model.
pub const BUILTIN_TOOLS: [&str; 5] = [
    "list_files",
    "read_file",
    "write_file",
    "retrieve_document_from_url",
    "execute_shell_command",
];

/// A canonical directory that tool paths may not escape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot {
    root: PathBuf,
}

impl SandboxRoot {
    pub fn new<P: AsRef<Path>>(root: P) -> ToolResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| {
            ToolError::FileOperation(format!(
                "Sandbox root '{}' is not accessible: {}",
                root.display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(ToolError::FileOperation(format!(
                "Sandbox root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root, rejecting anything that ends up
    /// outside of it. Symlinks are followed for the parts that exist; a
    /// dangling symlink is rejected.
    pub fn resolve(&self, path: &str) -> ToolResult<PathBuf> {
        let joined = self.root.join(path);
        let normalized = normalize(&joined);
        if !normalized.starts_with(&self.root) {
            return Err(self.escape_error(path));
        }

        // symlink_metadata does not follow links, so a dangling link counts
        // as existing and stops the walk
        let mut existing = normalized.as_path();
        while std::fs::symlink_metadata(existing).is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        match existing.canonicalize() {
            Ok(real) if real.starts_with(&self.root) => Ok(normalized),
            _ => Err(self.escape_error(path)),
        }
    }

    /// The path relative to the root, for messages shown to the model
    pub fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn escape_error(&self, path: &str) -> ToolError {
        tracing::warn!(path, root = %self.root.display(), "Rejected path outside the sandbox");
        ToolError::FileOperation(format!(
            "Path '{}' resolves outside of the sandbox root",
            path
        ))
    }
}

/// Lexically collapse `.` and `..` without touching the file system.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// A registry holding every built-in tool, configured from `settings`.
pub fn builtin_registry(settings: &SandboxSettings) -> ToolResult<ToolRegistry> {
    let root = Arc::new(SandboxRoot::new(settings.root_path())?);
    tracing::debug!(root = %root.path().display(), shell = settings.shell_enabled, "Configuring sandbox tools");

    Ok(ToolRegistry::new()
        .with(ListFiles::new(root.clone()))
        .with(ReadFile::new(root.clone()))
        .with(WriteFile::new(root.clone()))
        .with(RetrieveDocument::new(
            root.clone(),
            settings.allowed_extensions.clone(),
        )?)
        .with(ShellCommand::new(
            root,
            settings.shell_enabled,
            settings.allowed_commands.clone(),
        )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sandbox() -> (TempDir, SandboxRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = SandboxRoot::new(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_resolve_inside_root() {
        let (_dir, root) = sandbox();
        let resolved = root.resolve("notes/today.txt").unwrap();
        assert_eq!(resolved, root.path().join("notes/today.txt"));

        let resolved = root.resolve("notes/../todo.md").unwrap();
        assert_eq!(resolved, root.path().join("todo.md"));
        assert_eq!(root.resolve(".").unwrap(), root.path());
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let (_dir, root) = sandbox();
        for path in ["../../etc/passwd", "..", "a/../../b", "/etc/passwd"] {
            let err = root.resolve(path).unwrap_err();
            assert!(
                matches!(err, ToolError::FileOperation(_)),
                "expected {} to be rejected",
                path
            );
        }
    }

    #[test]
    fn test_absolute_path_inside_root() {
        let (_dir, root) = sandbox();
        let inside = root.path().join("data.csv");
        let resolved = root.resolve(inside.to_str().unwrap()).unwrap();
        assert_eq!(resolved, inside);
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_escape() {
        let (dir, root) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let err = root.resolve("link/secret.txt").unwrap_err();
        assert!(matches!(err, ToolError::FileOperation(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_dangling_symlink() {
        let (dir, root) = sandbox();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("pwned.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path().join("gone"), dir.path().join("dir")).unwrap();

        for path in ["link.txt", "dir/nested.txt"] {
            let err = root.resolve(path).unwrap_err();
            assert!(matches!(err, ToolError::FileOperation(_)), "{}", path);
        }
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_follows_symlink_inside_root() {
        let (dir, root) = sandbox();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("alias")).unwrap();

        let resolved = root.resolve("alias/new.txt").unwrap();
        assert_eq!(resolved, root.path().join("alias/new.txt"));
    }

    #[test]
    fn test_missing_root() {
        let err = SandboxRoot::new("/definitely/not/a/real/dir").unwrap_err();
        assert!(matches!(err, ToolError::FileOperation(_)));
    }

    #[test]
    fn test_builtin_registry() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SandboxSettings {
            root: dir.path().to_string_lossy().into_owned(),
            ..SandboxSettings::default()
        };

        let registry = builtin_registry(&settings).unwrap();
        let mut expected = BUILTIN_TOOLS.to_vec();
        expected.sort_unstable();
        assert_eq!(registry.names(), expected);
    }
}
