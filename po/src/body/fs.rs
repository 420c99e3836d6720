//! Sandboxed file-system capability
//!
//! All file operations a run performs resolve against its sandbox directory;
//! paths that escape it (absolute or via `..`/symlinks) are rejected. The
//! plan's provision tree is mounted read-only beside the sandbox so prompt
//! and script locations resolve without being writable.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::ToolError;

/// Per-run sandboxed file system
#[derive(Debug, Clone)]
pub struct FileSystem {
    /// Writable per-run directory; every relative path resolves here
    sandbox: PathBuf,
    /// Read-only roots (plan provisions); consulted for reads only
    read_roots: Vec<PathBuf>,
}

impl FileSystem {
    pub fn new(sandbox: PathBuf) -> Self {
        Self {
            sandbox,
            read_roots: Vec::new(),
        }
    }

    /// Add a read-only root (plan provisions directory)
    pub fn with_read_root(mut self, root: PathBuf) -> Self {
        self.read_roots.push(root);
        self
    }

    pub fn sandbox(&self) -> &Path {
        &self.sandbox
    }

    /// Validate that a path stays inside a root (sandbox enforcement)
    fn confine(&self, path: &Path, root: &Path) -> Result<PathBuf, ToolError> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        };

        // Canonicalize what exists so symlinks cannot escape; for new files
        // canonicalize the parent and re-attach the file name.
        let canonical = if joined.exists() {
            joined.canonicalize().unwrap_or_else(|_| joined.clone())
        } else if let Some(parent) = joined.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(joined.file_name().unwrap_or_default())
            } else {
                joined.clone()
            }
        } else {
            joined.clone()
        };

        let root_canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        if canonical.starts_with(&root_canonical) {
            Ok(canonical)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                sandbox: root.to_path_buf(),
            })
        }
    }

    /// Resolve a path for reading: the sandbox first, then read-only roots
    pub fn resolve_read(&self, path: &Path) -> Result<PathBuf, ToolError> {
        if let Ok(resolved) = self.confine(path, &self.sandbox) {
            if resolved.exists() {
                return Ok(resolved);
            }
        }
        for root in &self.read_roots {
            if let Ok(resolved) = self.confine(path, root) {
                if resolved.exists() {
                    return Ok(resolved);
                }
            }
        }
        // Fall through to the sandbox resolution error/result for reporting
        let resolved = self.confine(path, &self.sandbox)?;
        if resolved.exists() {
            Ok(resolved)
        } else {
            Err(ToolError::FileIo {
                path: path.to_path_buf(),
                message: "not found".into(),
            })
        }
    }

    pub async fn read(&self, path: &Path) -> Result<String, ToolError> {
        let resolved = self.resolve_read(path)?;
        debug!(path = %resolved.display(), "fs read");
        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::FileIo {
                path: resolved,
                message: e.to_string(),
            })
    }

    pub async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, ToolError> {
        let resolved = self.resolve_read(path)?;
        tokio::fs::read(&resolved).await.map_err(|e| ToolError::FileIo {
            path: resolved,
            message: e.to_string(),
        })
    }

    /// Write inside the sandbox only; parent directories are created
    pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, ToolError> {
        let resolved = self.confine(path, &self.sandbox)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ToolError::FileIo {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        debug!(path = %resolved.display(), bytes = bytes.len(), "fs write");
        tokio::fs::write(&resolved, bytes)
            .await
            .map_err(|e| ToolError::FileIo {
                path: resolved.clone(),
                message: e.to_string(),
            })?;
        Ok(resolved)
    }

    /// Memorized values live under `.memory/<key>` inside the sandbox
    pub async fn read_memorized_value(&self, key: &str) -> Result<String, ToolError> {
        self.read(&PathBuf::from(".memory").join(key)).await
    }

    pub async fn write_memorized_value(&self, key: &str, value: &str) -> Result<(), ToolError> {
        self.write(&PathBuf::from(".memory").join(key), value.as_bytes())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_read_write_roundtrip() {
        let temp = tempdir().unwrap();
        let fs = FileSystem::new(temp.path().to_path_buf());

        fs.write(Path::new("out/notes.txt"), b"hello").await.unwrap();
        let content = fs.read(Path::new("out/notes.txt")).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn test_escape_rejected() {
        let temp = tempdir().unwrap();
        let fs = FileSystem::new(temp.path().to_path_buf());

        let err = fs.write(Path::new("/etc/nope"), b"x").await.unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));

        let err = fs.write(Path::new("../outside.txt"), b"x").await.unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn test_read_from_provision_root() {
        let sandbox = tempdir().unwrap();
        let provisions = tempdir().unwrap();
        std::fs::write(provisions.path().join("p.hbs"), "template").unwrap();

        let fs = FileSystem::new(sandbox.path().to_path_buf()).with_read_root(provisions.path().to_path_buf());

        let content = fs.read(Path::new("p.hbs")).await.unwrap();
        assert_eq!(content, "template");
        // Writes never land in a read root
        fs.write(Path::new("p.hbs"), b"clobber").await.unwrap();
        assert_eq!(std::fs::read_to_string(provisions.path().join("p.hbs")).unwrap(), "template");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let temp = tempdir().unwrap();
        let fs = FileSystem::new(temp.path().to_path_buf());
        let err = fs.read(Path::new("ghost.txt")).await.unwrap_err();
        assert!(matches!(err, ToolError::FileIo { .. }));
    }

    #[tokio::test]
    async fn test_memorized_values() {
        let temp = tempdir().unwrap();
        let fs = FileSystem::new(temp.path().to_path_buf());

        fs.write_memorized_value("threshold", "0.5").await.unwrap();
        assert_eq!(fs.read_memorized_value("threshold").await.unwrap(), "0.5");
    }
}
