use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Common file operation utilities with standardized error handling
pub struct FileUtils;

impl FileUtils {
    /// Read file with context information for better error messages
    pub async fn read_with_context(path: &Path, context: &str) -> Result<String> {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}: {}", context, path.display()))
    }

    /// Read file synchronously with context
    pub fn read_sync_with_context(path: &Path, context: &str) -> Result<String> {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}: {}", context, path.display()))
    }

    /// Ensure a directory exists, creating parents as needed
    pub async fn ensure_dir(path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory: {}", path.display()))
    }
}

/// Canonicalize a repo root, falling back to the given path when it does
/// not exist yet. Cache keys depend on this being stable.
pub fn canonical_root(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Last path component as a project name; empty paths map to `.`.
pub fn project_name(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string())
}

/// First segment of a repo-relative path, used as a human service label.
pub fn service_label(rel_path: &Path) -> String {
    rel_path
        .components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}
