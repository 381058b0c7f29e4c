//! On-disk cache for symbol indices, keyed by (repo root, HEAD commit).
//!
//! One `<sha256(root|commit)>.idx` file per entry. Load-first,
//! rebuild-on-miss; every change of HEAD produces a new key, so no
//! explicit invalidation exists. Cache read/write failures are logged and
//! absorbed; the caller always gets an index.

use crate::core::utils::canonical_root;
use crate::core::SymbolIndex;
use crate::error::CacheError;
use crate::git::Git;
use crate::indexer::SymbolIndexer;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Deterministic cache key: a pure function of (root, commit).
pub fn cache_key(root: &Path, commit: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(root.to_string_lossy().as_bytes());
    hasher.update(b"|");
    hasher.update(commit.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Load-first index provider with build instrumentation
pub struct IndexCache {
    cache_dir: PathBuf,
    git: Arc<dyn Git>,
    builds: AtomicUsize,
    hits: AtomicUsize,
}

impl IndexCache {
    pub fn new(cache_dir: impl Into<PathBuf>, git: Arc<dyn Git>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            git,
            builds: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
        }
    }

    /// Number of fresh index builds performed by this cache instance.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// Number of cache hits served by this instance.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    /// Return the index for `root`, from cache when HEAD matches the
    /// stored commit, freshly built otherwise.
    pub async fn get_or_build(&self, root: &Path) -> SymbolIndex {
        let head = match self.git.rev_parse_head(root).await {
            Ok(head) => head,
            Err(err) => {
                // Not a git worktree: index it anyway, skip caching
                debug!(root = %root.display(), error = %err, "no HEAD; building uncached index");
                self.builds.fetch_add(1, Ordering::Relaxed);
                return SymbolIndexer::new(root).build("");
            }
        };

        let entry = self.entry_path(root, &head);
        match self.load(&entry, &head) {
            Ok(index) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(root = %root.display(), commit = %head, "index cache hit");
                return index;
            }
            Err(CacheError::Read { .. }) => {}
            Err(err) => {
                warn!(root = %root.display(), error = %err, "discarding unusable cache entry");
            }
        }

        let index = SymbolIndexer::new(root).build(&head);
        self.builds.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = self.persist(&entry, &index) {
            warn!(root = %root.display(), error = %err, "failed to persist index; continuing uncached");
        }
        index
    }

    fn entry_path(&self, root: &Path, commit: &str) -> PathBuf {
        let key = cache_key(&canonical_root(root), commit);
        self.cache_dir.join(format!("{key}.idx"))
    }

    fn load(&self, entry: &Path, current_head: &str) -> Result<SymbolIndex, CacheError> {
        let bytes = std::fs::read(entry).map_err(|source| CacheError::Read {
            path: entry.to_path_buf(),
            source,
        })?;
        let index: SymbolIndex =
            bincode::deserialize(&bytes).map_err(|err| CacheError::Decode {
                path: entry.to_path_buf(),
                reason: err.to_string(),
            })?;
        if index.commit_hash != current_head {
            return Err(CacheError::Stale {
                cached: index.commit_hash,
                current: current_head.to_string(),
            });
        }
        Ok(index)
    }

    fn persist(&self, entry: &Path, index: &SymbolIndex) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.cache_dir).map_err(|source| CacheError::Write {
            path: self.cache_dir.clone(),
            source,
        })?;
        let bytes = bincode::serialize(index).map_err(|err| CacheError::Decode {
            path: entry.to_path_buf(),
            reason: err.to_string(),
        })?;
        std::fs::write(entry, bytes).map_err(|source| CacheError::Write {
            path: entry.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_pure() {
        let a = cache_key(Path::new("/ws/repo"), "abc123");
        let b = cache_key(Path::new("/ws/repo"), "abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn cache_key_varies_with_inputs() {
        let base = cache_key(Path::new("/ws/repo"), "abc123");
        assert_ne!(base, cache_key(Path::new("/ws/repo"), "def456"));
        assert_ne!(base, cache_key(Path::new("/ws/other"), "abc123"));
    }
}
