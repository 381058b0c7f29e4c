//! Thin async adaptor over the `git` binary.
//!
//! Every operation is a single subprocess with a wall-clock timeout and
//! captured stderr; shell strings never cross module boundaries. The
//! [`Git`] trait carries the higher-level operations as provided methods
//! so tests can inject a fake by implementing `run` alone.

use crate::error::GitError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Subprocess seam for git operations
#[async_trait]
pub trait Git: Send + Sync {
    /// Run `git <args>` in `dir`, returning trimmed stdout.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError>;

    async fn clone_repo(
        &self,
        workdir: &Path,
        url: &str,
        target: &Path,
        branch: Option<&str>,
    ) -> Result<(), GitError> {
        let target_str = target.to_string_lossy().into_owned();
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            args.extend(["--branch", branch, "--single-branch"]);
        }
        args.push(url);
        args.push(&target_str);
        self.run(workdir, &args).await.map(|_| ())
    }

    async fn fetch_all(&self, repo: &Path) -> Result<(), GitError> {
        self.run(repo, &["fetch", "--all", "--prune"]).await.map(|_| ())
    }

    async fn checkout(&self, repo: &Path, rev: &str) -> Result<(), GitError> {
        self.run(repo, &["checkout", rev]).await.map(|_| ())
    }

    async fn reset_hard(&self, repo: &Path, rev: Option<&str>) -> Result<(), GitError> {
        match rev {
            Some(rev) => self.run(repo, &["reset", "--hard", rev]).await.map(|_| ()),
            None => self.run(repo, &["reset", "--hard"]).await.map(|_| ()),
        }
    }

    async fn clean_untracked(&self, repo: &Path) -> Result<(), GitError> {
        self.run(repo, &["clean", "-fd"]).await.map(|_| ())
    }

    async fn rev_parse_head(&self, repo: &Path) -> Result<String, GitError> {
        self.run(repo, &["rev-parse", "HEAD"]).await
    }

    async fn current_branch(&self, repo: &Path) -> Result<String, GitError> {
        self.run(repo, &["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// True when `origin/<branch>` resolves in the repo.
    async fn remote_branch_exists(&self, repo: &Path, branch: &str) -> bool {
        self.run(repo, &["rev-parse", "--verify", &format!("origin/{branch}")])
            .await
            .is_ok()
    }

    /// Unified diff for `range`, restricted to `pathspec` when non-empty.
    async fn diff(
        &self,
        repo: &Path,
        range: &str,
        pathspec: &[&str],
    ) -> Result<String, GitError> {
        let mut args = vec!["diff", range];
        if !pathspec.is_empty() {
            args.push("--");
            args.extend_from_slice(pathspec);
        }
        self.run(repo, &args).await
    }

    async fn diff_name_only(&self, repo: &Path, range: &str) -> Result<Vec<String>, GitError> {
        let out = self.run(repo, &["diff", "--name-only", range]).await?;
        Ok(out.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }
}

/// Production implementation invoking the `git` binary from PATH
pub struct GitClient {
    timeout: Duration,
}

impl GitClient {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_seconds),
        }
    }
}

impl Default for GitClient {
    fn default() -> Self {
        Self::new(crate::core::constants::defaults::GIT_OP_TIMEOUT_SECONDS)
    }
}

#[async_trait]
impl Git for GitClient {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String, GitError> {
        let command_label = args.first().copied().unwrap_or("").to_string();
        debug!(dir = %dir.display(), command = ?args, "running git");

        let child = Command::new("git")
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|source| GitError::Spawn {
                command: command_label.clone(),
                source,
            })?,
            Err(_) => {
                return Err(GitError::Timeout {
                    command: command_label,
                    dir: dir.to_path_buf(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // Keep the tail; clone progress can be long
            let tail: String = stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(GitError::CommandFailed {
                command: command_label,
                dir: dir.to_path_buf(),
                stderr: tail,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// True when `path` looks like a materialized git worktree.
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Format the merge-base diff range `base...target`.
pub fn triple_dot_range(base: &str, target: &str) -> String {
    format!("{base}...{target}")
}

/// Workspace path for a named repo.
pub fn repo_dir(workspace: &Path, name: &str) -> PathBuf {
    workspace.join(name)
}
