//! Repository materialization: clone or fast-forward each related repo
//! into the workspace at its configured branch.
//!
//! Workers run in parallel under a bounded semaphore; one worker's
//! failure never cancels its siblings. A repo only lands in `ok` when its
//! on-disk branch matches the requested branch and HEAD resolves.

use crate::core::constants::defaults;
use crate::core::types::{MaterializeFailure, MaterializeOutcome, MaterializedRepo, RelatedProject};
use crate::error::GitError;
use crate::git::client::{is_git_repo, repo_dir, Git};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Materializer over an injectable git seam
pub struct RepoMaterializer {
    git: Arc<dyn Git>,
    parallel_limit: usize,
    fallback_to_default_branch: bool,
}

impl RepoMaterializer {
    pub fn new(git: Arc<dyn Git>) -> Self {
        Self {
            git,
            parallel_limit: defaults::PARALLEL_CLONE_LIMIT,
            fallback_to_default_branch: false,
        }
    }

    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_limit = limit.max(1);
        self
    }

    pub fn with_branch_fallback(mut self, enabled: bool) -> Self {
        self.fallback_to_default_branch = enabled;
        self
    }

    /// Materialize every related project under `workspace`, in parallel.
    pub async fn materialize(
        &self,
        projects: &[RelatedProject],
        workspace: &Path,
    ) -> MaterializeOutcome {
        let mut outcome = MaterializeOutcome::default();
        if projects.is_empty() {
            return outcome;
        }

        let workers = self.parallel_limit.min(projects.len());
        let semaphore = Arc::new(Semaphore::new(workers));
        info!(
            repos = projects.len(),
            workers, "materializing related repositories"
        );

        let mut handles = Vec::with_capacity(projects.len());
        for project in projects.iter().cloned() {
            let git = Arc::clone(&self.git);
            let semaphore = Arc::clone(&semaphore);
            let workspace = workspace.to_path_buf();
            let fallback = self.fallback_to_default_branch;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let result = materialize_one(git.as_ref(), &project, &workspace, fallback).await;
                (project, result)
            }));
        }

        for joined in join_all(handles).await {
            match joined {
                Ok((_, Ok(repo))) => outcome.ok.push(repo),
                Ok((project, Err(err))) => {
                    warn!(project = %project.name, error = %err, "materialization failed");
                    outcome.fail.push(MaterializeFailure {
                        name: project.name,
                        error: err.log_reason(),
                    });
                }
                Err(join_err) => {
                    // A panicked worker is a failure we cannot attribute
                    // to a repo by name from the handle alone
                    outcome.fail.push(MaterializeFailure {
                        name: "<unknown>".to_string(),
                        error: format!("worker panicked: {join_err}"),
                    });
                }
            }
        }
        outcome
    }

    /// Single-entry variant used for the main repository.
    pub async fn materialize_single(
        &self,
        project: &RelatedProject,
        workspace: &Path,
    ) -> Result<MaterializedRepo, GitError> {
        materialize_one(
            self.git.as_ref(),
            project,
            workspace,
            self.fallback_to_default_branch,
        )
        .await
    }
}

async fn materialize_one(
    git: &dyn Git,
    project: &RelatedProject,
    workspace: &Path,
    fallback: bool,
) -> Result<MaterializedRepo, GitError> {
    let target = repo_dir(workspace, &project.name);

    let branch = if is_git_repo(&target) {
        update_existing(git, &target, &project.branch, fallback).await?
    } else {
        clone_fresh(git, project, workspace, &target, fallback).await?
    };

    // The ok list only carries repos whose checkout landed on the branch
    // we report
    let on_disk = git.current_branch(&target).await?;
    if on_disk != branch {
        return Err(GitError::BranchNotFound {
            branch: branch.clone(),
            repo: project.name.clone(),
        });
    }

    let head_commit = git.rev_parse_head(&target).await?;
    info!(project = %project.name, branch = %branch, head = %head_commit, "repository ready");

    Ok(MaterializedRepo {
        name: project.name.clone(),
        path: target,
        branch,
        head_commit,
    })
}

/// Refresh an existing clone: drop local edits, fetch, land on the branch.
async fn update_existing(
    git: &dyn Git,
    target: &Path,
    branch: &str,
    fallback: bool,
) -> Result<String, GitError> {
    git.reset_hard(target, None).await?;
    git.clean_untracked(target).await?;
    git.fetch_all(target).await?;

    let branch = resolve_branch(git, target, branch, fallback).await?;
    git.checkout(target, &branch).await?;
    let origin_ref = format!("origin/{branch}");
    git.reset_hard(target, Some(origin_ref.as_str())).await?;
    Ok(branch)
}

async fn clone_fresh(
    git: &dyn Git,
    project: &RelatedProject,
    workspace: &Path,
    target: &Path,
    fallback: bool,
) -> Result<String, GitError> {
    match git
        .clone_repo(workspace, &project.git_url, target, Some(project.branch.as_str()))
        .await
    {
        Ok(()) => Ok(project.branch.clone()),
        Err(err) if is_missing_branch(&err) => {
            if !fallback {
                return Err(GitError::BranchNotFound {
                    branch: project.branch.clone(),
                    repo: project.name.clone(),
                });
            }
            // Full clone, then land on the first branch that resolves
            git.clone_repo(workspace, &project.git_url, target, None)
                .await?;
            let branch = resolve_branch(git, target, &project.branch, true).await?;
            git.checkout(target, &branch).await?;
            Ok(branch)
        }
        Err(err) => Err(err),
    }
}

/// The branch to check out: the configured one when it exists on origin,
/// otherwise the first of the default candidates (fallback mode only).
async fn resolve_branch(
    git: &dyn Git,
    target: &Path,
    branch: &str,
    fallback: bool,
) -> Result<String, GitError> {
    if git.remote_branch_exists(target, branch).await {
        return Ok(branch.to_string());
    }
    if fallback {
        for candidate in defaults::FALLBACK_BRANCHES {
            if git.remote_branch_exists(target, candidate).await {
                warn!(
                    requested = branch,
                    using = candidate,
                    "configured branch missing, falling back"
                );
                return Ok(candidate.to_string());
            }
        }
    }
    Err(GitError::BranchNotFound {
        branch: branch.to_string(),
        repo: target.display().to_string(),
    })
}

fn is_missing_branch(err: &GitError) -> bool {
    match err {
        GitError::CommandFailed { stderr, .. } => {
            let lower = stderr.to_lowercase();
            lower.contains("not found in upstream")
                || lower.contains("remote branch")
                || lower.contains("couldn't find remote ref")
        }
        _ => false,
    }
}

/// Paths of successfully materialized repos, in outcome order.
pub fn ok_roots(outcome: &MaterializeOutcome) -> Vec<PathBuf> {
    outcome.ok.iter().map(|r| r.path.clone()).collect()
}
