//! Analysis configuration shared by the CLI and the orchestrator.

use crate::core::constants::defaults;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Options recognized by the orchestrator (spec-level knobs only; the
/// CLI maps its flags onto this struct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Directory that receives one subdirectory per materialized repo.
    /// Owned by the task for its duration; concurrent tasks need
    /// disjoint workspaces.
    pub workspace: PathBuf,

    /// Directory holding serialized symbol indices
    pub cache_dir: PathBuf,

    /// Trace related repositories at all
    pub enable_cross_project: bool,

    /// When the configured branch is missing, probe `master` then `main`
    /// instead of failing with `branch_not_found`
    pub fallback_to_default_branch: bool,

    /// Upper bound on concurrent clone/update workers
    pub parallel_clone_limit: usize,

    /// Wall-clock limit per git invocation
    pub git_op_timeout_seconds: u64,

    /// Snippet window half-size (target line +/- K)
    pub context_lines: usize,

    /// Fail the task when the diff is empty
    pub require_nonempty_diff: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("workspace"),
            cache_dir: PathBuf::from(".crossimpact/cache"),
            enable_cross_project: true,
            fallback_to_default_branch: false,
            parallel_clone_limit: defaults::PARALLEL_CLONE_LIMIT,
            git_op_timeout_seconds: defaults::GIT_OP_TIMEOUT_SECONDS,
            context_lines: defaults::CONTEXT_LINES,
            require_nonempty_diff: true,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_clone_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "parallel_clone_limit".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.git_op_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                name: "git_op_timeout_seconds".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(ConfigError::MissingOption {
                name: "workspace".to_string(),
            });
        }
        Ok(())
    }

    /// Effective worker-pool size for `n_repos` entries.
    pub fn clone_workers(&self, n_repos: usize) -> usize {
        self.parallel_clone_limit.min(n_repos).max(1)
    }
}
