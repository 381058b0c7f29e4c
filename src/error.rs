/// Domain-specific error types for crossimpact using thiserror
///
/// Each component owns one error family. Local recovery is the rule:
/// per-file parse errors, per-repo git errors and cache errors are logged
/// and absorbed by their component; only configuration errors and git
/// failures on the main repository abort a task.
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type aggregating all component families
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error")]
    Config(#[from] ConfigError),

    #[error("Git operation failed")]
    Git(#[from] GitError),

    #[error("Parsing failed")]
    Parse(#[from] ParseError),

    #[error("Cache operation failed")]
    Cache(#[from] CacheError),

    #[error("LLM exchange failed")]
    Llm(#[from] LlmError),

    #[error("Store operation failed")]
    Store(#[from] StoreError),

    #[error("Task cancelled")]
    Cancelled,
}

/// Configuration errors. Always fatal to the task, before any work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required option: {name}")]
    MissingOption { name: String },

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Workspace is not writable: {path}")]
    WorkspaceNotWritable { path: PathBuf },

    #[error("Invalid related project entry '{entry}': {reason}")]
    InvalidRelatedProject { entry: String, reason: String },
}

/// Git subprocess errors
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git {command} failed in {dir}: {stderr}")]
    CommandFailed {
        command: String,
        dir: PathBuf,
        stderr: String,
    },

    #[error("git {command} timed out after {seconds}s in {dir}")]
    Timeout {
        command: String,
        dir: PathBuf,
        seconds: u64,
    },

    #[error("Failed to spawn git {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Branch '{branch}' not found in {repo}")]
    BranchNotFound { branch: String, repo: String },

    #[error("Not a git repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("Empty diff between {base} and {target}")]
    EmptyDiff { base: String, target: String },
}

impl GitError {
    /// One-line reason suitable for the task's append-only log.
    pub fn log_reason(&self) -> String {
        match self {
            Self::BranchNotFound { .. } => "branch_not_found".to_string(),
            Self::Timeout {
                command, seconds, ..
            } => {
                format!("timeout: git {command} exceeded {seconds}s")
            }
            other => other.to_string(),
        }
    }
}

/// Java parsing errors. Never fatal; the offending file is skipped.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No package declaration in {path}")]
    MissingPackage { path: PathBuf },

    #[error("No primary type declaration in {path}")]
    MissingPrimaryType { path: PathBuf },

    #[error("Malformed diff: {reason}")]
    MalformedDiff { reason: String },
}

/// Index cache errors. Logged; the caller falls back to a fresh build.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to read cache entry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write cache entry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cache entry {path} failed to decode: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Cache entry is stale: built at {cached}, HEAD is {current}")]
    Stale { cached: String, current: String },
}

/// LLM boundary errors
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM transport failed: {reason}")]
    Transport { reason: String },

    #[error("LLM reply is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    #[error("LLM reply is missing required fields: {fields:?}")]
    MissingFields { fields: Vec<String> },

    #[error("No LLM client configured")]
    NotConfigured,
}

/// Persistence errors from the external store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation '{operation}' failed: {source}")]
    Operation {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unknown task: {task_id}")]
    UnknownTask { task_id: String },
}

impl StoreError {
    pub fn operation<E>(operation: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Operation {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
