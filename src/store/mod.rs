//! Persistence seam of the engine.
//!
//! The orchestrator only ever talks to [`TaskStore`]; the shipped
//! implementations are a SQLite store for the CLI and an in-memory store
//! for tests. The store owns no analysis logic.

pub mod memory;
pub mod sqlite;

use crate::core::types::{AnalysisReport, AnalysisTask, ProjectRelation, TaskStatus};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &AnalysisTask) -> Result<(), StoreError>;

    /// Append one entry to the task's append-only log.
    async fn append_log(&self, task_id: &str, entry: &str) -> Result<(), StoreError>;

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError>;

    async fn insert_report(&self, report: &AnalysisReport) -> Result<(), StoreError>;

    async fn load_task(&self, task_id: &str) -> Result<Option<AnalysisTask>, StoreError>;

    async fn load_reports(&self, task_id: &str) -> Result<Vec<AnalysisReport>, StoreError>;

    /// Active relations configured for a main repository URL.
    async fn load_project_relations(
        &self,
        main_git_url: &str,
    ) -> Result<Vec<ProjectRelation>, StoreError>;

    async fn upsert_project_relation(
        &self,
        relation: &ProjectRelation,
    ) -> Result<(), StoreError>;
}

/// Task-scoped log sink: entries land in the task's append-only log and
/// are mirrored to tracing. Store failures degrade to a warning; losing
/// a log line never aborts an analysis.
#[derive(Clone)]
pub struct TaskLog {
    store: Arc<dyn TaskStore>,
    task_id: String,
}

impl TaskLog {
    pub fn new(store: Arc<dyn TaskStore>, task_id: impl Into<String>) -> Self {
        Self {
            store,
            task_id: task_id.into(),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub async fn append(&self, entry: impl AsRef<str>) {
        let entry = entry.as_ref();
        info!(task = %self.task_id, "{entry}");
        if let Err(err) = self.store.append_log(&self.task_id, entry).await {
            warn!(task = %self.task_id, error = %err, "failed to append task log entry");
        }
    }
}

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
