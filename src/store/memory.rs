//! In-memory task store for tests and dry runs.

use crate::core::types::{
    AnalysisReport, AnalysisTask, ProjectRelation, TaskStatus,
};
use crate::error::StoreError;
use crate::store::TaskStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    tasks: Mutex<HashMap<String, AnalysisTask>>,
    reports: Mutex<Vec<AnalysisReport>>,
    relations: Mutex<Vec<ProjectRelation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports inserted so far, in insertion order.
    pub fn reports(&self) -> Vec<AnalysisReport> {
        self.reports.lock().expect("poisoned").clone()
    }

    /// All tasks, in arbitrary order.
    pub fn tasks(&self) -> Vec<AnalysisTask> {
        self.tasks.lock().expect("poisoned").values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_task(&self, task: &AnalysisTask) -> Result<(), StoreError> {
        self.tasks
            .lock()
            .expect("poisoned")
            .insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn append_log(&self, task_id: &str, entry: &str) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().expect("poisoned");
        let task = tasks.get_mut(task_id).ok_or_else(|| StoreError::UnknownTask {
            task_id: task_id.to_string(),
        })?;
        task.log.push_str(entry);
        task.log.push('\n');
        Ok(())
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().expect("poisoned");
        let task = tasks.get_mut(task_id).ok_or_else(|| StoreError::UnknownTask {
            task_id: task_id.to_string(),
        })?;
        task.status = status;
        Ok(())
    }

    async fn insert_report(&self, report: &AnalysisReport) -> Result<(), StoreError> {
        self.reports.lock().expect("poisoned").push(report.clone());
        Ok(())
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<AnalysisTask>, StoreError> {
        Ok(self.tasks.lock().expect("poisoned").get(task_id).cloned())
    }

    async fn load_reports(&self, task_id: &str) -> Result<Vec<AnalysisReport>, StoreError> {
        Ok(self
            .reports
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn load_project_relations(
        &self,
        main_git_url: &str,
    ) -> Result<Vec<ProjectRelation>, StoreError> {
        Ok(self
            .relations
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|r| r.main_git_url == main_git_url && r.active)
            .cloned()
            .collect())
    }

    async fn upsert_project_relation(
        &self,
        relation: &ProjectRelation,
    ) -> Result<(), StoreError> {
        let mut relations = self.relations.lock().expect("poisoned");
        if let Some(existing) = relations.iter_mut().find(|r| {
            r.main_git_url == relation.main_git_url
                && r.related_git_url == relation.related_git_url
        }) {
            *existing = relation.clone();
        } else {
            relations.push(relation.clone());
        }
        Ok(())
    }
}
