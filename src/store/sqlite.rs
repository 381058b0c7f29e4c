//! SQLite-backed task store.

use crate::core::types::{
    AnalysisReport, AnalysisTask, ProjectRelation, RelatedProject, TaskStatus,
};
use crate::error::StoreError;
use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating schema as needed) a store at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::operation("create store directory", e))?;
            }
        }
        let conn =
            Connection::open(path).map_err(|e| StoreError::operation("open database", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_task (
                id TEXT PRIMARY KEY,
                main_git_url TEXT NOT NULL,
                target_branch TEXT NOT NULL,
                base_commit TEXT NOT NULL,
                target_commit TEXT NOT NULL,
                enable_cross_project BOOLEAN NOT NULL DEFAULT 0,
                related_projects TEXT NOT NULL DEFAULT '[]',
                status TEXT NOT NULL DEFAULT 'PENDING',
                log TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS analysis_report (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                project_name TEXT NOT NULL,
                file_name TEXT NOT NULL,
                diff_content TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                report_json TEXT NOT NULL,
                source_project TEXT NOT NULL DEFAULT 'main',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (task_id) REFERENCES analysis_task(id)
            );

            CREATE TABLE IF NOT EXISTS project_relation (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                main_name TEXT NOT NULL,
                main_git_url TEXT NOT NULL,
                related_name TEXT NOT NULL,
                related_git_url TEXT NOT NULL,
                related_branch TEXT NOT NULL DEFAULT 'master',
                active BOOLEAN NOT NULL DEFAULT 1,
                UNIQUE(main_git_url, related_git_url)
            );

            CREATE INDEX IF NOT EXISTS idx_report_task ON analysis_report(task_id);
            CREATE INDEX IF NOT EXISTS idx_relation_main ON project_relation(main_git_url);
            "#,
        )
        .map_err(|e| StoreError::operation("initialize schema", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create_task(&self, task: &AnalysisTask) -> Result<(), StoreError> {
        let related = serde_json::to_string(&task.related_projects)
            .map_err(|e| StoreError::operation("serialize related projects", e))?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO analysis_task
            (id, main_git_url, target_branch, base_commit, target_commit,
             enable_cross_project, related_projects, status, log, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                task.id,
                task.main_git_url,
                task.target_branch,
                task.base_commit,
                task.target_commit,
                task.enable_cross_project,
                related,
                task.status.as_str(),
                task.log,
                task.created_at.timestamp(),
            ],
        )
        .map_err(|e| StoreError::operation("create_task", e))?;
        Ok(())
    }

    async fn append_log(&self, task_id: &str, entry: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE analysis_task SET log = log || ?1 || char(10) WHERE id = ?2",
                params![entry, task_id],
            )
            .map_err(|e| StoreError::operation("append_log", e))?;
        if updated == 0 {
            return Err(StoreError::UnknownTask {
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_status(&self, task_id: &str, status: TaskStatus) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn
            .execute(
                "UPDATE analysis_task SET status = ?1 WHERE id = ?2",
                params![status.as_str(), task_id],
            )
            .map_err(|e| StoreError::operation("update_status", e))?;
        if updated == 0 {
            return Err(StoreError::UnknownTask {
                task_id: task_id.to_string(),
            });
        }
        Ok(())
    }

    async fn insert_report(&self, report: &AnalysisReport) -> Result<(), StoreError> {
        let report_json = serde_json::to_string(report)
            .map_err(|e| StoreError::operation("serialize report", e))?;
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO analysis_report
            (task_id, project_name, file_name, diff_content, risk_level,
             report_json, source_project, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                report.task_id,
                report.project_name,
                report.file_name,
                report.diff_content,
                report.risk_level,
                report_json,
                report.source_project,
                report.created_at.timestamp(),
            ],
        )
        .map_err(|e| StoreError::operation("insert_report", e))?;
        Ok(())
    }

    async fn load_task(&self, task_id: &str) -> Result<Option<AnalysisTask>, StoreError> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, main_git_url, target_branch, base_commit, target_commit,
                    enable_cross_project, related_projects, status, log, created_at
             FROM analysis_task WHERE id = ?1",
            params![task_id],
            |row| {
                let related_raw: String = row.get(6)?;
                let status_raw: String = row.get(7)?;
                let created_ts: i64 = row.get(9)?;
                let related: Vec<RelatedProject> =
                    serde_json::from_str(&related_raw).unwrap_or_default();
                Ok(AnalysisTask {
                    id: row.get(0)?,
                    main_git_url: row.get(1)?,
                    target_branch: row.get(2)?,
                    base_commit: row.get(3)?,
                    target_commit: row.get(4)?,
                    enable_cross_project: row.get(5)?,
                    related_projects: related,
                    status: status_raw.parse().unwrap_or(TaskStatus::Pending),
                    log: row.get(8)?,
                    created_at: Utc
                        .timestamp_opt(created_ts, 0)
                        .single()
                        .unwrap_or_else(Utc::now),
                })
            },
        )
        .optional()
        .map_err(|e| StoreError::operation("load_task", e))
    }

    async fn load_reports(&self, task_id: &str) -> Result<Vec<AnalysisReport>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT report_json FROM analysis_report WHERE task_id = ?1 ORDER BY id")
            .map_err(|e| StoreError::operation("load_reports", e))?;
        let rows = stmt
            .query_map(params![task_id], |row| row.get::<_, String>(0))
            .map_err(|e| StoreError::operation("load_reports", e))?;

        let mut reports = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| StoreError::operation("load_reports", e))?;
            let report = serde_json::from_str(&raw)
                .map_err(|e| StoreError::operation("decode report", e))?;
            reports.push(report);
        }
        Ok(reports)
    }

    async fn load_project_relations(
        &self,
        main_git_url: &str,
    ) -> Result<Vec<ProjectRelation>, StoreError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT main_name, main_git_url, related_name, related_git_url,
                        related_branch, active
                 FROM project_relation
                 WHERE main_git_url = ?1 AND active = 1
                 ORDER BY related_name",
            )
            .map_err(|e| StoreError::operation("load_project_relations", e))?;
        let rows = stmt
            .query_map(params![main_git_url], |row| {
                Ok(ProjectRelation {
                    main_name: row.get(0)?,
                    main_git_url: row.get(1)?,
                    related_name: row.get(2)?,
                    related_git_url: row.get(3)?,
                    related_branch: row.get(4)?,
                    active: row.get(5)?,
                })
            })
            .map_err(|e| StoreError::operation("load_project_relations", e))?;

        let mut relations = Vec::new();
        for row in rows {
            relations.push(row.map_err(|e| StoreError::operation("load_project_relations", e))?);
        }
        Ok(relations)
    }

    async fn upsert_project_relation(
        &self,
        relation: &ProjectRelation,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"
            INSERT INTO project_relation
            (main_name, main_git_url, related_name, related_git_url, related_branch, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(main_git_url, related_git_url) DO UPDATE SET
                main_name = excluded.main_name,
                related_name = excluded.related_name,
                related_branch = excluded.related_branch,
                active = excluded.active
            "#,
            params![
                relation.main_name,
                relation.main_git_url,
                relation.related_name,
                relation.related_git_url,
                relation.related_branch,
                relation.active,
            ],
        )
        .map_err(|e| StoreError::operation("upsert_project_relation", e))?;
        Ok(())
    }
}
