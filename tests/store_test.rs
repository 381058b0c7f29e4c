//! SQLite task-store tests.

use chrono::Utc;
use crossimpact::core::types::{
    AnalysisReport, AnalysisTask, ProjectRelation, RelatedProject, TaskStatus,
};
use crossimpact::store::{SqliteStore, TaskStore};
use tempfile::TempDir;

fn sample_task(id: &str) -> AnalysisTask {
    AnalysisTask {
        id: id.to_string(),
        main_git_url: "https://git.example.com/pay-api.git".to_string(),
        target_branch: "master".to_string(),
        base_commit: "aaa111".to_string(),
        target_commit: "bbb222".to_string(),
        enable_cross_project: true,
        related_projects: vec![RelatedProject {
            name: "ucenter-provider".to_string(),
            git_url: "https://git.example.com/ucenter.git".to_string(),
            branch: "master".to_string(),
        }],
        status: TaskStatus::Pending,
        log: String::new(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn task_round_trip_with_log_and_status() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("store.db")).await.unwrap();

    store.create_task(&sample_task("task-1")).await.unwrap();
    store.append_log("task-1", "first entry").await.unwrap();
    store.append_log("task-1", "second entry").await.unwrap();
    store
        .update_status("task-1", TaskStatus::Processing)
        .await
        .unwrap();

    let task = store.load_task("task-1").await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Processing);
    assert_eq!(task.log, "first entry\nsecond entry\n");
    assert_eq!(task.related_projects.len(), 1);
    assert_eq!(task.related_projects[0].name, "ucenter-provider");

    assert!(store.load_task("no-such-task").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_task_is_an_error_for_writes() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("store.db")).await.unwrap();

    assert!(store.append_log("ghost", "entry").await.is_err());
    assert!(store.update_status("ghost", TaskStatus::Failed).await.is_err());
}

#[tokio::test]
async fn reports_are_loaded_per_task_in_insertion_order() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("store.db")).await.unwrap();
    store.create_task(&sample_task("task-1")).await.unwrap();

    for file in ["A.java", "B.java"] {
        let report = AnalysisReport {
            task_id: "task-1".to_string(),
            project_name: "pay-api".to_string(),
            file_name: file.to_string(),
            diff_content: "diff".to_string(),
            risk_level: "LOW".to_string(),
            change_intent: serde_json::json!("tidy"),
            downstream_dependency: vec![],
            cross_service_impact: serde_json::json!([]),
            functional_impact: serde_json::json!({}),
            test_strategy: vec![],
            source_project: "main".to_string(),
            created_at: Utc::now(),
        };
        store.insert_report(&report).await.unwrap();
    }

    let reports = store.load_reports("task-1").await.unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].file_name, "A.java");
    assert_eq!(reports[1].file_name, "B.java");
    assert!(store.load_reports("other").await.unwrap().is_empty());
}

#[tokio::test]
async fn relations_are_unique_per_url_pair_and_filter_inactive() {
    let temp = TempDir::new().unwrap();
    let store = SqliteStore::open(&temp.path().join("store.db")).await.unwrap();

    let mut relation = ProjectRelation {
        main_name: "pay-api".to_string(),
        main_git_url: "https://git.example.com/pay-api.git".to_string(),
        related_name: "ucenter-provider".to_string(),
        related_git_url: "https://git.example.com/ucenter.git".to_string(),
        related_branch: "master".to_string(),
        active: true,
    };
    store.upsert_project_relation(&relation).await.unwrap();

    // same URL pair updates in place instead of duplicating
    relation.related_branch = "develop".to_string();
    store.upsert_project_relation(&relation).await.unwrap();

    let loaded = store
        .load_project_relations("https://git.example.com/pay-api.git")
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].related_branch, "develop");

    // inactive rows disappear from task-start reads
    relation.active = false;
    store.upsert_project_relation(&relation).await.unwrap();
    let loaded = store
        .load_project_relations("https://git.example.com/pay-api.git")
        .await
        .unwrap();
    assert!(loaded.is_empty());
}
