//! End-to-end orchestrator tests: real local git repos, scripted LLM,
//! in-memory store.

mod common;

use common::{commit_all, init_repo, write_file, POINT_CLIENT, POINT_MANAGER, ORDER_NOTIFIER};
use crossimpact::core::types::RelatedProject;
use crossimpact::git::GitClient;
use crossimpact::llm::StaticLlm;
use crossimpact::store::MemoryStore;
use crossimpact::{AnalysisConfig, EngineError, MainSource, Orchestrator, TaskRequest, TaskStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const POINT_CLIENT_BEFORE: &str = r#"package com.cloudE.pay.client;

import org.springframework.cloud.openfeign.FeignClient;
import org.springframework.web.bind.annotation.GetMapping;

@FeignClient(name = "pay-provider", path = "/points")
public interface PointClient {

    @GetMapping("/balance")
    Long getBalance(Long userId);
}
"#;

const LLM_REPLY: &str = r#"{
    "risk_level": "HIGH",
    "change_intent": [{"summary": "adds batchUpdatePoints to PointClient", "details": []}],
    "downstream_dependency": [{
        "service_name": "ucenter-provider",
        "file_path": "src/main/java/com/cloudE/ucenter/manager/PointManager.java",
        "line_number": "",
        "caller_class": "PointManager",
        "caller_method": "rewardSignIn(Long)",
        "target_method": "batchUpdatePoints",
        "call_snippet": "pointClient.batchUpdatePoints(userId, 10);",
        "impact_description": "calls the new batch update"
    }],
    "cross_service_impact": ["ucenter-provider consumes PointClient"],
    "functional_impact": {"business_scenario": "points accrual"},
    "test_strategy": [{"title": "batch update", "priority": "P0", "steps": "call it", "payload": "", "validation": "points added"}]
}"#;

struct Estate {
    _temp: TempDir,
    main_repo: PathBuf,
    base_commit: String,
    target_commit: String,
    related: Vec<RelatedProject>,
    config: AnalysisConfig,
}

/// Main repo gains batchUpdatePoints between two commits; one related
/// repo consumes it.
fn build_estate() -> Estate {
    let temp = TempDir::new().unwrap();

    let main_repo = temp.path().join("origins/pay-api");
    write_file(
        &main_repo,
        "src/main/java/com/cloudE/pay/client/PointClient.java",
        POINT_CLIENT_BEFORE,
    );
    let base_commit = init_repo(&main_repo);
    write_file(
        &main_repo,
        "src/main/java/com/cloudE/pay/client/PointClient.java",
        POINT_CLIENT,
    );
    let target_commit = commit_all(&main_repo, "add batchUpdatePoints");

    let ucenter = temp.path().join("origins/ucenter-provider");
    write_file(
        &ucenter,
        "src/main/java/com/cloudE/ucenter/manager/PointManager.java",
        POINT_MANAGER,
    );
    write_file(
        &ucenter,
        "src/main/java/com/cloudE/ucenter/task/OrderNotifier.java",
        ORDER_NOTIFIER,
    );
    init_repo(&ucenter);

    let related = vec![RelatedProject {
        name: "ucenter-provider".to_string(),
        git_url: ucenter.display().to_string(),
        branch: "master".to_string(),
    }];

    let config = AnalysisConfig {
        workspace: temp.path().join("ws"),
        cache_dir: temp.path().join("cache"),
        ..Default::default()
    };

    Estate {
        _temp: temp,
        main_repo,
        base_commit,
        target_commit,
        related,
        config,
    }
}

fn request_for(estate: &Estate) -> TaskRequest {
    TaskRequest {
        main: MainSource::LocalPath(estate.main_repo.clone()),
        main_name: "pay-api".to_string(),
        target_branch: "master".to_string(),
        base_commit: estate.base_commit.clone(),
        target_commit: estate.target_commit.clone(),
        related_projects: estate.related.clone(),
    }
}

fn orchestrator_with(
    estate: &Estate,
    store: Arc<MemoryStore>,
    llm: Arc<StaticLlm>,
) -> Orchestrator {
    Orchestrator::new(
        estate.config.clone(),
        Arc::new(GitClient::default()),
        store,
        llm,
    )
}

#[tokio::test]
async fn full_run_produces_one_report_per_changed_file() {
    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(StaticLlm::new(vec![LLM_REPLY.to_string()]));

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), Arc::clone(&llm));
    let reports = orchestrator.run(request_for(&estate)).await.unwrap();

    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.risk_level, "HIGH");
    assert_eq!(report.source_project, "main");
    assert!(report.file_name.ends_with("PointClient.java"));
    assert_eq!(report.project_name, "pay-api");

    // task reached COMPLETED and its log tells the story
    let tasks = store.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks[0].log.contains("related repo ready: ucenter-provider"));
    assert!(tasks[0].log.contains("report stored"));

    // the prompt carried the diff and the cross-project evidence
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("```diff"));
    assert!(prompts[0].contains("# Cross-project impacts"));
    assert!(prompts[0].contains("ucenter-provider"));
    assert!(prompts[0].contains("batchUpdatePoints"));

    // traced line numbers and snippet windows were merged into the
    // downstream row the model returned without them
    assert_eq!(report.downstream_dependency.len(), 1);
    let dep = &report.downstream_dependency[0];
    let lines: Vec<&str> = dep.line_number.split_whitespace().collect();
    assert!(lines.len() >= 3, "expected merged lines, got {:?}", dep.line_number);
    assert!(!dep.snippet_windows.is_empty());

    // persisted through the store as well
    assert_eq!(store.reports().len(), 1);
}

#[tokio::test]
async fn llm_failure_stores_a_fallback_report() {
    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    // both attempts return garbage
    let llm = Arc::new(StaticLlm::new(vec![
        "no json here".to_string(),
        "still no json".to_string(),
    ]));

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), llm);
    let reports = orchestrator.run(request_for(&estate)).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].risk_level, "UNKNOWN");

    let tasks = store.tasks();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks[0].log.contains("storing fallback report"));
}

#[tokio::test]
async fn empty_diff_fails_the_task() {
    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(StaticLlm::new(vec![]));

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), llm);
    let mut request = request_for(&estate);
    request.base_commit = estate.target_commit.clone();

    let err = orchestrator.run(request).await.unwrap_err();
    assert!(matches!(err, EngineError::Git(_)));

    let tasks = store.tasks();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
}

#[tokio::test]
async fn cancellation_fails_the_task_with_a_reason() {
    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(StaticLlm::new(vec![LLM_REPLY.to_string()]));

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), llm);
    orchestrator
        .cancel_flag()
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let err = orchestrator.run(request_for(&estate)).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));

    let tasks = store.tasks();
    assert_eq!(tasks[0].status, TaskStatus::Failed);
    assert!(tasks[0].log.contains("cancelled by user"));
}

#[tokio::test]
async fn broken_related_repo_degrades_but_completes() {
    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(StaticLlm::new(vec![LLM_REPLY.to_string()]));

    let mut request = request_for(&estate);
    request.related_projects.push(RelatedProject {
        name: "broken".to_string(),
        git_url: "/no/such/origin".to_string(),
        branch: "master".to_string(),
    });

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), llm);
    let reports = orchestrator.run(request).await.unwrap();
    assert_eq!(reports.len(), 1);

    let tasks = store.tasks();
    assert_eq!(tasks[0].status, TaskStatus::Completed);
    assert!(tasks[0].log.contains("related repo failed: broken"));
    assert!(tasks[0].log.contains("related repo ready: ucenter-provider"));
}

#[tokio::test]
async fn configured_relations_back_an_unspecified_request() {
    use crossimpact::core::types::ProjectRelation;
    use crossimpact::store::TaskStore;

    let estate = build_estate();
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(StaticLlm::new(vec![LLM_REPLY.to_string()]));

    // the relation row stands in for the request's related projects
    store
        .upsert_project_relation(&ProjectRelation {
            main_name: "pay-api".to_string(),
            main_git_url: estate.main_repo.display().to_string(),
            related_name: "ucenter-provider".to_string(),
            related_git_url: estate.related[0].git_url.clone(),
            related_branch: "master".to_string(),
            active: true,
        })
        .await
        .unwrap();

    let mut request = request_for(&estate);
    request.related_projects.clear();

    let orchestrator = orchestrator_with(&estate, Arc::clone(&store), Arc::clone(&llm));
    let reports = orchestrator.run(request).await.unwrap();
    assert_eq!(reports.len(), 1);

    let tasks = store.tasks();
    assert_eq!(tasks[0].related_projects.len(), 1);
    assert_eq!(tasks[0].related_projects[0].name, "ucenter-provider");
    assert!(llm.prompts()[0].contains("# Cross-project impacts"));
}

/// Scenario: re-running the same analysis reuses every cached index.
#[tokio::test]
async fn rerun_hits_the_index_cache() {
    let estate = build_estate();

    let run = |store: Arc<MemoryStore>| {
        let llm = Arc::new(StaticLlm::new(vec![LLM_REPLY.to_string()]));
        let orchestrator = orchestrator_with(&estate, store, llm);
        let request = request_for(&estate);
        async move { orchestrator.run(request).await }
    };

    run(Arc::new(MemoryStore::new())).await.unwrap();

    // second run, same HEADs everywhere: indices come from cache
    run(Arc::new(MemoryStore::new())).await.unwrap();

    let cache = crossimpact::cache::IndexCache::new(
        &estate.config.cache_dir,
        Arc::new(GitClient::default()),
    );
    let _ = cache.get_or_build(&estate.main_repo).await;
    assert_eq!(cache.build_count(), 0, "main index should be cache-hot");
    assert_eq!(cache.hit_count(), 1);

    let ucenter_clone = estate.config.workspace.join("ucenter-provider");
    let _ = cache.get_or_build(Path::new(&ucenter_clone)).await;
    assert_eq!(cache.build_count(), 0, "related index should be cache-hot");
}
