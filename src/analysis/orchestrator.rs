//! End-to-end analysis driver.
//!
//! One orchestrator run owns one task: materialize the main repo, diff
//! it, materialize related repos in parallel, trace impacts per changed
//! file, ask the LLM, persist one report per file. Per-repo and per-file
//! failures are logged and absorbed; only configuration errors and git
//! failures on the main repository are fatal.

use crate::analysis::mybatis;
use crate::analysis::prompt::PromptAssembler;
use crate::analysis::report::{
    fallback_reply, merge_impact_windows, refine_line_numbers, request_reply, to_report,
};
use crate::cache::IndexCache;
use crate::core::constants::DIFF_PATHSPEC;
use crate::core::types::{
    AnalysisReport, AnalysisTask, CrossProjectImpacts, ProjectRelation, RelatedProject,
    TaskStatus, Usage,
};
use crate::core::utils::{project_name, FileUtils};
use crate::core::AnalysisConfig;
use crate::error::{EngineError, GitError};
use crate::git::client::{is_git_repo, triple_dot_range};
use crate::git::diff::{split_diff, FileDiff};
use crate::git::{Git, RepoMaterializer};
use crate::indexer::{parse_java_source, ParsedFile};
use crate::llm::LlmClient;
use crate::store::{TaskLog, TaskStore};
use crate::trace::{MultiProjectTracer, UsageTracer};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where the main repository comes from
#[derive(Debug, Clone)]
pub enum MainSource {
    /// Clone/update from a URL into the workspace
    Url(String),
    /// Use an existing checkout as-is
    LocalPath(PathBuf),
}

/// One analysis request, CLI- or store-originated
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub main: MainSource,
    pub main_name: String,
    pub target_branch: String,
    pub base_commit: String,
    pub target_commit: String,
    pub related_projects: Vec<RelatedProject>,
}

pub struct Orchestrator {
    config: AnalysisConfig,
    git: Arc<dyn Git>,
    store: Arc<dyn TaskStore>,
    llm: Arc<dyn LlmClient>,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        config: AnalysisConfig,
        git: Arc<dyn Git>,
        store: Arc<dyn TaskStore>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            config,
            git,
            store,
            llm,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancellation flag, checked between files and between repo workers.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run one analysis task to completion. Returns the persisted
    /// reports; the task row carries status and log.
    pub async fn run(&self, request: TaskRequest) -> Result<Vec<AnalysisReport>, EngineError> {
        self.config.validate()?;

        let main_git_url = match &request.main {
            MainSource::Url(url) => url.clone(),
            MainSource::LocalPath(path) => path.display().to_string(),
        };

        // A request without explicit related projects falls back to the
        // relations configured for this main repository
        let mut request = request;
        if request.related_projects.is_empty() && self.config.enable_cross_project {
            request.related_projects = self
                .store
                .load_project_relations(&main_git_url)
                .await?
                .iter()
                .map(ProjectRelation::to_related_project)
                .collect();
        }

        let task = AnalysisTask {
            id: Uuid::new_v4().to_string(),
            main_git_url,
            target_branch: request.target_branch.clone(),
            base_commit: request.base_commit.clone(),
            target_commit: request.target_commit.clone(),
            enable_cross_project: self.config.enable_cross_project,
            related_projects: request.related_projects.clone(),
            status: TaskStatus::Pending,
            log: String::new(),
            created_at: Utc::now(),
        };
        self.store.create_task(&task).await?;
        let log = TaskLog::new(Arc::clone(&self.store), task.id.clone());
        self.store
            .update_status(&task.id, TaskStatus::Processing)
            .await?;

        match self.run_inner(&task, &request, &log).await {
            Ok(reports) => {
                self.store
                    .update_status(&task.id, TaskStatus::Completed)
                    .await?;
                log.append(format!("task completed: {} report(s)", reports.len()))
                    .await;
                Ok(reports)
            }
            Err(err) => {
                let reason = match &err {
                    EngineError::Cancelled => "cancelled by user".to_string(),
                    other => error_chain(other),
                };
                log.append(format!("task failed: {reason}")).await;
                self.store.update_status(&task.id, TaskStatus::Failed).await?;
                Err(err)
            }
        }
    }

    async fn run_inner(
        &self,
        task: &AnalysisTask,
        request: &TaskRequest,
        log: &TaskLog,
    ) -> Result<Vec<AnalysisReport>, EngineError> {
        FileUtils::ensure_dir(&self.config.workspace)
            .await
            .map_err(|_| {
                EngineError::Config(crate::error::ConfigError::WorkspaceNotWritable {
                    path: self.config.workspace.clone(),
                })
            })?;

        // 1. main repo; failure here is fatal
        let main_root = self.materialize_main(request, log).await?;
        let main_name = project_name(&main_root);

        // 2. diff
        let range = triple_dot_range(&request.base_commit, &request.target_commit);
        let diff_text = self.git.diff(&main_root, &range, DIFF_PATHSPEC).await?;
        if diff_text.trim().is_empty() {
            if self.config.require_nonempty_diff {
                return Err(GitError::EmptyDiff {
                    base: request.base_commit.clone(),
                    target: request.target_commit.clone(),
                }
                .into());
            }
            log.append(format!("no changes between {range}")).await;
            return Ok(Vec::new());
        }
        let files = split_diff(&diff_text);
        log.append(format!("{} changed file(s) in {range}", files.len()))
            .await;

        // 3. related repos, in parallel, partial failure tolerated
        let mut scan_roots = vec![main_root.clone()];
        let mut roots_by_project: BTreeMap<String, PathBuf> = BTreeMap::new();
        if self.config.enable_cross_project && !request.related_projects.is_empty() {
            let materializer = RepoMaterializer::new(Arc::clone(&self.git))
                .with_parallel_limit(self.config.clone_workers(request.related_projects.len()))
                .with_branch_fallback(self.config.fallback_to_default_branch);
            let outcome = materializer
                .materialize(&request.related_projects, &self.config.workspace)
                .await;
            for repo in &outcome.ok {
                log.append(format!(
                    "related repo ready: {} @ {} ({})",
                    repo.name, repo.branch, repo.head_commit
                ))
                .await;
                roots_by_project.insert(repo.name.clone(), repo.path.clone());
                scan_roots.push(repo.path.clone());
            }
            for failure in &outcome.fail {
                log.append(format!(
                    "related repo failed: {}: {}",
                    failure.name, failure.error
                ))
                .await;
            }
        }

        // 4. tracer over all scan roots; with a single root the
        //    cross-project query is trivially empty
        let cache = IndexCache::new(&self.config.cache_dir, Arc::clone(&self.git));
        let tracer = MultiProjectTracer::init(scan_roots, &cache).await;
        for degraded in tracer.degraded_projects() {
            log.append(format!("index degraded, repo skipped: {degraded}"))
                .await;
        }

        // 5. per changed file
        let assembler = PromptAssembler::new(self.config.context_lines);
        let mut reports = Vec::new();
        for file in &files {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(EngineError::Cancelled);
            }
            let report = self
                .analyze_file(task, file, &main_root, &main_name, &tracer, &roots_by_project, &assembler, log)
                .await;
            match report {
                Ok(report) => {
                    self.store.insert_report(&report).await?;
                    log.append(format!("report stored for {}", file.path)).await;
                    reports.push(report);
                }
                Err(err) => {
                    // Per-file failures never abort the task
                    warn!(file = %file.path, error = %err, "file analysis failed");
                    log.append(format!("file skipped: {}: {err}", file.path)).await;
                }
            }
        }

        Ok(reports)
    }

    async fn materialize_main(
        &self,
        request: &TaskRequest,
        log: &TaskLog,
    ) -> Result<PathBuf, EngineError> {
        match &request.main {
            MainSource::LocalPath(path) => {
                if !is_git_repo(path) {
                    return Err(GitError::NotARepository { path: path.clone() }.into());
                }
                log.append(format!("main repo (local): {}", path.display()))
                    .await;
                Ok(path.clone())
            }
            MainSource::Url(url) => {
                let materializer = RepoMaterializer::new(Arc::clone(&self.git))
                    .with_branch_fallback(self.config.fallback_to_default_branch);
                let repo = materializer
                    .materialize_single(
                        &RelatedProject {
                            name: request.main_name.clone(),
                            git_url: url.clone(),
                            branch: request.target_branch.clone(),
                        },
                        &self.config.workspace,
                    )
                    .await?;
                log.append(format!(
                    "main repo ready: {} @ {} ({})",
                    repo.name, repo.branch, repo.head_commit
                ))
                .await;
                Ok(repo.path)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn analyze_file(
        &self,
        task: &AnalysisTask,
        file: &FileDiff,
        main_root: &Path,
        main_name: &str,
        tracer: &MultiProjectTracer,
        roots_by_project: &BTreeMap<String, PathBuf>,
        assembler: &PromptAssembler,
        log: &TaskLog,
    ) -> Result<AnalysisReport, EngineError> {
        let (fqn, changed_methods) = self.changed_symbol(file, main_root).await;
        if let Some(fqn) = &fqn {
            log.append(format!(
                "analyzing {}: class {fqn}, changed methods [{}]",
                file.path,
                changed_methods.join(", ")
            ))
            .await;
        } else {
            log.append(format!("analyzing {}: no class resolved", file.path))
                .await;
        }

        // In-repo downstream findings
        let usages: Vec<Usage> = match (&fqn, tracer.main_index()) {
            (Some(fqn), Some(index)) => UsageTracer::new(main_root, index).find_usages(fqn),
            _ => Vec::new(),
        };

        // Cross-repo impacts
        let impacts = match &fqn {
            Some(fqn) => tracer.find_cross_project_impacts(fqn, &changed_methods),
            None => CrossProjectImpacts::default(),
        };
        if !impacts.impacts.is_empty() {
            log.append(format!(
                "{} cross-project impact(s) for {}",
                impacts.impacts.len(),
                file.path
            ))
            .await;
        }

        let prompt = assembler.assemble(
            &file.path,
            &file.diff,
            main_root,
            &usages,
            &impacts.impacts,
            roots_by_project,
        );

        let mut reply = match request_reply(self.llm.as_ref(), &prompt).await {
            Ok(reply) => reply,
            Err(err) => {
                log.append(format!("LLM failed for {}: {err}; storing fallback report", file.path))
                    .await;
                fallback_reply(&err.to_string())
            }
        };

        merge_impact_windows(&mut reply, &impacts.impacts, roots_by_project, assembler);
        refine_line_numbers(&mut reply, main_root);

        Ok(to_report(
            reply,
            &task.id,
            main_name,
            &file.path,
            &file.diff,
            "main",
        ))
    }

    /// FQN and changed-method list for one changed file.
    async fn changed_symbol(&self, file: &FileDiff, main_root: &Path) -> (Option<String>, Vec<String>) {
        if file.is_deleted {
            return (None, Vec::new());
        }
        let path = Path::new(&file.path);
        match path.extension().and_then(|e| e.to_str()) {
            Some("java") => self.changed_java_symbol(file, main_root).await,
            Some("xml") => self.changed_mapper_symbol(file, main_root).await,
            _ => (None, Vec::new()),
        }
    }

    async fn changed_java_symbol(
        &self,
        file: &FileDiff,
        main_root: &Path,
    ) -> (Option<String>, Vec<String>) {
        let full = main_root.join(&file.path);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(err) => {
                info!(file = %file.path, error = %err, "post-image unreadable; falling back to hunk headers");
                return (None, methods_from_hunks(&file.diff));
            }
        };
        let parsed: ParsedFile = parse_java_source(&content);
        let fqn = parsed.fqn.clone();

        let mut methods = intersect_methods(&parsed, &file.added_lines);
        if methods.is_empty() {
            methods = methods_from_hunks(&file.diff);
        }
        (fqn, methods)
    }

    async fn changed_mapper_symbol(
        &self,
        file: &FileDiff,
        main_root: &Path,
    ) -> (Option<String>, Vec<String>) {
        let full = main_root.join(&file.path);
        let Ok(content) = tokio::fs::read_to_string(&full).await else {
            return (None, Vec::new());
        };
        let namespace = mybatis::mapper_namespace(&content);
        let ids = mybatis::changed_sql_ids(&file.diff);
        (namespace, ids)
    }
}

/// Flatten an error and its sources into one log line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(s) = source {
        reason.push_str(": ");
        reason.push_str(&s.to_string());
        source = s.source();
    }
    reason
}

/// Intersect the diff's added lines with method body ranges.
fn intersect_methods(parsed: &ParsedFile, added_lines: &[usize]) -> Vec<String> {
    let ranges = parsed.method_ranges();
    let mut methods = Vec::new();
    for line in added_lines {
        for range in &ranges {
            if *line >= range.start && *line <= range.end {
                if !methods.contains(&range.name) {
                    methods.push(range.name.clone());
                }
                break;
            }
        }
    }
    methods
}

static HUNK_CONTEXT_METHOD_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?:public|protected|private|static)\s+[\w<>\[\],\s.]+\s+(\w+)\s*\(").ok()
});

/// Fallback changed-method extraction from hunk headers and `+` lines,
/// for files whose post-image cannot be parsed.
fn methods_from_hunks(diff: &str) -> Vec<String> {
    let mut methods = Vec::new();
    for line in diff.lines() {
        let candidate = if let Some(rest) = line.strip_prefix("@@") {
            rest.rsplit("@@").next().unwrap_or("")
        } else if line.starts_with('+') && !line.starts_with("+++") {
            &line[1..]
        } else {
            continue;
        };
        let trimmed = candidate.trim();
        if trimmed.starts_with("import ") || trimmed.starts_with('@') || trimmed.starts_with("package ") {
            continue;
        }
        if let Some(cap) = HUNK_CONTEXT_METHOD_RE.as_ref().and_then(|re| re.captures(candidate)) {
            let name = cap[1].to_string();
            if !methods.contains(&name) {
                methods.push(name);
            }
        }
    }
    methods
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::parse_java_source;

    const SOURCE: &str = r#"package com.example;

public class Svc {

    public void alpha() {
        int x = 1;
    }

    public void beta() {
        int y = 2;
    }
}
"#;

    #[test]
    fn added_lines_map_to_methods() {
        let parsed = parse_java_source(SOURCE);
        // line 6 is inside alpha, line 10 inside beta
        assert_eq!(intersect_methods(&parsed, &[6]), vec!["alpha"]);
        assert_eq!(intersect_methods(&parsed, &[6, 10]), vec!["alpha", "beta"]);
        assert!(intersect_methods(&parsed, &[]).is_empty());
    }

    #[test]
    fn hunk_fallback_scrapes_method_names() {
        let diff = "@@ -10,3 +10,4 @@ public void transfer(Long from) {\n+        audit(from);\n+    public int addPoints(Long userId) {\n";
        let methods = methods_from_hunks(diff);
        assert!(methods.contains(&"transfer".to_string()));
        assert!(methods.contains(&"addPoints".to_string()));
    }
}
