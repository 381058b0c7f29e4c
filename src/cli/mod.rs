//! Command-line interface: argument parsing, wiring, exit codes.
//!
//! Exit codes: 0 task completed, 2 task failed, 3 configuration error.

pub mod args;

use crate::analysis::{MainSource, Orchestrator, TaskRequest};
use crate::cache::IndexCache;
use crate::core::types::RelatedProject;
use crate::core::utils::project_name;
use crate::core::AnalysisConfig;
use crate::error::{ConfigError, EngineError};
use crate::git::GitClient;
use crate::llm::{CommandLlm, LlmClient};
use crate::store::SqliteStore;
use args::{Cli, Commands};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

pub use args::Cli as CliArgs;

const EXIT_OK: i32 = 0;
const EXIT_TASK_FAILED: i32 = 2;
const EXIT_CONFIG_ERROR: i32 = 3;

pub async fn run_cli() -> i32 {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command).await {
        Ok(()) => EXIT_OK,
        Err(EngineError::Config(err)) => {
            eprintln!("{} {err}", "configuration error:".red().bold());
            EXIT_CONFIG_ERROR
        }
        Err(err) => {
            eprintln!("{} {}", "task failed:".red().bold(), error_chain(&err));
            EXIT_TASK_FAILED
        }
    }
}

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

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "crossimpact=debug" } else { "crossimpact=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(command: Commands) -> Result<(), EngineError> {
    match command {
        Commands::Analyze {
            repo,
            main_url,
            main_name,
            branch,
            base,
            target,
            related,
            no_cross_project,
            fallback_default_branch,
            workspace,
            cache_dir,
            store,
            llm_cmd,
            clone_limit,
            git_timeout,
            context_lines,
            allow_empty_diff,
        } => {
            let config = AnalysisConfig {
                workspace: workspace.clone(),
                cache_dir,
                enable_cross_project: !no_cross_project,
                fallback_to_default_branch: fallback_default_branch,
                parallel_clone_limit: clone_limit,
                git_op_timeout_seconds: git_timeout as u64,
                context_lines,
                require_nonempty_diff: !allow_empty_diff,
            };
            config.validate()?;

            let (main, resolved_name) = match (repo, main_url) {
                (Some(path), None) => {
                    let name = main_name.unwrap_or_else(|| project_name(&path));
                    (MainSource::LocalPath(path), name)
                }
                (None, Some(url)) => {
                    let name = main_name
                        .or_else(|| name_from_url(&url))
                        .unwrap_or_else(|| "main".to_string());
                    (MainSource::Url(url), name)
                }
                _ => {
                    return Err(ConfigError::MissingOption {
                        name: "--repo or --main-url".to_string(),
                    }
                    .into())
                }
            };

            let related_projects = related
                .iter()
                .map(|entry| parse_related(entry))
                .collect::<Result<Vec<_>, _>>()?;

            let store_path =
                store.unwrap_or_else(|| workspace.join("crossimpact.db"));
            let store = Arc::new(SqliteStore::open(&store_path).await?);

            let llm: Arc<dyn LlmClient> = match llm_cmd {
                Some(cmd) => {
                    let mut parts = cmd.split_whitespace().map(String::from);
                    let program = parts.next().ok_or_else(|| ConfigError::InvalidValue {
                        name: "--llm-cmd".to_string(),
                        reason: "empty command".to_string(),
                    })?;
                    Arc::new(CommandLlm::new(
                        program,
                        parts.collect(),
                        crate::core::constants::defaults::LLM_TIMEOUT_SECONDS,
                    ))
                }
                None => {
                    return Err(ConfigError::MissingOption {
                        name: "--llm-cmd".to_string(),
                    }
                    .into())
                }
            };

            let git = Arc::new(GitClient::new(config.git_op_timeout_seconds));
            let orchestrator = Orchestrator::new(config, git, store, llm);

            let reports = orchestrator
                .run(TaskRequest {
                    main,
                    main_name: resolved_name,
                    target_branch: branch,
                    base_commit: base,
                    target_commit: target,
                    related_projects,
                })
                .await?;

            println!(
                "{} {} report(s) stored",
                "analysis complete:".green().bold(),
                reports.len()
            );
            for report in &reports {
                println!(
                    "  {:<10} {}",
                    report.risk_level.yellow(),
                    report.file_name
                );
            }
            Ok(())
        }

        Commands::Index { repo, cache_dir, json } => {
            let git = Arc::new(GitClient::default());
            let cache = IndexCache::new(cache_dir, git);
            let index = cache.get_or_build(&repo).await;

            if json {
                match serde_json::to_string_pretty(&index) {
                    Ok(out) => println!("{out}"),
                    Err(err) => eprintln!("failed to encode index: {err}"),
                }
            } else {
                println!("{}", format!("index for {}", repo.display()).bold());
                let commit = if index.commit_hash.is_empty() {
                    "<none>"
                } else {
                    index.commit_hash.as_str()
                };
                println!("  commit:  {commit}");
                println!("  files:   {}", index.files_scanned.len());
                println!("  classes: {}", index.class_map.len());
                println!("  routes:  {}", index.api_map.len());
                println!(
                    "  rpc:     {} injection site(s)",
                    index.rpc_map.values().map(Vec::len).sum::<usize>()
                );
            }
            Ok(())
        }
    }
}

/// Parse one `--related` entry: `name=url` or `name=url#branch`.
fn parse_related(entry: &str) -> Result<RelatedProject, ConfigError> {
    let (name, rest) = entry.split_once('=').ok_or_else(|| {
        ConfigError::InvalidRelatedProject {
            entry: entry.to_string(),
            reason: "expected name=url or name=url#branch".to_string(),
        }
    })?;
    if name.trim().is_empty() || rest.trim().is_empty() {
        return Err(ConfigError::InvalidRelatedProject {
            entry: entry.to_string(),
            reason: "name and url must be non-empty".to_string(),
        });
    }
    let (url, branch) = match rest.rsplit_once('#') {
        Some((url, branch)) if !branch.is_empty() => (url, branch),
        _ => (rest, crate::core::constants::defaults::DEFAULT_BRANCH),
    };
    Ok(RelatedProject {
        name: name.trim().to_string(),
        git_url: url.trim().to_string(),
        branch: branch.trim().to_string(),
    })
}

fn name_from_url(url: &str) -> Option<String> {
    let tail = url.trim_end_matches('/').rsplit('/').next()?;
    let name = tail.trim_end_matches(".git");
    (!name.is_empty()).then(|| name.to_string())
}

/// Workspace path for a task id, for callers coordinating disjoint
/// workspaces across concurrent tasks.
pub fn task_workspace(base: &std::path::Path, task_id: &str) -> PathBuf {
    base.join(task_id)
}
