use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI structure for crossimpact - cross-project impact analysis
/// for Java microservice changes.
///
/// crossimpact diffs two revisions of a main repository, traces which
/// classes, APIs and RPC endpoints in related repositories reference the
/// changed code, and turns the evidence into a structured risk report.
///
/// # Examples
///
/// ```bash
/// # Analyze the last commit against master, tracing two related repos
/// crossimpact analyze --repo . --base master --target HEAD \
///     --related "ucenter-provider=https://git.example.com/ucenter.git#master" \
///     --related "order-service=https://git.example.com/order.git"
///
/// # Inspect a repository's symbol index
/// crossimpact index --repo ./pay-api
/// ```
#[derive(Parser)]
#[command(name = "crossimpact")]
#[command(about = "Cross-project impact analysis for Java microservice changes")]
#[command(version)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one end-to-end analysis task
    Analyze {
        /// Existing local checkout of the main repository
        #[arg(long, conflicts_with = "main_url")]
        repo: Option<PathBuf>,

        /// Clone the main repository from this URL instead
        #[arg(long)]
        main_url: Option<String>,

        /// Display name of the main project (defaults to the repo
        /// directory name)
        #[arg(long)]
        main_name: Option<String>,

        /// Branch the analysis represents
        #[arg(long, default_value = "master")]
        branch: String,

        /// Base revision of the diff (ref or commit)
        #[arg(long)]
        base: String,

        /// Target revision of the diff (ref or commit)
        #[arg(long, default_value = "HEAD")]
        target: String,

        /// Related repository as "name=url" or "name=url#branch";
        /// repeatable
        #[arg(long = "related")]
        related: Vec<String>,

        /// Skip cross-project tracing entirely
        #[arg(long)]
        no_cross_project: bool,

        /// Fall back to master/main when a configured branch is missing
        #[arg(long)]
        fallback_default_branch: bool,

        /// Workspace directory receiving one subdirectory per repo
        #[arg(long, default_value = "workspace")]
        workspace: PathBuf,

        /// Directory for serialized symbol indices
        #[arg(long, default_value = ".crossimpact/cache")]
        cache_dir: PathBuf,

        /// SQLite store path (defaults to <workspace>/crossimpact.db)
        #[arg(long)]
        store: Option<PathBuf>,

        /// External LLM command; receives the prompt on stdin and must
        /// print the JSON reply on stdout
        #[arg(long)]
        llm_cmd: Option<String>,

        /// Upper bound on concurrent clone workers
        #[arg(long, default_value = "8")]
        clone_limit: usize,

        /// Per-git-operation timeout in seconds
        #[arg(long, default_value = "120")]
        git_timeout: usize,

        /// Snippet context lines around each citation
        #[arg(long, default_value = "2")]
        context_lines: usize,

        /// Allow an empty diff to complete with zero reports
        #[arg(long)]
        allow_empty_diff: bool,
    },

    /// Build (or cache-load) a repository's symbol index and print
    /// statistics
    Index {
        /// Repository root to index
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Directory for serialized symbol indices
        #[arg(long, default_value = ".crossimpact/cache")]
        cache_dir: PathBuf,

        /// Print the full index as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
}
