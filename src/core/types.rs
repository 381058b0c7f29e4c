//! Core data model: symbol indices, usages, impacts, tasks and reports.
//!
//! These are the explicit sum types replacing the nested dicts of the
//! legacy analyzer. Everything that crosses a component boundary or the
//! cache lives here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One `import` declaration captured from a Java file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    /// Imported path without the trailing `;` or `.*`
    pub path: String,

    /// True for `import a.b.*;`
    pub wildcard: bool,
}

impl ImportDecl {
    /// True when this import makes `fqn` visible in the file.
    pub fn resolves(&self, fqn: &str) -> bool {
        if self.wildcard {
            match fqn.rsplit_once('.') {
                Some((pkg, _)) => pkg == self.path,
                None => false,
            }
        } else {
            self.path == fqn
        }
    }
}

/// Per-file facts recorded during indexing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMeta {
    /// Package declaration, if present
    pub package: Option<String>,

    /// Primary type name declared at bracket depth zero
    pub primary_class: Option<String>,

    /// All import declarations, explicit and wildcard
    pub imports: Vec<ImportDecl>,
}

/// Role of an indexed class, derived from its annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    /// `@RestController` / `@Controller`
    Controller,
    /// `@FeignClient` interface
    FeignClient,
    /// `@DubboService` implementation
    DubboService,
    /// Plain interface declaration
    Interface,
    /// Anything else
    #[default]
    Plain,
}

/// One HTTP route entry: class-level base path + method mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEntry {
    /// Normalized route, e.g. `/api/points/batch`
    pub route: String,

    /// HTTP verb, or `REQUEST` for an unqualified `@RequestMapping`
    pub verb: String,

    /// Fully qualified name of the declaring class
    pub class_fqn: String,

    /// Handler method name
    pub method_name: String,

    /// Repo-relative file path
    pub file: PathBuf,

    /// 1-based line of the mapping annotation
    pub line: usize,
}

/// One RPC / DI injection site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcEntry {
    /// Injected interface type: FQN when the file's imports resolve it,
    /// otherwise the simple name as written
    pub interface: String,

    /// Repo-relative file path
    pub file: PathBuf,

    /// 1-based line of the injection annotation
    pub line: usize,

    /// `dubbo` or `spring_di`
    pub kind: String,

    /// Declared field name, used to attribute call sites
    pub field_name: String,
}

/// Per-repository symbol tables produced by the indexer.
///
/// Deterministic with respect to file contents: ordered maps only, no
/// timestamps. An index loaded from cache with a matching commit hash is
/// equivalent to a freshly built one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolIndex {
    /// Fully qualified class name -> repo-relative file path
    pub class_map: BTreeMap<String, PathBuf>,

    /// Simple class name -> set of FQNs (duplicates across packages kept)
    pub simple_names: BTreeMap<String, BTreeSet<String>>,

    /// Normalized route -> route entries
    pub api_map: BTreeMap<String, Vec<ApiEntry>>,

    /// Injected interface name -> injection sites
    pub rpc_map: BTreeMap<String, Vec<RpcEntry>>,

    /// FQN -> class role
    pub class_kinds: BTreeMap<String, ClassKind>,

    /// Implementation FQN -> interfaces it implements (resolved to FQNs
    /// where the file's imports allow). Callers usually reference the
    /// interface, so a change to an implementation is traced through
    /// these as well.
    pub impl_interfaces: BTreeMap<String, Vec<String>>,

    /// Repo-relative path -> per-file facts
    pub file_meta: BTreeMap<PathBuf, FileMeta>,

    /// Every file visited by the scan
    pub files_scanned: BTreeSet<PathBuf>,

    /// HEAD commit hash at index time; empty for non-git trees
    pub commit_hash: String,
}

impl SymbolIndex {
    /// Routes declared by `fqn`, optionally restricted to `methods`.
    /// An empty method list means all of the class's routes.
    pub fn routes_of(&self, fqn: &str, methods: &[String]) -> Vec<&ApiEntry> {
        self.api_map
            .values()
            .flatten()
            .filter(|e| e.class_fqn == fqn)
            .filter(|e| methods.is_empty() || methods.iter().any(|m| m == &e.method_name))
            .collect()
    }

    /// True when `fqn` is a Feign client or Dubbo service in this index.
    pub fn is_remote_interface(&self, fqn: &str) -> bool {
        matches!(
            self.class_kinds.get(fqn),
            Some(ClassKind::FeignClient) | Some(ClassKind::DubboService)
        )
    }
}

/// How a usage line references the target type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageKind {
    /// The simple name appears as a type token (declaration, parameter,
    /// `new`, `extends`, `implements`, cast, generic argument)
    TypeUse,

    /// A DI annotation immediately precedes a field of the target type
    Injection { injection: String },

    /// A method invocation through a field/variable of the target type
    MethodCall { method: String },
}

/// One reference site found by the usage tracer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Repo-relative path of the referencing file
    pub path: PathBuf,

    /// 1-based line number
    pub line: usize,

    /// Trimmed source line
    pub snippet: String,

    /// First path segment, used only as a human label
    pub service: String,

    pub kind: UsageKind,
}

/// One call site of an HTTP route found by the API-caller scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCall {
    pub path: PathBuf,
    pub line: usize,
    pub snippet: String,
    /// The route that matched
    pub route: String,
    /// Client idiom that produced the match: `RestTemplate`, `WebClient`
    /// or `FeignClient`
    pub client: String,
}

/// Category of a cross-project impact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactKind {
    ClassReference,
    ApiCall,
    RpcReference,
}

impl ImpactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClassReference => "class_reference",
            Self::ApiCall => "api_call",
            Self::RpcReference => "rpc_reference",
        }
    }
}

/// A single discovered cross-repo reference to a changed symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Impact {
    /// Related-repo name; never the main repo's name
    pub project: String,

    #[serde(rename = "type")]
    pub kind: ImpactKind,

    /// Path relative to the related repo's root
    pub file: PathBuf,

    /// 1-based line number, always >= 1
    pub line: usize,

    /// Trimmed source line at `line`
    pub snippet: String,

    /// Human-readable description of the reference
    pub detail: String,

    /// Matched route; present iff `kind == ApiCall`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
}

impl Impact {
    /// Sort key mandated for impact lists: (project, file, line).
    pub fn sort_key(&self) -> (&str, &Path, usize) {
        (&self.project, &self.file, self.line)
    }
}

/// Result of a cross-project scan, with the repos that had to be skipped
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossProjectImpacts {
    pub impacts: Vec<Impact>,

    /// Repos whose index failed to build; surfaced in the task log
    pub degraded_projects: Vec<String>,
}

/// One numbered line of snippet context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    pub line: usize,
    pub code: String,
}

/// Code-snippet window around a citation: target line plus K lines of
/// context either side, with absolute line numbers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetWindow {
    pub target_line: usize,
    pub target_code: String,
    pub context_before: Vec<ContextLine>,
    pub context_after: Vec<ContextLine>,
}

impl SnippetWindow {
    /// String-flattened form for legacy consumers; the prompt assembler
    /// uses the structured form.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        for ctx in &self.context_before {
            out.push_str(&format!("  {:>5} | {}\n", ctx.line, ctx.code));
        }
        out.push_str(&format!("> {:>5} | {}\n", self.target_line, self.target_code));
        for ctx in &self.context_after {
            out.push_str(&format!("  {:>5} | {}\n", ctx.line, ctx.code));
        }
        out
    }
}

/// Configured relationship between a main repo and one downstream repo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRelation {
    pub main_name: String,
    pub main_git_url: String,
    pub related_name: String,
    pub related_git_url: String,
    /// Defaults to `master`
    pub related_branch: String,
    pub active: bool,
}

impl ProjectRelation {
    pub fn to_related_project(&self) -> RelatedProject {
        RelatedProject {
            name: self.related_name.clone(),
            git_url: self.related_git_url.clone(),
            branch: self.related_branch.clone(),
        }
    }
}

/// One repo to materialize for a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedProject {
    pub name: String,
    pub git_url: String,
    pub branch: String,
}

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A single analysis run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTask {
    pub id: String,
    pub main_git_url: String,
    pub target_branch: String,
    pub base_commit: String,
    pub target_commit: String,
    pub enable_cross_project: bool,
    pub related_projects: Vec<RelatedProject>,
    pub status: TaskStatus,
    /// Append-only log, one entry per line
    pub log: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One downstream dependency row inside a report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownstreamDependency {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub file_path: String,
    /// Space-separated list of line numbers, or empty when unknown
    #[serde(default)]
    pub line_number: String,
    #[serde(default)]
    pub caller_class: String,
    #[serde(default)]
    pub caller_method: String,
    #[serde(default)]
    pub target_method: String,
    #[serde(default)]
    pub call_snippet: String,
    #[serde(default)]
    pub impact_description: String,
    /// Structured snippet windows attached after refinement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub snippet_windows: Vec<SnippetWindow>,
}

/// One test-strategy row inside a report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestStrategy {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub steps: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub validation: String,
}

/// Structured LLM reply, validated at the boundary.
/// Unknown fields are discarded by serde.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmReply {
    #[serde(default)]
    pub risk_level: String,
    #[serde(default)]
    pub change_intent: serde_json::Value,
    #[serde(default)]
    pub downstream_dependency: Vec<DownstreamDependency>,
    #[serde(default)]
    pub cross_service_impact: serde_json::Value,
    #[serde(default)]
    pub functional_impact: serde_json::Value,
    #[serde(default)]
    pub test_strategy: Vec<TestStrategy>,
}

/// One persisted report, one per changed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub task_id: String,
    pub project_name: String,
    pub file_name: String,
    pub diff_content: String,
    pub risk_level: String,
    pub change_intent: serde_json::Value,
    pub downstream_dependency: Vec<DownstreamDependency>,
    pub cross_service_impact: serde_json::Value,
    pub functional_impact: serde_json::Value,
    pub test_strategy: Vec<TestStrategy>,
    /// `main` or a related-project name
    pub source_project: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// A repo successfully materialized on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedRepo {
    pub name: String,
    pub path: PathBuf,
    /// Branch actually checked out
    pub branch: String,
    /// Resolved HEAD commit
    pub head_commit: String,
}

/// A repo that could not be materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeFailure {
    pub name: String,
    /// One-line reason
    pub error: String,
}

/// Outcome of materializing a set of related repos
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    pub ok: Vec<MaterializedRepo>,
    pub fail: Vec<MaterializeFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_resolution() {
        let explicit = ImportDecl {
            path: "com.example.service.UserService".to_string(),
            wildcard: false,
        };
        assert!(explicit.resolves("com.example.service.UserService"));
        assert!(!explicit.resolves("com.example.service.OrderService"));

        let wildcard = ImportDecl {
            path: "com.example.service".to_string(),
            wildcard: true,
        };
        assert!(wildcard.resolves("com.example.service.UserService"));
        assert!(!wildcard.resolves("com.example.other.UserService"));
        assert!(!wildcard.resolves("UserService"));
    }

    #[test]
    fn routes_of_filters_by_method() {
        let mut index = SymbolIndex::default();
        let entry = |method: &str, route: &str| ApiEntry {
            route: route.to_string(),
            verb: "GET".to_string(),
            class_fqn: "com.example.PointClient".to_string(),
            method_name: method.to_string(),
            file: PathBuf::from("src/PointClient.java"),
            line: 10,
        };
        index
            .api_map
            .insert("/points/get".to_string(), vec![entry("getPoints", "/points/get")]);
        index.api_map.insert(
            "/points/update".to_string(),
            vec![entry("updatePoints", "/points/update")],
        );

        let all = index.routes_of("com.example.PointClient", &[]);
        assert_eq!(all.len(), 2);

        let only = index.routes_of(
            "com.example.PointClient",
            &["updatePoints".to_string()],
        );
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].route, "/points/update");
    }

    #[test]
    fn task_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Processing,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }
}
