//! Cross-project composition of indexers and tracers.
//!
//! One index per scan root; the first root is the main repository and is
//! never a source of cross-project impacts. A root whose index cannot be
//! obtained degrades the scan (the repo is skipped, the rest continue)
//! and is reported through `degraded_projects`.

use crate::cache::IndexCache;
use crate::core::constants::injection_kinds;
use crate::core::types::{
    CrossProjectImpacts, Impact, ImpactKind, SymbolIndex, UsageKind,
};
use crate::core::utils::project_name;
use crate::trace::usage_tracer::UsageTracer;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct MultiProjectTracer {
    /// Scan roots in construction order; index 0 is the main repo
    roots: Vec<PathBuf>,
    indices: BTreeMap<PathBuf, SymbolIndex>,
    degraded: Vec<String>,
}

impl MultiProjectTracer {
    /// Build (or cache-load) one index per root. Roots that do not exist
    /// on disk are recorded as degraded and skipped.
    pub async fn init(roots: Vec<PathBuf>, cache: &IndexCache) -> Self {
        let mut indices = BTreeMap::new();
        let mut degraded = Vec::new();

        for root in &roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "scan root missing; degrading");
                degraded.push(project_name(root));
                continue;
            }
            indices.insert(root.clone(), cache.get_or_build(root).await);
        }

        info!(
            roots = roots.len(),
            indexed = indices.len(),
            degraded = degraded.len(),
            "multi-project tracer ready"
        );
        Self {
            roots,
            indices,
            degraded,
        }
    }

    pub fn main_root(&self) -> Option<&Path> {
        self.roots.first().map(PathBuf::as_path)
    }

    pub fn related_roots(&self) -> &[PathBuf] {
        if self.roots.len() > 1 {
            &self.roots[1..]
        } else {
            &[]
        }
    }

    pub fn main_index(&self) -> Option<&SymbolIndex> {
        self.main_root().and_then(|root| self.indices.get(root))
    }

    pub fn index_of(&self, root: &Path) -> Option<&SymbolIndex> {
        self.indices.get(root)
    }

    pub fn degraded_projects(&self) -> &[String] {
        &self.degraded
    }

    /// All impacts of changing `fqn` (and optionally `changed_methods`)
    /// across the related repositories. With a single root this is
    /// trivially empty.
    pub fn find_cross_project_impacts(
        &self,
        fqn: &str,
        changed_methods: &[String],
    ) -> CrossProjectImpacts {
        let mut result = CrossProjectImpacts {
            degraded_projects: self.degraded.clone(),
            ..Default::default()
        };

        let related = self.related_roots();
        if related.is_empty() {
            return result;
        }

        let main_name = self.main_root().map(|r| project_name(r)).unwrap_or_default();

        // Trace targets: the changed class plus the interfaces it
        // implements; consumers usually reference the interface
        let mut targets = vec![fqn.to_string()];
        if let Some(main_index) = self.main_index() {
            if let Some(interfaces) = main_index.impl_interfaces.get(fqn) {
                for interface in interfaces {
                    if !targets.contains(interface) {
                        targets.push(interface.clone());
                    }
                }
            }
        }

        // Routes of any traced target that is a remote interface in the
        // main repo (Feign client or Dubbo service)
        let mut routes: Vec<(String, String)> = Vec::new();
        if let Some(main_index) = self.main_index() {
            for target in &targets {
                if main_index.is_remote_interface(target) {
                    for entry in main_index.routes_of(target, changed_methods) {
                        routes.push((entry.route.clone(), entry.verb.clone()));
                    }
                }
            }
        }

        let mut seen: BTreeSet<(String, PathBuf, usize, ImpactKind)> = BTreeSet::new();

        for root in related {
            let Some(index) = self.indices.get(root) else {
                continue;
            };
            let project = project_name(root);
            let tracer = UsageTracer::new(root, index);

            for target in &targets {
                self.scan_target(
                    &tracer,
                    index,
                    root,
                    &project,
                    target,
                    &mut result.impacts,
                    &mut seen,
                );
            }

            // Calls of the changed routes
            let simple = fqn.rsplit('.').next().unwrap_or(fqn);
            for (route, verb) in &routes {
                for call in tracer.find_api_callers(route) {
                    push_impact(
                        &mut result.impacts,
                        &mut seen,
                        Impact {
                            project: project.clone(),
                            kind: ImpactKind::ApiCall,
                            file: call.path,
                            line: call.line,
                            snippet: call.snippet,
                            detail: format!(
                                "API {verb} {route} of {simple} is called from {project} via {}",
                                call.client
                            ),
                            api: Some(route.clone()),
                        },
                    );
                }
            }
        }

        // The main repo never appears in cross-project results
        result.impacts.retain(|i| i.project != main_name);
        result
            .impacts
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        info!(
            fqn,
            impacts = result.impacts.len(),
            degraded = result.degraded_projects.len(),
            "cross-project scan complete"
        );
        result
    }

    /// Class-reference and RPC-injection impacts of one traced target in
    /// one related repo.
    #[allow(clippy::too_many_arguments)]
    fn scan_target(
        &self,
        tracer: &UsageTracer<'_>,
        index: &SymbolIndex,
        root: &Path,
        project: &str,
        target: &str,
        impacts: &mut Vec<Impact>,
        seen: &mut BTreeSet<(String, PathBuf, usize, ImpactKind)>,
    ) {
        let simple = target.rsplit('.').next().unwrap_or(target);

        for usage in tracer.find_usages(target) {
            let (kind, detail) = match &usage.kind {
                UsageKind::Injection { injection } if injection == injection_kinds::DUBBO => (
                    ImpactKind::RpcReference,
                    format!("@DubboReference injection of {simple} in {project}"),
                ),
                UsageKind::Injection { .. } => (
                    ImpactKind::ClassReference,
                    format!("Class {simple} injected in {project}"),
                ),
                UsageKind::MethodCall { method } => (
                    ImpactKind::ClassReference,
                    format!("{project} calls {simple}.{method}"),
                ),
                UsageKind::TypeUse => (
                    ImpactKind::ClassReference,
                    format!("Class {simple} referenced in {project}"),
                ),
            };
            push_impact(
                impacts,
                seen,
                Impact {
                    project: project.to_string(),
                    kind,
                    file: usage.path,
                    line: usage.line,
                    snippet: usage.snippet,
                    detail,
                    api: None,
                },
            );
        }

        // Dubbo injection sites straight from the RPC map; catches
        // same-package consumers the import rules cannot see
        for key in [target, simple] {
            let Some(entries) = index.rpc_map.get(key) else {
                continue;
            };
            for entry in entries {
                if entry.kind != injection_kinds::DUBBO {
                    continue;
                }
                let snippet = read_line(root, &entry.file, entry.line);
                push_impact(
                    impacts,
                    seen,
                    Impact {
                        project: project.to_string(),
                        kind: ImpactKind::RpcReference,
                        file: entry.file.clone(),
                        line: entry.line,
                        snippet,
                        detail: format!("@DubboReference injection of {simple} in {project}"),
                        api: None,
                    },
                );
            }
        }
    }
}

fn push_impact(
    impacts: &mut Vec<Impact>,
    seen: &mut BTreeSet<(String, PathBuf, usize, ImpactKind)>,
    impact: Impact,
) {
    if impact.line == 0 || impact.snippet.is_empty() {
        return;
    }
    let key = (
        impact.project.clone(),
        impact.file.clone(),
        impact.line,
        impact.kind,
    );
    if seen.insert(key) {
        impacts.push(impact);
    }
}

fn read_line(root: &Path, file: &Path, line: usize) -> String {
    std::fs::read_to_string(root.join(file))
        .ok()
        .and_then(|content| {
            content
                .lines()
                .nth(line.saturating_sub(1))
                .map(|l| l.trim().to_string())
        })
        .unwrap_or_default()
}
