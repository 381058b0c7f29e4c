//! Repository scanner building the per-repo [`SymbolIndex`].
//!
//! Walks every `.java` file under a root (skipping hidden directories,
//! build outputs and test sources), runs the line lexer over each file and
//! assembles class, route and RPC-injection tables. A file that fails to
//! parse is logged and skipped; no file error is fatal.

use crate::core::constants::{injection_kinds, mappings, stereotypes, SKIPPED_DIRS, TEST_DIR_MARKERS};
use crate::core::types::{ApiEntry, ClassKind, FileMeta, RpcEntry, SymbolIndex};
use crate::error::ParseError;
use crate::indexer::lexer::{self, Annotation, BraceTracker};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Everything extracted from a single Java file
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub meta: FileMeta,
    pub kind: ClassKind,
    /// `package.PrimaryClass` when both are present
    pub fqn: Option<String>,
    /// Interfaces the primary class implements, resolved to FQNs where
    /// the imports allow
    pub implements: Vec<String>,
    pub api_entries: Vec<ApiEntry>,
    pub rpc_entries: Vec<RpcEntry>,
    /// Method declarations as (name, 1-based start line)
    pub method_starts: Vec<(String, usize)>,
    pub total_lines: usize,
}

/// Body line range of one method, derived from declaration order:
/// a method ends where the next one starts (the last one at EOF).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRange {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

impl ParsedFile {
    /// Method body line ranges for changed-method intersection.
    pub fn method_ranges(&self) -> Vec<MethodRange> {
        let mut starts = self.method_starts.clone();
        starts.sort_by_key(|(_, line)| *line);
        let mut ranges = Vec::with_capacity(starts.len());
        for (i, (name, start)) in starts.iter().enumerate() {
            let end = if i + 1 < starts.len() {
                starts[i + 1].1.saturating_sub(1)
            } else {
                self.total_lines
            };
            ranges.push(MethodRange {
                name: name.clone(),
                start: *start,
                end,
            });
        }
        ranges
    }
}

/// Scans one repository root into a [`SymbolIndex`]
pub struct SymbolIndexer {
    root: PathBuf,
    skip_dirs: Vec<String>,
    skip_tests: bool,
}

impl SymbolIndexer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            skip_dirs: SKIPPED_DIRS.iter().map(|s| s.to_string()).collect(),
            skip_tests: true,
        }
    }

    pub fn with_skip_dirs(mut self, dirs: Vec<String>) -> Self {
        self.skip_dirs = dirs;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build the index for this root. `commit_hash` is stamped in by the
    /// caller (the cache knows the HEAD; plain directories pass "").
    pub fn build(&self, commit_hash: &str) -> SymbolIndex {
        let mut index = SymbolIndex {
            commit_hash: commit_hash.to_string(),
            ..Default::default()
        };

        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_skipped(e.path(), e.file_type().is_dir()));

        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("java") {
                continue;
            }
            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_path_buf();

            match self.parse_java_file(path) {
                Ok(parsed) => self.merge(&mut index, rel, parsed),
                Err(err) => {
                    warn!(file = %rel.display(), error = %err, "skipping unparsable Java file");
                }
            }
        }

        debug!(
            root = %self.root.display(),
            classes = index.class_map.len(),
            routes = index.api_map.len(),
            rpc_sites = index.rpc_map.values().map(Vec::len).sum::<usize>(),
            files = index.files_scanned.len(),
            "symbol index built"
        );
        index
    }

    fn is_skipped(&self, path: &Path, is_dir: bool) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        if is_dir {
            if name.starts_with('.') && path != self.root {
                return true;
            }
            if self.skip_dirs.iter().any(|d| d == name) {
                return true;
            }
        }
        if self.skip_tests {
            let rel = path.strip_prefix(&self.root).unwrap_or(path);
            let rel_str = rel.to_string_lossy();
            if TEST_DIR_MARKERS.iter().any(|m| rel_str.contains(m)) {
                return true;
            }
        }
        false
    }

    /// Single-file routine, also used by the orchestrator on the
    /// post-image of a changed file.
    pub fn parse_java_file(&self, path: &Path) -> Result<ParsedFile, ParseError> {
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse_java_source(&content))
    }

    fn merge(&self, index: &mut SymbolIndex, rel: PathBuf, parsed: ParsedFile) {
        index.files_scanned.insert(rel.clone());

        if let Some(fqn) = &parsed.fqn {
            index.class_map.insert(fqn.clone(), rel.clone());
            if let Some(simple) = fqn.rsplit('.').next() {
                index
                    .simple_names
                    .entry(simple.to_string())
                    .or_default()
                    .insert(fqn.clone());
            }
            index.class_kinds.insert(fqn.clone(), parsed.kind);
            if !parsed.implements.is_empty() {
                index
                    .impl_interfaces
                    .insert(fqn.clone(), parsed.implements.clone());
            }
        }

        for mut entry in parsed.api_entries {
            entry.file = rel.clone();
            index
                .api_map
                .entry(entry.route.clone())
                .or_default()
                .push(entry);
        }

        for mut entry in parsed.rpc_entries {
            entry.file = rel.clone();
            index
                .rpc_map
                .entry(entry.interface.clone())
                .or_default()
                .push(entry);
        }

        index.file_meta.insert(rel, parsed.meta);
    }
}

/// Parse Java source text with the line lexer. Infallible by design:
/// unrecognized lines simply contribute nothing.
pub fn parse_java_source(content: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    let mut tracker = BraceTracker::new();

    // Annotations seen since the last declaration, with their lines
    let mut pending: Vec<(Annotation, usize)> = Vec::new();
    let mut base_path = String::new();
    let mut primary: Option<lexer::TypeDecl> = None;
    let mut class_annotations: Vec<Annotation> = Vec::new();

    let lines: Vec<&str> = content.lines().collect();
    parsed.total_lines = lines.len();

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let depth = tracker.consume(raw);
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('*') {
            continue;
        }

        if depth == 0 {
            if parsed.meta.package.is_none() {
                if let Some(pkg) = lexer::parse_package(raw) {
                    parsed.meta.package = Some(pkg);
                    continue;
                }
            }
            if let Some(import) = lexer::parse_import(raw) {
                parsed.meta.imports.push(import);
                continue;
            }
        }

        let line_annotations = lexer::parse_annotations(raw);

        // Primary type: first declaration at depth 0
        if depth == 0 && primary.is_none() {
            if let Some(decl) = lexer::parse_type_decl(raw) {
                class_annotations = pending.iter().map(|(a, _)| a.clone()).collect();
                class_annotations.extend(line_annotations.clone());
                primary = Some(decl.clone());
                parsed.meta.primary_class = Some(decl.name.clone());
                if let Some(pkg) = &parsed.meta.package {
                    parsed.fqn = Some(format!("{pkg}.{}", decl.name));
                }
                parsed.implements = decl
                    .implements
                    .iter()
                    .map(|name| resolve_interface(name, &parsed.meta))
                    .collect();
                parsed.kind = classify(&decl, &class_annotations);
                base_path = class_base_path(&class_annotations);
                pending.clear();
                continue;
            }
        }

        // Class body: mapping annotations, injections, method headers
        if depth >= 1 {
            if let Some(method) = lexer::parse_method_decl(raw) {
                let combined: Vec<(Annotation, usize)> = pending
                    .iter()
                    .cloned()
                    .chain(line_annotations.iter().cloned().map(|a| (a, line_no)))
                    .collect();
                for (ann, ann_line) in &combined {
                    if mappings::ALL.contains(&ann.name.as_str()) {
                        let verb = ann
                            .request_method()
                            .unwrap_or_else(|| mappings::http_verb(&ann.name).to_string());
                        let route = combine_paths(&base_path, &ann.path_value());
                        parsed.api_entries.push(ApiEntry {
                            route,
                            verb,
                            class_fqn: parsed.fqn.clone().unwrap_or_default(),
                            method_name: method.clone(),
                            file: PathBuf::new(),
                            line: *ann_line,
                        });
                    }
                }
                parsed.method_starts.push((method, line_no));
                pending.clear();
                continue;
            }

            if let Some(field) = lexer::parse_field_decl(raw) {
                let combined: Vec<(Annotation, usize)> = pending
                    .iter()
                    .cloned()
                    .chain(line_annotations.iter().cloned().map(|a| (a, line_no)))
                    .collect();
                for (ann, ann_line) in &combined {
                    if stereotypes::INJECTIONS.contains(&ann.name.as_str()) {
                        let kind = if stereotypes::is_dubbo_injection(&ann.name) {
                            injection_kinds::DUBBO
                        } else {
                            injection_kinds::SPRING_DI
                        };
                        parsed.rpc_entries.push(RpcEntry {
                            interface: resolve_type(&field.type_name, &parsed.meta),
                            file: PathBuf::new(),
                            line: *ann_line,
                            kind: kind.to_string(),
                            field_name: field.field_name.clone(),
                        });
                    }
                }
                pending.clear();
                continue;
            }
        }

        if !line_annotations.is_empty() && trimmed.starts_with('@') {
            for ann in line_annotations {
                pending.push((ann, line_no));
            }
        } else {
            pending.clear();
        }
    }

    parsed
}

fn classify(decl: &lexer::TypeDecl, annotations: &[Annotation]) -> ClassKind {
    let has = |name: &str| annotations.iter().any(|a| a.name == name);
    if has(stereotypes::REST_CONTROLLER) || has(stereotypes::CONTROLLER) {
        ClassKind::Controller
    } else if has(stereotypes::FEIGN_CLIENT) {
        ClassKind::FeignClient
    } else if has(stereotypes::DUBBO_SERVICE) {
        ClassKind::DubboService
    } else if decl.keyword == "interface" {
        ClassKind::Interface
    } else {
        ClassKind::Plain
    }
}

/// Base path for route concatenation. Controllers take it from
/// `@RequestMapping`; Feign clients from the `path =` attribute.
fn class_base_path(annotations: &[Annotation]) -> String {
    for ann in annotations {
        if ann.name == mappings::REQUEST_MAPPING {
            return ann.path_value();
        }
        if ann.name == stereotypes::FEIGN_CLIENT {
            if let Some(path) = named_attribute(ann, "path") {
                return path;
            }
        }
    }
    String::new()
}

/// `key = "value"` attribute lookup inside an annotation's raw arguments.
fn named_attribute(ann: &Annotation, key: &str) -> Option<String> {
    let args = ann.args.as_deref()?;
    for part in args.split(',') {
        if let Some((name, value)) = part.split_once('=') {
            if name.trim() == key {
                return Some(value.trim().trim_matches('"').to_string());
            }
        }
    }
    None
}

/// Resolve an interface name from an `implements` clause: qualified
/// names pass through, simple names go through the imports, and an
/// unimported simple name is assumed to live in the file's own package.
fn resolve_interface(name: &str, meta: &FileMeta) -> String {
    if name.contains('.') {
        return name.to_string();
    }
    let resolved = resolve_type(name, meta);
    if resolved != name {
        return resolved;
    }
    match &meta.package {
        Some(pkg) => format!("{pkg}.{name}"),
        None => name.to_string(),
    }
}

/// Resolve a field's simple type name against the file's imports; falls
/// back to the name as written when nothing resolves.
fn resolve_type(simple: &str, meta: &FileMeta) -> String {
    for import in &meta.imports {
        if !import.wildcard {
            if let Some((_, last)) = import.path.rsplit_once('.') {
                if last == simple {
                    return import.path.clone();
                }
            }
        }
    }
    simple.to_string()
}

/// Concatenate base and method paths, normalizing duplicate slashes.
pub fn combine_paths(base: &str, sub: &str) -> String {
    let mut combined = format!("{base}/{sub}");
    while combined.contains("//") {
        combined = combined.replace("//", "/");
    }
    if !combined.starts_with('/') {
        combined.insert(0, '/');
    }
    if combined.len() > 1 && combined.ends_with('/') {
        combined.pop();
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROLLER: &str = r#"package com.cloudE.pay.provider;

import com.cloudE.pay.service.PointService;
import org.springframework.web.bind.annotation.*;

@RestController
@RequestMapping("/api/points")
public class PointController {

    @Autowired
    private PointService pointService;

    @GetMapping("/balance")
    public Long balance(@RequestParam Long userId) {
        return pointService.balanceOf(userId);
    }

    @RequestMapping(value = "/batch", method = RequestMethod.POST)
    public void batchUpdate(@RequestBody BatchRequest request) {
        pointService.batchUpdate(request);
    }
}
"#;

    #[test]
    fn controller_routes_and_fqn() {
        let parsed = parse_java_source(CONTROLLER);
        assert_eq!(
            parsed.fqn.as_deref(),
            Some("com.cloudE.pay.provider.PointController")
        );
        assert_eq!(parsed.kind, ClassKind::Controller);

        let routes: Vec<(&str, &str)> = parsed
            .api_entries
            .iter()
            .map(|e| (e.route.as_str(), e.verb.as_str()))
            .collect();
        assert!(routes.contains(&("/api/points/balance", "GET")));
        assert!(routes.contains(&("/api/points/batch", "POST")));

        for entry in &parsed.api_entries {
            assert!(entry.line >= 1);
        }
    }

    #[test]
    fn injection_sites_resolve_through_imports() {
        let parsed = parse_java_source(CONTROLLER);
        assert_eq!(parsed.rpc_entries.len(), 1);
        let entry = &parsed.rpc_entries[0];
        assert_eq!(entry.interface, "com.cloudE.pay.service.PointService");
        assert_eq!(entry.kind, "spring_di");
        assert_eq!(entry.field_name, "pointService");
    }

    #[test]
    fn dubbo_reference_is_dubbo_kind() {
        let source = r#"package com.example.order;

import com.example.service.UserService;
import org.apache.dubbo.config.annotation.DubboReference;

public class OrderManager {

    @DubboReference
    private UserService remoteService;

    public String describe(Long id) {
        return remoteService.getUserById(id).toString();
    }
}
"#;
        let parsed = parse_java_source(source);
        assert_eq!(parsed.rpc_entries.len(), 1);
        assert_eq!(parsed.rpc_entries[0].kind, "dubbo");
        assert_eq!(
            parsed.rpc_entries[0].interface,
            "com.example.service.UserService"
        );
    }

    #[test]
    fn feign_client_interface() {
        let source = r#"package com.cloudE.pay.client;

import org.springframework.cloud.openfeign.FeignClient;
import org.springframework.web.bind.annotation.PostMapping;

@FeignClient(name = "pay-provider", path = "/points")
public interface PointClient {

    @PostMapping("/batch-update")
    String batchUpdatePoints(Long userId, int delta);
}
"#;
        let parsed = parse_java_source(source);
        assert_eq!(parsed.kind, ClassKind::FeignClient);
        assert_eq!(parsed.api_entries.len(), 1);
        assert_eq!(parsed.api_entries[0].route, "/points/batch-update");
        assert_eq!(parsed.api_entries[0].method_name, "batchUpdatePoints");
    }

    #[test]
    fn method_ranges_cover_the_file() {
        let parsed = parse_java_source(CONTROLLER);
        let ranges = parsed.method_ranges();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].name, "balance");
        assert!(ranges[0].end >= ranges[0].start);
        assert_eq!(ranges[1].name, "batchUpdate");
        assert_eq!(ranges[1].end, parsed.total_lines);
    }

    #[test]
    fn combine_paths_normalizes() {
        assert_eq!(combine_paths("/api/", "/points"), "/api/points");
        assert_eq!(combine_paths("", "status"), "/status");
        assert_eq!(combine_paths("/api", ""), "/api");
        assert_eq!(combine_paths("", ""), "/");
    }

    #[test]
    fn missing_package_yields_no_fqn() {
        let parsed = parse_java_source("public class Orphan {}\n");
        assert!(parsed.fqn.is_none());
        assert_eq!(parsed.meta.primary_class.as_deref(), Some("Orphan"));
    }
}
