//! Per-repository reference search.
//!
//! `find_usages` answers "which lines in this repo reference class X" using
//! the import rules U1-U3 plus injection-annotation tracking; it also
//! follows method calls made through fields or locals declared with the
//! target type, which is where most real impact lives. `find_api_callers`
//! answers "which lines call HTTP route R" for the common client idioms.
//!
//! Malformed or unreadable files contribute zero usages; they are never an
//! error to the caller.

use crate::core::constants::{injection_kinds, stereotypes};
use crate::core::types::{ApiCall, ClassKind, SymbolIndex, Usage, UsageKind};
use crate::core::utils::service_label;
use crate::indexer::lexer;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

// Patterns that fail to compile disable their idiom instead of panicking
static STRING_LITERAL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""([^"]*)""#).ok());

static REST_TEMPLATE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"\.(getForObject|postForObject|getForEntity|postForEntity|exchange|put|delete)\s*\(")
        .ok()
});

static WEB_CLIENT_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\.uri\s*\(").ok());

/// Compiled per-query matcher for one simple class name
struct TypeTokenMatcher {
    token: Option<Regex>,
    contexts: Vec<Regex>,
}

impl TypeTokenMatcher {
    fn new(simple: &str) -> Self {
        let s = regex::escape(simple);
        let contexts = [
            // field declaration / parameter / local variable
            format!(r"\b{s}(?:<[^>]*>)?\s+[a-z_$][\w$]*"),
            // constructor call
            format!(r"\bnew\s+{s}\s*[(<]"),
            // inheritance
            format!(r"\b(?:implements|extends)\b[^\{{]*\b{s}\b"),
            // cast
            format!(r"\(\s*{s}\s*\)\s*[\w($]"),
            // generic argument
            format!(r"[<,]\s*{s}\s*[,>]"),
            // class literal / method reference
            format!(r"\b{s}\.class\b"),
            format!(r"\b{s}\s*::"),
        ];
        Self {
            token: Regex::new(&format!(r"\b{s}\b")).ok(),
            contexts: contexts
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    fn matches(&self, line: &str) -> bool {
        match &self.token {
            Some(token) => {
                token.is_match(line) && self.contexts.iter().any(|c| c.is_match(line))
            }
            None => false,
        }
    }
}

/// Reference search over one indexed repository
pub struct UsageTracer<'a> {
    root: &'a Path,
    index: &'a SymbolIndex,
}

impl<'a> UsageTracer<'a> {
    pub fn new(root: &'a Path, index: &'a SymbolIndex) -> Self {
        Self { root, index }
    }

    /// All reference sites of `fqn` in this repo, one usage per source
    /// line, ordered by (path, line).
    pub fn find_usages(&self, fqn: &str) -> Vec<Usage> {
        let (pkg, simple) = match fqn.rsplit_once('.') {
            Some((pkg, simple)) => (pkg, simple),
            None => ("", fqn),
        };
        static CALL_RE: Lazy<Option<Regex>> =
            Lazy::new(|| Regex::new(r"\b([a-z_$][\w$]*)\s*\.\s*([a-zA-Z_$][\w$]*)\s*\(").ok());
        let matcher = TypeTokenMatcher::new(simple);

        let defining_file = self.index.class_map.get(fqn);
        let mut found: BTreeMap<(PathBuf, usize), Usage> = BTreeMap::new();

        for file in &self.index.files_scanned {
            if Some(file) == defining_file {
                continue;
            }
            let Some(meta) = self.index.file_meta.get(file) else {
                continue;
            };
            if !self.class_visible(meta, fqn, pkg, simple) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(self.root.join(file)) else {
                continue;
            };

            self.scan_file(file, &content, simple, &matcher, CALL_RE.as_ref(), &mut found);
        }

        debug!(fqn, usages = found.len(), root = %self.root.display(), "usage scan complete");
        found.into_values().collect()
    }

    /// U1 explicit import, U2 wildcard import without a conflicting
    /// explicit import of the same simple name, U3 same package.
    fn class_visible(
        &self,
        meta: &crate::core::types::FileMeta,
        fqn: &str,
        pkg: &str,
        simple: &str,
    ) -> bool {
        let mut wildcard_hit = false;
        for import in &meta.imports {
            if !import.wildcard {
                if import.path == fqn {
                    return true;
                }
                // Another class with the same simple name shadows the
                // wildcard route
                if import.path.rsplit_once('.').map(|(_, s)| s) == Some(simple) {
                    return false;
                }
            } else if import.path == pkg && !pkg.is_empty() {
                wildcard_hit = true;
            }
        }
        if wildcard_hit {
            return true;
        }
        !pkg.is_empty() && meta.package.as_deref() == Some(pkg)
    }

    fn scan_file(
        &self,
        file: &Path,
        content: &str,
        simple: &str,
        matcher: &TypeTokenMatcher,
        call_re: Option<&Regex>,
        found: &mut BTreeMap<(PathBuf, usize), Usage>,
    ) {
        let service = service_label(file);
        let lines: Vec<&str> = content.lines().collect();

        // Field / local names declared with the target type, and field
        // declaration lines that belong to a DI annotation above them.
        let mut typed_names: BTreeSet<String> = BTreeSet::new();
        let mut injected_field_lines: BTreeSet<usize> = BTreeSet::new();

        let mut pending_injection: Option<(usize, String)> = None;

        for (idx, raw) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with('*') {
                continue;
            }
            if trimmed.starts_with("import ") || trimmed.starts_with("package ") {
                continue;
            }

            let annotations = lexer::parse_annotations(raw);
            let injection_ann = annotations
                .iter()
                .find(|a| stereotypes::INJECTIONS.contains(&a.name.as_str()));

            if let Some(field) = lexer::parse_field_decl(raw) {
                // A field consumes any pending annotation whether or not
                // it is of the target type
                let carried = pending_injection.take();

                if field.type_name == simple {
                    typed_names.insert(field.field_name.clone());

                    if let Some(ann) = injection_ann {
                        // Annotation and field on one line
                        let kind = injection_kind(&ann.name);
                        insert_usage(
                            found,
                            file,
                            line_no,
                            trimmed,
                            &service,
                            UsageKind::Injection { injection: kind },
                        );
                        injected_field_lines.insert(line_no);
                        continue;
                    }
                    if let Some((ann_line, kind)) = carried {
                        insert_usage(
                            found,
                            file,
                            ann_line,
                            lines[ann_line - 1].trim(),
                            &service,
                            UsageKind::Injection { injection: kind },
                        );
                        injected_field_lines.insert(line_no);
                        continue;
                    }
                }
            } else if let Some(ann) = injection_ann {
                // Annotation on its own line; the field follows
                pending_injection = Some((line_no, injection_kind(&ann.name)));
                continue;
            } else if !trimmed.starts_with('@') {
                pending_injection = None;
            }

            if matcher.matches(raw) && !injected_field_lines.contains(&line_no) {
                insert_usage(found, file, line_no, trimmed, &service, UsageKind::TypeUse);
                continue;
            }

            // Calls through a variable of the target type
            if let Some(call_re) = call_re {
                for cap in call_re.captures_iter(raw) {
                    if typed_names.contains(&cap[1]) {
                        insert_usage(
                            found,
                            file,
                            line_no,
                            trimmed,
                            &service,
                            UsageKind::MethodCall {
                                method: cap[2].to_string(),
                            },
                        );
                        break;
                    }
                }
            }
        }
    }

    /// Call sites of `route` across the repo: RestTemplate and WebClient
    /// string literals (with `{placeholder}` tolerance) plus Feign client
    /// interfaces declaring a matching mapping.
    pub fn find_api_callers(&self, route: &str) -> Vec<ApiCall> {
        let Some(route_re) = placeholder_regex(route) else {
            return Vec::new();
        };
        let mut found: BTreeMap<(PathBuf, usize), ApiCall> = BTreeMap::new();

        for file in &self.index.files_scanned {
            let Ok(content) = std::fs::read_to_string(self.root.join(file)) else {
                continue;
            };
            for (idx, raw) in content.lines().enumerate() {
                let line_no = idx + 1;
                let client = if REST_TEMPLATE_RE.as_ref().map_or(false, |re| re.is_match(raw)) {
                    "RestTemplate"
                } else if WEB_CLIENT_RE.as_ref().map_or(false, |re| re.is_match(raw)) {
                    "WebClient"
                } else {
                    continue;
                };
                let literal_matches = STRING_LITERAL_RE.as_ref().map_or(false, |re| {
                    re.captures_iter(raw).any(|cap| route_re.is_match(&cap[1]))
                });
                if literal_matches {
                    found.insert(
                        (file.clone(), line_no),
                        ApiCall {
                            path: file.clone(),
                            line: line_no,
                            snippet: raw.trim().to_string(),
                            route: route.to_string(),
                            client: client.to_string(),
                        },
                    );
                }
            }
        }

        // Feign interfaces in this repo that mirror the route
        for (declared_route, entries) in &self.index.api_map {
            if !route_re.is_match(declared_route) && declared_route != route {
                continue;
            }
            for entry in entries {
                let is_feign = self
                    .index
                    .class_kinds
                    .get(&entry.class_fqn)
                    .map(|k| *k == ClassKind::FeignClient)
                    .unwrap_or(false);
                if !is_feign {
                    continue;
                }
                let snippet = self.line_at(&entry.file, entry.line).unwrap_or_default();
                found.insert(
                    (entry.file.clone(), entry.line),
                    ApiCall {
                        path: entry.file.clone(),
                        line: entry.line,
                        snippet,
                        route: route.to_string(),
                        client: "FeignClient".to_string(),
                    },
                );
            }
        }

        found.into_values().collect()
    }

    fn line_at(&self, file: &Path, line: usize) -> Option<String> {
        let content = std::fs::read_to_string(self.root.join(file)).ok()?;
        content
            .lines()
            .nth(line.saturating_sub(1))
            .map(|l| l.trim().to_string())
    }
}

fn injection_kind(annotation: &str) -> String {
    if stereotypes::is_dubbo_injection(annotation) {
        injection_kinds::DUBBO.to_string()
    } else {
        injection_kinds::SPRING_DI.to_string()
    }
}

fn insert_usage(
    found: &mut BTreeMap<(PathBuf, usize), Usage>,
    file: &Path,
    line: usize,
    snippet: &str,
    service: &str,
    kind: UsageKind,
) {
    found
        .entry((file.to_path_buf(), line))
        .or_insert_with(|| Usage {
            path: file.to_path_buf(),
            line,
            snippet: snippet.to_string(),
            service: service.to_string(),
            kind,
        });
}

/// Build a matcher for `route` where `{id}` tolerates any `{...}` segment.
fn placeholder_regex(route: &str) -> Option<Regex> {
    static PLACEHOLDER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\{[^}]+\}").ok());
    let placeholder = PLACEHOLDER.as_ref()?;
    let mut pattern = String::new();
    let mut last = 0;
    for m in placeholder.find_iter(route) {
        pattern.push_str(&regex::escape(&route[last..m.start()]));
        pattern.push_str(r"\{[^}]+\}");
        last = m.end();
    }
    pattern.push_str(&regex::escape(&route[last..]));
    Regex::new(&pattern)
        .ok()
        .or_else(|| Regex::new(&regex::escape(route)).ok())
}
