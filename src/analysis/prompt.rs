//! Prompt assembly for the per-file analysis round.
//!
//! Section order is fixed: change-intent stub, unified diff, primary
//! downstream findings grouped by callsite class, cross-project impacts
//! grouped by project then type. Every citation carries a code-snippet
//! window (target line +/- K with absolute line numbers). Sections with
//! nothing to say are omitted, never stubbed.

use crate::core::types::{ContextLine, Impact, ImpactKind, SnippetWindow, Usage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// System instruction for every analysis round
pub const SYSTEM_INSTRUCTION: &str = "You are a senior Java test architect analyzing the \
blast radius of a code change across microservices. Reply with a single JSON object and \
nothing else.";

/// Reply shape the model must produce
pub const REPLY_FORMAT: &str = r#"Return exactly one JSON object with these fields:
{
  "risk_level": "CRITICAL|HIGH|MEDIUM|LOW",
  "change_intent": [{"summary": "...", "details": ["..."]}],
  "downstream_dependency": [{
    "service_name": "...", "file_path": "...", "line_number": "...",
    "caller_class": "...", "caller_method": "...", "target_method": "...",
    "call_snippet": "...", "impact_description": "..."
  }],
  "cross_service_impact": ["..."],
  "functional_impact": {"business_scenario": "...", "data_flow": "...", "risks": ["..."]},
  "test_strategy": [{"title": "...", "priority": "P0|P1", "steps": "...", "payload": "...", "validation": "..."}]
}
Base every claim on the evidence above. Never invent services or endpoints."#;

/// Clarification appended on the single retry after a malformed reply
pub const RETRY_INSTRUCTION: &str = "The previous reply did not parse as the required JSON \
object. Reply again with ONLY the JSON object described above: no prose, no code fences, \
all required fields present.";

pub struct PromptAssembler {
    /// Snippet window half-size K
    context_lines: usize,
}

impl PromptAssembler {
    pub fn new(context_lines: usize) -> Self {
        Self { context_lines }
    }

    /// Window around `line` in the file as it exists under `root`.
    /// `None` when the file moved or was deleted since indexing.
    pub fn snippet_window(&self, root: &Path, file: &Path, line: usize) -> Option<SnippetWindow> {
        let content = std::fs::read_to_string(root.join(file)).ok()?;
        let lines: Vec<&str> = content.lines().collect();
        if line == 0 || line > lines.len() {
            return None;
        }
        let k = self.context_lines;
        let start = line.saturating_sub(k).max(1);
        let end = (line + k).min(lines.len());

        Some(SnippetWindow {
            target_line: line,
            target_code: lines[line - 1].to_string(),
            context_before: (start..line)
                .map(|n| ContextLine {
                    line: n,
                    code: lines[n - 1].to_string(),
                })
                .collect(),
            context_after: (line + 1..=end)
                .map(|n| ContextLine {
                    line: n,
                    code: lines[n - 1].to_string(),
                })
                .collect(),
        })
    }

    /// Assemble the full per-file prompt.
    ///
    /// `roots_by_project` maps related-project names to their on-disk
    /// roots so impact citations can carry snippet windows.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        &self,
        file_name: &str,
        diff: &str,
        main_root: &Path,
        usages: &[Usage],
        impacts: &[Impact],
        roots_by_project: &BTreeMap<String, PathBuf>,
    ) -> String {
        let mut sections = Vec::new();

        let added = diff
            .lines()
            .filter(|l| l.starts_with('+') && !l.starts_with("+++"))
            .count();
        let removed = diff
            .lines()
            .filter(|l| l.starts_with('-') && !l.starts_with("---"))
            .count();
        sections.push(format!(
            "# Change under analysis\nFile: {file_name} (+{added}/-{removed} lines)"
        ));
        sections.push(format!("# Unified diff\n```diff\n{diff}\n```"));

        if !usages.is_empty() {
            sections.push(self.primary_findings_section(main_root, usages));
        }
        if !impacts.is_empty() {
            sections.push(self.cross_project_section(impacts, roots_by_project));
        }

        sections.push(format!("# Required reply\n{REPLY_FORMAT}"));
        sections.join("\n\n")
    }

    /// In-repo downstream findings, grouped by callsite class.
    fn primary_findings_section(&self, root: &Path, usages: &[Usage]) -> String {
        let mut by_class: BTreeMap<String, Vec<&Usage>> = BTreeMap::new();
        for usage in usages {
            let class = usage
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| usage.path.display().to_string());
            by_class.entry(class).or_default().push(usage);
        }

        let mut out = String::from("# In-repo downstream findings\n");
        for (class, group) in by_class {
            out.push_str(&format!("\n## {class} ({})\n", group[0].path.display()));
            for usage in group {
                out.push_str(&format!("- L{}: {}\n", usage.line, usage.snippet));
                if let Some(window) = self.snippet_window(root, &usage.path, usage.line) {
                    out.push_str(&window.flatten());
                }
            }
        }
        out
    }

    /// Cross-project impacts grouped by related-project name, then type.
    fn cross_project_section(
        &self,
        impacts: &[Impact],
        roots_by_project: &BTreeMap<String, PathBuf>,
    ) -> String {
        let mut by_project: BTreeMap<&str, Vec<&Impact>> = BTreeMap::new();
        for impact in impacts {
            by_project.entry(&impact.project).or_default().push(impact);
        }

        let mut out = String::from("# Cross-project impacts\n");
        for (project, group) in by_project {
            out.push_str(&format!("\n## Project: {project}\n"));
            for kind in [
                ImpactKind::ClassReference,
                ImpactKind::ApiCall,
                ImpactKind::RpcReference,
            ] {
                let of_kind: Vec<&&Impact> =
                    group.iter().filter(|i| i.kind == kind).collect();
                if of_kind.is_empty() {
                    continue;
                }
                out.push_str(&format!("### {}\n", kind.as_str()));
                for impact in of_kind {
                    out.push_str(&format!(
                        "- {} ({}:{})\n",
                        impact.detail,
                        impact.file.display(),
                        impact.line
                    ));
                    if let Some(api) = &impact.api {
                        out.push_str(&format!("  route: {api}\n"));
                    }
                    let window = roots_by_project.get(project).and_then(|root| {
                        self.snippet_window(root, &impact.file, impact.line)
                    });
                    match window {
                        Some(window) => out.push_str(&window.flatten()),
                        // File gone since indexing: elide the window
                        None => out.push_str(&format!("> {:>5} | {}\n", impact.line, impact.snippet)),
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::UsageKind;

    fn impact(project: &str, kind: ImpactKind, file: &str, line: usize) -> Impact {
        Impact {
            project: project.to_string(),
            kind,
            file: PathBuf::from(file),
            line,
            snippet: "snippet".to_string(),
            detail: format!("detail for {file}:{line}"),
            api: matches!(kind, ImpactKind::ApiCall).then(|| "/api/x".to_string()),
        }
    }

    #[test]
    fn sections_appear_in_fixed_order() {
        let assembler = PromptAssembler::new(2);
        let usages = vec![Usage {
            path: PathBuf::from("svc/src/Caller.java"),
            line: 3,
            snippet: "new Target()".to_string(),
            service: "svc".to_string(),
            kind: UsageKind::TypeUse,
        }];
        let impacts = vec![impact("other", ImpactKind::ApiCall, "src/A.java", 7)];

        let prompt = assembler.assemble(
            "svc/src/Target.java",
            "diff --git ...",
            Path::new("/nonexistent"),
            &usages,
            &impacts,
            &BTreeMap::new(),
        );

        let diff_pos = prompt.find("# Unified diff").unwrap();
        let primary_pos = prompt.find("# In-repo downstream findings").unwrap();
        let cross_pos = prompt.find("# Cross-project impacts").unwrap();
        let reply_pos = prompt.find("# Required reply").unwrap();
        assert!(diff_pos < primary_pos);
        assert!(primary_pos < cross_pos);
        assert!(cross_pos < reply_pos);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let assembler = PromptAssembler::new(2);
        let prompt = assembler.assemble(
            "A.java",
            "diff",
            Path::new("/nonexistent"),
            &[],
            &[],
            &BTreeMap::new(),
        );
        assert!(!prompt.contains("# In-repo downstream findings"));
        assert!(!prompt.contains("# Cross-project impacts"));
    }

    #[test]
    fn window_is_elided_for_missing_files() {
        let assembler = PromptAssembler::new(2);
        assert!(assembler
            .snippet_window(Path::new("/nonexistent"), Path::new("x.java"), 1)
            .is_none());
    }

    #[test]
    fn window_respects_file_bounds() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.java"), "l1\nl2\nl3\n").unwrap();

        let assembler = PromptAssembler::new(2);
        let window = assembler
            .snippet_window(dir.path(), Path::new("f.java"), 1)
            .unwrap();
        assert!(window.context_before.is_empty());
        assert_eq!(window.target_code, "l1");
        assert_eq!(window.context_after.len(), 2);

        assert!(assembler
            .snippet_window(dir.path(), Path::new("f.java"), 9)
            .is_none());
    }
}
