//! LLM reply handling: parse, validate, retry once, refine.
//!
//! The reply must be a JSON object with the report fields; unknown fields
//! are discarded, missing required fields trigger a single retry with a
//! clarifying instruction. When that also fails the caller persists a
//! fallback report so the file still shows up in the task's report list.

use crate::analysis::prompt::{PromptAssembler, RETRY_INSTRUCTION, SYSTEM_INSTRUCTION};
use crate::core::types::{AnalysisReport, DownstreamDependency, Impact, LlmReply};
use crate::error::LlmError;
use crate::llm::LlmClient;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Values that mean "no line number" in a reply
const INVALID_LINE_MARKERS: &[&str] = &["", "0", "-", "N/A", "n/a", "none", "unknown"];

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse and validate one reply.
pub fn parse_reply(raw: &str) -> Result<LlmReply, LlmError> {
    let cleaned = strip_code_fences(raw);
    let reply: LlmReply =
        serde_json::from_str(cleaned).map_err(|e| LlmError::InvalidJson {
            reason: format!("{e} (line {}, column {})", e.line(), e.column()),
        })?;

    let mut missing = Vec::new();
    if reply.risk_level.trim().is_empty() {
        missing.push("risk_level".to_string());
    }
    if reply.change_intent.is_null() {
        missing.push("change_intent".to_string());
    }
    if !missing.is_empty() {
        return Err(LlmError::MissingFields { fields: missing });
    }
    Ok(reply)
}

/// One completion round with a single retry on a malformed reply.
pub async fn request_reply(llm: &dyn LlmClient, prompt: &str) -> Result<LlmReply, LlmError> {
    match llm.complete(SYSTEM_INSTRUCTION, prompt).await {
        Ok(raw) => match parse_reply(&raw) {
            Ok(reply) => return Ok(reply),
            Err(err) => warn!(error = %err, "malformed LLM reply; retrying once"),
        },
        Err(err) => warn!(error = %err, "LLM transport error; retrying once"),
    }

    let retry_prompt = format!("{prompt}\n\n{RETRY_INSTRUCTION}");
    let raw = llm.complete(SYSTEM_INSTRUCTION, &retry_prompt).await?;
    parse_reply(&raw)
}

/// Placeholder reply stored when both attempts failed, so the file still
/// appears in the task's report list.
pub fn fallback_reply(reason: &str) -> LlmReply {
    LlmReply {
        risk_level: "UNKNOWN".to_string(),
        change_intent: serde_json::json!(format!("analysis failed: {reason}")),
        ..Default::default()
    }
}

/// Turn a reply into the persisted report row.
pub fn to_report(
    reply: LlmReply,
    task_id: &str,
    project_name: &str,
    file_name: &str,
    diff_content: &str,
    source_project: &str,
) -> AnalysisReport {
    AnalysisReport {
        task_id: task_id.to_string(),
        project_name: project_name.to_string(),
        file_name: file_name.to_string(),
        diff_content: diff_content.to_string(),
        risk_level: reply.risk_level,
        change_intent: reply.change_intent,
        downstream_dependency: reply.downstream_dependency,
        cross_service_impact: reply.cross_service_impact,
        functional_impact: reply.functional_impact,
        test_strategy: reply.test_strategy,
        source_project: source_project.to_string(),
        created_at: Utc::now(),
    }
}

/// Merge traced impact line numbers and snippet windows into the reply's
/// downstream rows, deduplicating rows that cite the same file.
pub fn merge_impact_windows(
    reply: &mut LlmReply,
    impacts: &[Impact],
    roots_by_project: &BTreeMap<String, PathBuf>,
    assembler: &PromptAssembler,
) {
    if impacts.is_empty() || reply.downstream_dependency.is_empty() {
        return;
    }

    let mut merged: Vec<DownstreamDependency> = Vec::new();
    let mut seen_files: Vec<String> = Vec::new();

    for mut dep in reply.downstream_dependency.drain(..) {
        if dep.file_path.is_empty() {
            merged.push(dep);
            continue;
        }
        if seen_files.contains(&dep.file_path) {
            continue;
        }
        seen_files.push(dep.file_path.clone());

        let matching: Vec<&Impact> = impacts
            .iter()
            .filter(|i| paths_match(&i.file, &dep.file_path))
            .collect();
        if !matching.is_empty() {
            let mut lines: Vec<usize> = matching.iter().map(|i| i.line).collect();
            lines.sort_unstable();
            lines.dedup();
            dep.line_number = lines
                .iter()
                .map(|l| l.to_string())
                .collect::<Vec<_>>()
                .join(" ");

            dep.snippet_windows = matching
                .iter()
                .filter_map(|impact| {
                    roots_by_project
                        .get(&impact.project)
                        .and_then(|root| assembler.snippet_window(root, &impact.file, impact.line))
                })
                .collect();
            debug!(file = %dep.file_path, lines = %dep.line_number, "merged impact lines into report");
        }
        merged.push(dep);
    }

    // Deterministic row order regardless of how the model listed them
    merged.sort_by(|a, b| {
        (a.service_name.as_str(), a.file_path.as_str())
            .cmp(&(b.service_name.as_str(), b.file_path.as_str()))
    });
    reply.downstream_dependency = merged;
}

/// Fill in missing line numbers by searching the indexed tree for the
/// cited snippet or target method.
pub fn refine_line_numbers(reply: &mut LlmReply, root: &Path) {
    for dep in &mut reply.downstream_dependency {
        let invalid = INVALID_LINE_MARKERS.contains(&dep.line_number.trim());
        if !invalid || dep.file_path.is_empty() {
            continue;
        }
        let Some(local) = locate_file(root, &dep.file_path) else {
            continue;
        };
        let Ok(content) = std::fs::read_to_string(&local) else {
            continue;
        };

        let needle_snippet = dep.call_snippet.trim().trim_end_matches(';').to_string();
        let needle_method = dep
            .target_method
            .split('(')
            .next()
            .unwrap_or("")
            .rsplit('.')
            .next()
            .unwrap_or("")
            .to_string();

        for (idx, line) in content.lines().enumerate() {
            let hit = (!needle_snippet.is_empty() && line.contains(&needle_snippet))
                || (!needle_method.is_empty()
                    && line.contains(&needle_method)
                    && line.contains('('));
            if hit {
                dep.line_number = (idx + 1).to_string();
                if dep.call_snippet.trim().is_empty() {
                    dep.call_snippet = line.trim().to_string();
                }
                break;
            }
        }
    }
}

fn paths_match(impact_file: &Path, reported: &str) -> bool {
    let impact_str = impact_file.to_string_lossy();
    impact_str.ends_with(reported) || reported.ends_with(impact_str.as_ref())
}

/// Resolve a reply's file citation against the tree: exact relative path
/// first, then a basename walk.
fn locate_file(root: &Path, cited: &str) -> Option<PathBuf> {
    let direct = root.join(cited.trim_start_matches('/'));
    if direct.is_file() {
        return Some(direct);
    }
    let basename = Path::new(cited).file_name()?;
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == basename)
        .map(|e| e.into_path())
}
