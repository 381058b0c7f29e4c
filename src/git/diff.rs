//! Unified-diff splitting.
//!
//! The orchestrator consumes one diff per changed file, in diff order,
//! plus the post-image line numbers of added lines for changed-method
//! intersection.

use once_cell::sync::Lazy;
use regex::Regex;

static HUNK_HEADER_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^@@ -\d+(?:,\d+)? \+(\d+)(?:,\d+)? @@").ok());

/// One file's slice of a unified diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    /// Post-image path (the `b/` side); pre-image path for deletions
    pub path: String,

    /// The per-file diff text, headers included
    pub diff: String,

    /// Post-image line numbers of `+` lines
    pub added_lines: Vec<usize>,

    pub is_deleted: bool,
}

/// Split a unified diff into per-file diffs, preserving diff order.
pub fn split_diff(diff_text: &str) -> Vec<FileDiff> {
    let mut files = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;

    for line in diff_text.lines() {
        if line.starts_with("diff --git") {
            if let Some((header, lines)) = current.take() {
                files.push(finish_file(header, lines));
            }
            current = Some((line.to_string(), vec![line.to_string()]));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line.to_string());
        }
    }
    if let Some((header, lines)) = current.take() {
        files.push(finish_file(header, lines));
    }
    files
}

fn finish_file(header: String, lines: Vec<String>) -> FileDiff {
    let mut path = None;
    let mut pre_path = None;
    let mut is_deleted = false;
    let mut added_lines = Vec::new();
    let mut post_line = 0usize;
    let mut in_hunk = false;

    for line in &lines {
        if let Some(rest) = line.strip_prefix("+++ ") {
            if rest == "/dev/null" {
                is_deleted = true;
            } else {
                path = Some(strip_prefix_marker(rest));
            }
        } else if let Some(rest) = line.strip_prefix("--- ") {
            if rest != "/dev/null" {
                pre_path = Some(strip_prefix_marker(rest));
            }
        } else if let Some(cap) = HUNK_HEADER_RE.as_ref().and_then(|re| re.captures(line)) {
            post_line = cap[1].parse().unwrap_or(0);
            in_hunk = true;
        } else if in_hunk {
            if line.starts_with('+') {
                added_lines.push(post_line);
                post_line += 1;
            } else if line.starts_with('-') {
                // removed line: post-image position unchanged
            } else if line.starts_with('\\') {
                // "\ No newline at end of file"
            } else {
                post_line += 1;
            }
        }
    }

    let path = path
        .or(pre_path)
        .unwrap_or_else(|| path_from_git_header(&header));

    FileDiff {
        path,
        diff: lines.join("\n"),
        added_lines,
        is_deleted,
    }
}

fn strip_prefix_marker(path: &str) -> String {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

/// Last resort: take the `b/...` token of the `diff --git` line.
fn path_from_git_header(header: &str) -> String {
    header
        .split_whitespace()
        .last()
        .map(strip_prefix_marker)
        .unwrap_or_default()
}
