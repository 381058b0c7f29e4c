//! MyBatis mapper XML support.
//!
//! A changed `*Mapper.xml` maps back to its Java interface through the
//! `<mapper namespace="...">` declaration; the changed `<select|insert|
//! update|delete|sql id="...">` tags in the diff become the changed
//! method list for that file.

use once_cell::sync::Lazy;
use regex::Regex;

static NAMESPACE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"<mapper\s+[^>]*namespace\s*=\s*"([^"]+)""#).ok());

static SQL_ID_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r#"<(?:select|insert|update|delete|sql)\s+[^>]*id\s*=\s*"([^"]+)""#).ok()
});

static ANY_ID_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"id\s*=\s*"([^"]+)""#).ok());

/// Namespace of a mapper file, i.e. the FQN of its Java interface.
pub fn mapper_namespace(content: &str) -> Option<String> {
    NAMESPACE_RE
        .as_ref()?
        .captures(content)
        .map(|cap| cap[1].to_string())
}

/// SQL ids affected by a diff: ids on `+`/`-` lines first; when the diff
/// only touched statement bodies, fall back to every id visible in the
/// diff context.
pub fn changed_sql_ids(diff: &str) -> Vec<String> {
    let mut ids = Vec::new();

    if let Some(any_id) = ANY_ID_RE.as_ref() {
        for line in diff.lines() {
            let changed = (line.starts_with('+') && !line.starts_with("+++"))
                || (line.starts_with('-') && !line.starts_with("---"));
            if !changed {
                continue;
            }
            if let Some(cap) = any_id.captures(line) {
                let id = cap[1].to_string();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }

    if ids.is_empty() {
        if let Some(sql_id) = SQL_ID_RE.as_ref() {
            for cap in sql_id.captures_iter(diff) {
                let id = cap[1].to_string();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    ids
}
