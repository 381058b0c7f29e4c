//! Line-oriented Java scanner.
//!
//! Deliberately shallow: a handful of line shapes (package, import, type
//! declaration, annotation, field, method) plus a brace-depth tracker that
//! is comment- and string-aware. This is not a grammar; it only has to
//! recognize the Spring/Dubbo/Feign idioms the indexer cares about.

use once_cell::sync::Lazy;
use regex::Regex;

// Patterns compile once; one that fails to compile disables its rule
// rather than panicking.
static PACKAGE_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\s*package\s+([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)\s*;").ok()
});

static IMPORT_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^\s*import\s+(?:static\s+)?([A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*)(\.\*)?\s*;")
        .ok()
});

static TYPE_DECL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(class|interface|enum)\s+([A-Za-z_$][\w$]*)").ok());

static ANNOTATION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"@([A-Za-z_$][\w$]*)\s*(?:\(([^)]*)\))?").ok());

static ANNOTATION_VALUE_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?:value|path)\s*=\s*"([^"]*)""#).ok());

static FIRST_STRING_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#""([^"]*)""#).ok());

static REQUEST_METHOD_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"method\s*=\s*\{?\s*RequestMethod\.([A-Z]+)").ok());

static FIELD_DECL_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:private|protected|public|static|final|transient|volatile)\s+)*([A-Z][\w$]*)(?:<[^;=]*>)?\s+([a-z_$][\w$]*)\s*(?:=[^;]*)?;",
    )
    .ok()
});

static METHOD_DECL_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?:public|protected|private|static|final|synchronized|abstract|default|native)\s+)*(?:<[^>]+>\s+)?[\w$.]+(?:<[^>]*>)?(?:\[\])*\s+([a-zA-Z_$][\w$]*)\s*\(",
    )
    .ok()
});

/// Keywords that would otherwise match the method-declaration shape
const NON_METHOD_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "throw", "else", "do", "try",
    "synchronized",
];

/// One annotation occurrence on a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub name: String,
    /// Raw text between the parentheses, if any
    pub args: Option<String>,
}

impl Annotation {
    /// The annotation's path/value string: `value=`/`path=` wins, then the
    /// first string literal. `@GetMapping` with no argument yields "".
    pub fn path_value(&self) -> String {
        let Some(args) = &self.args else {
            return String::new();
        };
        if let Some(cap) = ANNOTATION_VALUE_RE.as_ref().and_then(|re| re.captures(args)) {
            return cap[1].to_string();
        }
        if let Some(cap) = FIRST_STRING_RE.as_ref().and_then(|re| re.captures(args)) {
            return cap[1].to_string();
        }
        String::new()
    }

    /// `method = RequestMethod.POST` on a `@RequestMapping`
    pub fn request_method(&self) -> Option<String> {
        self.args
            .as_deref()
            .and_then(|args| REQUEST_METHOD_RE.as_ref()?.captures(args))
            .map(|cap| cap[1].to_string())
    }
}

/// Parsed type declaration header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    /// `class`, `interface` or `enum`
    pub keyword: String,
    pub name: String,
    /// Names after `implements`, as written (simple or qualified)
    pub implements: Vec<String>,
}

static IMPLEMENTS_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\bimplements\s+([^{]+)").ok());

fn parse_implements(code: &str) -> Vec<String> {
    let Some(cap) = IMPLEMENTS_RE.as_ref().and_then(|re| re.captures(code)) else {
        return Vec::new();
    };
    cap[1]
        .split(',')
        .map(|part| {
            // Drop generic arguments: `UserService<Long>` -> `UserService`
            let part = part.trim();
            part.split('<').next().unwrap_or(part).trim().to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Parsed field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub type_name: String,
    pub field_name: String,
}

pub fn parse_package(line: &str) -> Option<String> {
    PACKAGE_RE
        .as_ref()?
        .captures(line)
        .map(|cap| cap[1].to_string())
}

pub fn parse_import(line: &str) -> Option<crate::core::types::ImportDecl> {
    IMPORT_RE
        .as_ref()?
        .captures(line)
        .map(|cap| crate::core::types::ImportDecl {
            path: cap[1].to_string(),
            wildcard: cap.get(2).is_some(),
        })
}

pub fn parse_type_decl(line: &str) -> Option<TypeDecl> {
    let code = strip_line_comment(line);
    TYPE_DECL_RE.as_ref()?.captures(code).map(|cap| TypeDecl {
        keyword: cap[1].to_string(),
        name: cap[2].to_string(),
        implements: parse_implements(code),
    })
}

/// All annotations on the line, left to right.
pub fn parse_annotations(line: &str) -> Vec<Annotation> {
    let Some(re) = ANNOTATION_RE.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(strip_line_comment(line))
        .map(|cap| Annotation {
            name: cap[1].to_string(),
            args: cap.get(2).map(|m| m.as_str().to_string()),
        })
        .collect()
}

pub fn parse_field_decl(line: &str) -> Option<FieldDecl> {
    let code = strip_leading_annotations(strip_line_comment(line));
    FIELD_DECL_RE.as_ref()?.captures(code).map(|cap| FieldDecl {
        type_name: cap[1].to_string(),
        field_name: cap[2].to_string(),
    })
}

static LEADING_ANNOTATION_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^\s*@[A-Za-z_$][\w$]*(?:\([^)]*\))?\s*").ok());

/// Annotations may share a line with the declaration they decorate
/// (`@Resource private PointClient pointClient;`); the declaration
/// recognizers see the line without them.
fn strip_leading_annotations(mut code: &str) -> &str {
    let Some(re) = LEADING_ANNOTATION_RE.as_ref() else {
        return code;
    };
    while let Some(m) = re.find(code) {
        if m.end() == 0 {
            break;
        }
        code = &code[m.end()..];
    }
    code
}

/// Method name when the line looks like a method declaration header.
/// Control-flow keywords and constructor-less shapes are rejected.
pub fn parse_method_decl(line: &str) -> Option<String> {
    let code = strip_leading_annotations(strip_line_comment(line));
    let trimmed = code.trim_start();
    // `return compute(x);` has the declaration shape; reject on the
    // leading keyword instead of the captured name.
    let first_token: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if NON_METHOD_KEYWORDS.contains(&first_token.as_str()) {
        return None;
    }
    let cap = METHOD_DECL_RE.as_ref()?.captures(code)?;
    let name = cap[1].to_string();
    if NON_METHOD_KEYWORDS.contains(&name.as_str()) {
        return None;
    }
    // Call expressions like `foo.bar(` never match the shape because the
    // regex requires a return type token before the name; still guard
    // against assignments sneaking through.
    if code.contains('=') && !code.contains("==") && code.trim_end().ends_with(';') {
        return None;
    }
    Some(name)
}

fn strip_line_comment(line: &str) -> &str {
    // Only strip when the `//` is outside a string literal
    let mut in_string = false;
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_string = !in_string,
            b'\\' if in_string => i += 1,
            b'/' if !in_string && i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                return &line[..i];
            }
            _ => {}
        }
        i += 1;
    }
    line
}

/// Comment- and string-aware brace depth counter.
#[derive(Debug, Default)]
pub struct BraceTracker {
    depth: i32,
    in_block_comment: bool,
}

impl BraceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth before the line is consumed.
    pub fn depth(&self) -> i32 {
        self.depth
    }

    /// Consume one line, updating the depth. Returns the depth at the
    /// start of the line, i.e. the depth its declarations live at.
    pub fn consume(&mut self, line: &str) -> i32 {
        let at_start = self.depth;
        let bytes = line.as_bytes();
        let mut in_string = false;
        let mut in_char = false;
        let mut i = 0;
        while i < bytes.len() {
            if self.in_block_comment {
                if bytes[i] == b'*' && i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                    self.in_block_comment = false;
                    i += 1;
                }
                i += 1;
                continue;
            }
            match bytes[i] {
                b'\\' if in_string || in_char => i += 1,
                b'"' if !in_char => in_string = !in_string,
                b'\'' if !in_string => in_char = !in_char,
                b'/' if !in_string && !in_char && i + 1 < bytes.len() => {
                    match bytes[i + 1] {
                        b'/' => break,
                        b'*' => {
                            self.in_block_comment = true;
                            i += 1;
                        }
                        _ => {}
                    }
                }
                b'{' if !in_string && !in_char => self.depth += 1,
                b'}' if !in_string && !in_char => self.depth -= 1,
                _ => {}
            }
            i += 1;
        }
        at_start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_line() {
        assert_eq!(
            parse_package("package com.cloudE.pay.client;"),
            Some("com.cloudE.pay.client".to_string())
        );
        assert_eq!(parse_package("// package commented.out;"), None);
    }

    #[test]
    fn import_lines() {
        let explicit = parse_import("import com.example.service.UserService;").unwrap();
        assert_eq!(explicit.path, "com.example.service.UserService");
        assert!(!explicit.wildcard);

        let wildcard = parse_import("import com.example.service.*;").unwrap();
        assert_eq!(wildcard.path, "com.example.service");
        assert!(wildcard.wildcard);

        assert!(parse_import("importx com.example.Foo;").is_none());
    }

    #[test]
    fn type_declarations() {
        let decl = parse_type_decl("public class PointManager extends BaseManager {").unwrap();
        assert_eq!(decl.keyword, "class");
        assert_eq!(decl.name, "PointManager");
        assert!(decl.implements.is_empty());

        let impls =
            parse_type_decl("public class UserServiceImpl implements UserService, Auditable<Long> {")
                .unwrap();
        assert_eq!(impls.implements, vec!["UserService", "Auditable"]);

        let iface = parse_type_decl("public interface PointClient {").unwrap();
        assert_eq!(iface.keyword, "interface");
        assert_eq!(iface.name, "PointClient");

        assert!(parse_type_decl("// class NotReal {").is_none());
    }

    #[test]
    fn annotation_values() {
        let anns = parse_annotations(r#"@RequestMapping(value = "/api/points", method = RequestMethod.POST)"#);
        assert_eq!(anns.len(), 1);
        assert_eq!(anns[0].name, "RequestMapping");
        assert_eq!(anns[0].path_value(), "/api/points");
        assert_eq!(anns[0].request_method(), Some("POST".to_string()));

        let simple = parse_annotations(r#"@GetMapping("/status")"#);
        assert_eq!(simple[0].path_value(), "/status");

        let bare = parse_annotations("@RestController");
        assert_eq!(bare[0].name, "RestController");
        assert_eq!(bare[0].path_value(), "");
    }

    #[test]
    fn field_declarations() {
        let inline = parse_field_decl("    @Resource private PointClient pointClient;").unwrap();
        assert_eq!(inline.type_name, "PointClient");
        assert_eq!(inline.field_name, "pointClient");

        let field = parse_field_decl("    private PointClient pointClient;").unwrap();
        assert_eq!(field.type_name, "PointClient");
        assert_eq!(field.field_name, "pointClient");

        let generic = parse_field_decl("    private List<PointRecord> records;").unwrap();
        assert_eq!(generic.type_name, "List");

        assert!(parse_field_decl("    pointClient.update(1L);").is_none());
    }

    #[test]
    fn method_declarations() {
        assert_eq!(
            parse_method_decl("    public BigDecimal batchUpdatePoints(Long userId, int delta) {"),
            Some("batchUpdatePoints".to_string())
        );
        assert_eq!(
            parse_method_decl("    List<String> findNames(String prefix) {"),
            Some("findNames".to_string())
        );
        assert_eq!(parse_method_decl("    if (enabled) {"), None);
        assert_eq!(parse_method_decl("    return compute(x);"), None);
        assert_eq!(parse_method_decl("    pointClient.batchUpdatePoints(id);"), None);
    }

    #[test]
    fn brace_depth_ignores_strings_and_comments() {
        let mut tracker = BraceTracker::new();
        tracker.consume("public class A {");
        assert_eq!(tracker.depth(), 1);
        tracker.consume(r#"    String s = "{not a brace}";"#);
        assert_eq!(tracker.depth(), 1);
        tracker.consume("    // { comment brace");
        assert_eq!(tracker.depth(), 1);
        tracker.consume("    /* { block");
        tracker.consume("       } still comment */");
        assert_eq!(tracker.depth(), 1);
        tracker.consume("    void m() { if (x) { y(); } }");
        assert_eq!(tracker.depth(), 1);
        tracker.consume("}");
        assert_eq!(tracker.depth(), 0);
    }
}
