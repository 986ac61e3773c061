//! Signal extraction: normalizing a free-form lookup request into the
//! structured record the ranker consumes.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::types::task::Phase;

/// JS-style error lines: `TypeError: msg at file.ts:10:5`.
static JS_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re =
        Regex::new(r"\b([A-Za-z]\w*Error)\s*:\s*([^\n]+?)(?:\s+at\s+([^\s:]+):(\d+):(\d+))?$")
            .unwrap();
    re
});

/// Python-style traceback frames: `File "app.py", line 42, in handler`.
static PY_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r#"File "([^"]+)", line (\d+)"#).unwrap();
    re
});

/// Error codes: `ENOENT`, `E11000`, `ERR_MODULE_NOT_FOUND`.
static ERROR_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"\b(E[A-Z0-9]+|ERR_[A-Z0-9_]+)\b").unwrap();
    re
});

/// GitHub remotes: `github.com:org/repo` or `github.com/org/repo`.
static GITHUB_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"github\.com[:/]([\w.-]+)/([\w.-]+?)(?:\.git)?(?:[/\s]|$)").unwrap();
    re
});

/// Declared task intent inside a lookup request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskIntent {
    /// Intent category (`bug`, `feature`, ...)
    #[serde(rename = "type")]
    pub intent_type: String,
    /// Caller confidence in the classification
    #[serde(default)]
    pub confidence: f64,
    /// Optional refinement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
}

/// Structured code context accompanying a lookup request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub test_files: Vec<String>,
}

/// One structured error observation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Error type name (`SqliteError`)
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    #[serde(default)]
    pub message: String,
    /// File the error surfaced in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    /// Stack depth at the failure point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_depth: Option<u64>,
    /// How often this error repeated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,
}

/// Session history carried across lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Patterns recently applied successfully
    #[serde(default)]
    pub recent_patterns: Vec<String>,
    /// Patterns that recently failed
    #[serde(default)]
    pub failed_patterns: Vec<String>,
}

/// Project-level facts supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci_platform: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// The observed inputs of a lookup request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupContext {
    /// Free-text task description (required)
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    /// Legacy unstructured error strings
    #[serde(default)]
    pub recent_errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_intent: Option<TaskIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_context: Option<CodeContext>,
    /// Structured errors; takes precedence over `recent_errors`
    #[serde(default)]
    pub error_context: Vec<ErrorContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_context: Option<SessionContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_signals: Option<ProjectSignals>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_phase: Option<String>,
}

/// A framework observation parsed from `name@version` / `name==version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkSignal {
    /// Lowercased framework name
    pub name: String,
    /// Version suffix, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Structured signals extracted from a lookup request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub languages: Vec<String>,
    pub frameworks: Vec<FrameworkSignal>,
    /// Deduplicated paths in insertion order
    pub paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// Error type names and extracted error codes
    pub error_types: Vec<String>,
    pub error_files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_intent: Option<TaskIntent>,
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci_platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_phase: Option<Phase>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub related_files: Vec<String>,
    pub test_files: Vec<String>,
    pub recent_patterns: Vec<String>,
    pub failed_patterns: Vec<String>,
}

/// Normalize a language alias (`js` -> `javascript`).
#[must_use]
pub fn normalize_language(language: &str) -> String {
    let lower = language.trim().to_ascii_lowercase();
    match lower.as_str() {
        "js" | "node" | "nodejs" => "javascript".to_string(),
        "ts" => "typescript".to_string(),
        "py" => "python".to_string(),
        "rb" => "ruby".to_string(),
        "golang" => "go".to_string(),
        "cs" | "c#" => "csharp".to_string(),
        "rs" => "rust".to_string(),
        _ => lower,
    }
}

/// Infer a language from a file extension.
#[must_use]
pub fn language_from_path(path: &str) -> Option<String> {
    let extension = path.rsplit('.').next()?;
    let language = match extension.to_ascii_lowercase().as_str() {
        "ts" | "tsx" | "mts" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "swift" => "swift",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "php" => "php",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        _ => return None,
    };
    Some(language.to_string())
}

/// Parse `name@version` or `name==version`; the name is lowercased.
#[must_use]
pub fn parse_framework(raw: &str) -> FrameworkSignal {
    let trimmed = raw.trim();
    let (name, version) = if let Some((n, v)) = trimmed.split_once("==") {
        (n, Some(v))
    } else if let Some((n, v)) = trimmed.split_once('@') {
        (n, Some(v))
    } else {
        (trimmed, None)
    };
    FrameworkSignal {
        name: name.to_ascii_lowercase(),
        version: version
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string),
    }
}

fn push_unique(target: &mut Vec<String>, value: String) {
    if !value.is_empty() && !target.iter().any(|v| v == &value) {
        target.push(value);
    }
}

/// Extract structured signals from a lookup request.
#[must_use]
pub fn extract(context: &LookupContext) -> Signals {
    let mut signals = Signals::default();

    // Language priority: project signals > explicit field > file extension.
    if let Some(language) = context
        .project_signals
        .as_ref()
        .and_then(|p| p.language.as_deref())
    {
        push_unique(&mut signals.languages, normalize_language(language));
    }
    if let Some(language) = context.language.as_deref() {
        push_unique(&mut signals.languages, normalize_language(language));
    }
    if let Some(file) = context.current_file.as_deref() {
        if let Some(language) = language_from_path(file) {
            push_unique(&mut signals.languages, language);
        }
    }

    // Frameworks from the explicit field and project signals.
    if let Some(framework) = context.framework.as_deref() {
        let parsed = parse_framework(framework);
        if !signals.frameworks.contains(&parsed) {
            signals.frameworks.push(parsed);
        }
    }
    if let Some(framework) = context
        .project_signals
        .as_ref()
        .and_then(|p| p.framework.as_deref())
    {
        let parsed = parse_framework(framework);
        if !signals.frameworks.contains(&parsed) {
            signals.frameworks.push(parsed);
        }
    }

    // Paths, in deterministic insertion order.
    if let Some(file) = context.current_file.as_deref() {
        push_unique(&mut signals.paths, file.to_string());
    }
    if let Some(code) = context.code_context.as_ref() {
        if let Some(file) = code.current_file.as_deref() {
            push_unique(&mut signals.paths, file.to_string());
        }
        for file in &code.related_files {
            push_unique(&mut signals.paths, file.clone());
        }
        for file in &code.test_files {
            push_unique(&mut signals.paths, file.clone());
        }
        signals.imports.clone_from(&code.imports);
        signals.exports.clone_from(&code.exports);
        signals.related_files.clone_from(&code.related_files);
        signals.test_files.clone_from(&code.test_files);
    }

    // Errors: structured context wins over the legacy string list.
    if context.error_context.is_empty() {
        for raw in &context.recent_errors {
            extract_errors_from_text(raw, &mut signals);
        }
    } else {
        for error in &context.error_context {
            push_unique(&mut signals.error_types, error.error_type.clone());
            if let Some(file) = error.file.as_deref() {
                push_unique(&mut signals.error_files, file.to_string());
            }
            extract_error_codes(&error.message, &mut signals);
        }
    }

    // Paths surfaced by errors also count as paths, and may reveal
    // additional languages.
    for file in signals.error_files.clone() {
        push_unique(&mut signals.paths, file.clone());
        if let Some(language) = language_from_path(&file) {
            push_unique(&mut signals.languages, language);
        }
    }

    // Repo and org.
    if let Some(repo_path) = context.repo_path.as_deref() {
        if let Some(captures) = GITHUB_RE.captures(repo_path) {
            signals.org = captures.get(1).map(|m| m.as_str().to_string());
            signals.repo = captures.get(2).map(|m| m.as_str().to_string());
        } else {
            let mut components = repo_path
                .split('/')
                .filter(|c| !c.is_empty())
                .rev();
            signals.repo = components.next().map(ToString::to_string);
            signals.org = components.next().map(ToString::to_string);
        }
    }

    signals.task_intent.clone_from(&context.task_intent);

    if let Some(project) = context.project_signals.as_ref() {
        signals.dependencies.clone_from(&project.dependencies);
        signals.test_framework.clone_from(&project.test_framework);
        signals.build_tool.clone_from(&project.build_tool);
        signals.ci_platform.clone_from(&project.ci_platform);
    }

    signals.workflow_phase = context
        .workflow_phase
        .as_deref()
        .and_then(|p| Phase::parse(p).ok());

    if let Some(session) = context.session_context.as_ref() {
        signals.recent_patterns.clone_from(&session.recent_patterns);
        signals.failed_patterns.clone_from(&session.failed_patterns);
    }

    signals
}

/// Parse one legacy error string: JS form, Python form, and bare codes.
fn extract_errors_from_text(raw: &str, signals: &mut Signals) {
    if let Some(captures) = JS_ERROR_RE.captures(raw) {
        if let Some(name) = captures.get(1) {
            push_unique(&mut signals.error_types, name.as_str().to_string());
        }
        if let Some(file) = captures.get(3) {
            push_unique(&mut signals.error_files, file.as_str().to_string());
        }
    }
    for captures in PY_ERROR_RE.captures_iter(raw) {
        if let Some(file) = captures.get(1) {
            push_unique(&mut signals.error_files, file.as_str().to_string());
        }
    }
    extract_error_codes(raw, signals);
}

/// Pull `E...` / `ERR_...` codes out of a message into `error_types`.
fn extract_error_codes(text: &str, signals: &mut Signals) {
    for captures in ERROR_CODE_RE.captures_iter(text) {
        if let Some(code) = captures.get(1) {
            push_unique(&mut signals.error_types, code.as_str().to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_priority() {
        let context = LookupContext {
            task: "t".to_string(),
            language: Some("js".to_string()),
            current_file: Some("src/main.py".to_string()),
            project_signals: Some(ProjectSignals {
                language: Some("TypeScript".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.languages, vec!["typescript", "javascript", "python"]);
    }

    #[test]
    fn test_framework_version_parsing() {
        assert_eq!(
            parse_framework("React@18.2.0"),
            FrameworkSignal {
                name: "react".to_string(),
                version: Some("18.2.0".to_string())
            }
        );
        assert_eq!(
            parse_framework("Django==4.2"),
            FrameworkSignal {
                name: "django".to_string(),
                version: Some("4.2".to_string())
            }
        );
        assert_eq!(parse_framework("axum").version, None);
    }

    #[test]
    fn test_js_error_extraction() {
        let context = LookupContext {
            task: "t".to_string(),
            recent_errors: vec![
                "SqliteError: database is locked at src/db.ts:42:7".to_string(),
            ],
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.error_types, vec!["SqliteError"]);
        assert_eq!(signals.error_files, vec!["src/db.ts"]);
        // Language derived from the error file path.
        assert!(signals.languages.contains(&"typescript".to_string()));
    }

    #[test]
    fn test_python_error_extraction() {
        let context = LookupContext {
            task: "t".to_string(),
            recent_errors: vec![
                r#"Traceback: File "app/views.py", line 88, in handler"#.to_string(),
            ],
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.error_files, vec!["app/views.py"]);
        assert!(signals.languages.contains(&"python".to_string()));
    }

    #[test]
    fn test_error_code_extraction() {
        let context = LookupContext {
            task: "t".to_string(),
            recent_errors: vec!["npm failed with ENOENT and ERR_MODULE_NOT_FOUND".to_string()],
            ..Default::default()
        };
        let signals = extract(&context);
        assert!(signals.error_types.contains(&"ENOENT".to_string()));
        assert!(signals
            .error_types
            .contains(&"ERR_MODULE_NOT_FOUND".to_string()));
    }

    #[test]
    fn test_structured_errors_take_precedence() {
        let context = LookupContext {
            task: "t".to_string(),
            recent_errors: vec!["TypeError: legacy at a.js:1:1".to_string()],
            error_context: vec![ErrorContext {
                error_type: "SqliteError".to_string(),
                message: "database is locked".to_string(),
                file: Some("src/db.rs".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.error_types, vec!["SqliteError"]);
        assert_eq!(signals.error_files, vec!["src/db.rs"]);
    }

    #[test]
    fn test_repo_org_from_github_remote() {
        let context = LookupContext {
            task: "t".to_string(),
            repo_path: Some("git@github.com:acme/widgets.git".to_string()),
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.org.as_deref(), Some("acme"));
        assert_eq!(signals.repo.as_deref(), Some("widgets"));
    }

    #[test]
    fn test_repo_org_from_plain_path() {
        let context = LookupContext {
            task: "t".to_string(),
            repo_path: Some("/home/dev/acme/widgets".to_string()),
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(signals.org.as_deref(), Some("acme"));
        assert_eq!(signals.repo.as_deref(), Some("widgets"));
    }

    #[test]
    fn test_paths_deduplicated_in_order() {
        let context = LookupContext {
            task: "t".to_string(),
            current_file: Some("src/a.rs".to_string()),
            code_context: Some(CodeContext {
                current_file: Some("src/a.rs".to_string()),
                related_files: vec!["src/b.rs".to_string(), "src/a.rs".to_string()],
                test_files: vec!["tests/a_test.rs".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let signals = extract(&context);
        assert_eq!(
            signals.paths,
            vec!["src/a.rs", "src/b.rs", "tests/a_test.rs"]
        );
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let context = LookupContext {
            task: "fix sqlite sync error".to_string(),
            language: Some("typescript".to_string()),
            recent_errors: vec!["SqliteError: database is locked".to_string()],
            ..Default::default()
        };
        assert_eq!(extract(&context), extract(&context));
    }
}
