// Vibe-Forge: The Debugger Agent
// Three-layer diagnosis of runtime errors (substring parse, categorization,
// static scanners), mechanical pre-fixes, and the model-backed repair call.

use super::{
    Agent, AgentContext, AgentError, ChangeTarget, CodeWriter, FileMap, FileOperation, ModifyRequest, RuntimeError,
};
use crate::llm::SystemPrompts;
use crate::memory::BugPattern;
use crate::studio_core::validator::{check_balance, Validator};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Closed set of error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    BrowserIncompatibility,
    NullAccess,
    InfiniteRender,
    TypeMismatch,
    HooksViolation,
    SyntaxError,
    AsyncUnmount,
    BannedPackage,
    Generic,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 9] = [
        ErrorCategory::BrowserIncompatibility,
        ErrorCategory::NullAccess,
        ErrorCategory::InfiniteRender,
        ErrorCategory::TypeMismatch,
        ErrorCategory::HooksViolation,
        ErrorCategory::SyntaxError,
        ErrorCategory::AsyncUnmount,
        ErrorCategory::BannedPackage,
        ErrorCategory::Generic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::BrowserIncompatibility => "BROWSER_INCOMPATIBILITY",
            ErrorCategory::NullAccess => "NULL_ACCESS",
            ErrorCategory::InfiniteRender => "INFINITE_RENDER",
            ErrorCategory::TypeMismatch => "TYPE_MISMATCH",
            ErrorCategory::HooksViolation => "HOOKS_VIOLATION",
            ErrorCategory::SyntaxError => "SYNTAX_ERROR",
            ErrorCategory::AsyncUnmount => "ASYNC_UNMOUNT",
            ErrorCategory::BannedPackage => "BANNED_PACKAGE",
            ErrorCategory::Generic => "GENERIC",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        Self::ALL.iter().copied().find(|c| c.as_str() == upper)
    }

    /// Fix strategy handed to the model
    pub fn guidance(&self) -> &'static str {
        match self {
            ErrorCategory::BrowserIncompatibility => {
                "Remove Node.js APIs (process, require, Buffer, __dirname); use browser equivalents"
            }
            ErrorCategory::NullAccess => {
                "Guard possibly undefined values with optional chaining and default state ([] or {})"
            }
            ErrorCategory::InfiniteRender => {
                "Stop state updates during render: pass handlers as functions and give effects dependency arrays"
            }
            ErrorCategory::TypeMismatch => "Check the value's type before calling or iterating it",
            ErrorCategory::HooksViolation => {
                "Call hooks unconditionally at the top level of function components"
            }
            ErrorCategory::SyntaxError => "Fix the syntax: balance brackets, close JSX tags, terminate strings",
            ErrorCategory::AsyncUnmount => {
                "Cancel async work in effect cleanup and never make the effect callback itself async"
            }
            ErrorCategory::BannedPackage => "Replace the unsupported package with plain React or a browser API",
            ErrorCategory::Generic => "Find and fix the root cause with the smallest correct change",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Substring table, checked in order
const CATEGORY_MARKERS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::InfiniteRender,
        &["too many re-renders", "maximum update depth", "infinite loop", "maximum call stack"],
    ),
    (
        ErrorCategory::HooksViolation,
        &[
            "invalid hook call",
            "rendered more hooks",
            "rendered fewer hooks",
            "hooks can only be called",
            "is called conditionally",
            "change in the order of hooks",
        ],
    ),
    (
        ErrorCategory::AsyncUnmount,
        &["unmounted component", "can't perform a react state update", "memory leak", "aborterror"],
    ),
    (
        ErrorCategory::BrowserIncompatibility,
        &[
            "process is not defined",
            "require is not defined",
            "module is not defined",
            "exports is not defined",
            "__dirname",
            "__filename",
            "buffer is not defined",
            "global is not defined",
            "commonjs",
        ],
    ),
    (
        ErrorCategory::BannedPackage,
        &[
            "banned package",
            "failed to resolve module",
            "could not resolve",
            "cannot find module",
            "module not found",
            "failed to fetch dynamically imported module",
        ],
    ),
    (
        ErrorCategory::SyntaxError,
        &[
            "syntaxerror",
            "unexpected token",
            "unexpected end of input",
            "unexpected identifier",
            "unterminated",
            "unclosed",
            "mismatched",
            "unexpected '",
            "adjacent jsx elements",
        ],
    ),
    (
        ErrorCategory::NullAccess,
        &[
            "cannot read properties of undefined",
            "cannot read properties of null",
            "cannot read property",
            "undefined is not an object",
            "null is not an object",
            "is undefined",
            "is null",
        ],
    ),
    (
        ErrorCategory::TypeMismatch,
        &[
            "is not a function",
            "is not iterable",
            "is not a constructor",
            "objects are not valid as a react child",
            "typeerror",
        ],
    ),
];

/// Layer (b): categorize an error message
pub fn categorize(message: &str) -> ErrorCategory {
    let lower = message.to_lowercase();
    CATEGORY_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| lower.contains(m)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Generic)
}

static FILE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([\w./-]+\.(?:jsx|js|tsx|ts|css))(?::(\d+))?(?::(\d+))?").expect("file reference pattern")
});

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digits pattern"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern"));

/// Lowercased, digits masked, whitespace collapsed
pub fn normalize_message(message: &str) -> String {
    let first_line = message.trim().lines().next().unwrap_or("").to_lowercase();
    let masked = DIGITS.replace_all(&first_line, "#");
    WHITESPACE.replace_all(masked.trim(), " ").into_owned()
}

/// Identity of an error for stuck-loop detection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorSignature {
    pub category: ErrorCategory,
    pub message: String,
    pub file: String,
}

impl ErrorSignature {
    pub fn new(category: ErrorCategory, message: &str, file: &str) -> Self {
        Self {
            category,
            message: normalize_message(message),
            file: file.to_string(),
        }
    }
}

impl fmt::Display for ErrorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}: {}", self.category, self.file, self.message)
    }
}

/// One static scanner hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanFinding {
    pub file: String,
    pub line: usize,
    pub category: ErrorCategory,
    pub issue: String,
}

struct LinePattern {
    regex: Lazy<Regex>,
    category: ErrorCategory,
    issue: &'static str,
}

static BROWSER_PATTERNS: [LinePattern; 4] = [
    LinePattern {
        regex: Lazy::new(|| Regex::new(r"\bprocess\.(?:env|argv|cwd|exit)\b").expect("process pattern")),
        category: ErrorCategory::BrowserIncompatibility,
        issue: "Node.js `process` is not available in the browser",
    },
    LinePattern {
        regex: Lazy::new(|| Regex::new(r"\brequire\s*\(").expect("require pattern")),
        category: ErrorCategory::BrowserIncompatibility,
        issue: "CommonJS `require` is not available in the browser",
    },
    LinePattern {
        regex: Lazy::new(|| Regex::new(r"\b__dirname\b|\b__filename\b").expect("dirname pattern")),
        category: ErrorCategory::BrowserIncompatibility,
        issue: "`__dirname`/`__filename` are Node.js only",
    },
    LinePattern {
        regex: Lazy::new(|| Regex::new(r"\bBuffer\.(?:from|alloc)\b").expect("buffer pattern")),
        category: ErrorCategory::BrowserIncompatibility,
        issue: "`Buffer` is Node.js only",
    },
];

static FRAMEWORK_PATTERNS: [LinePattern; 4] = [
    LinePattern {
        regex: Lazy::new(|| {
            Regex::new(r"\bon[A-Z]\w*=\{\s*[A-Za-z_$][\w$.]*\([^)]*\)\s*\}").expect("handler call pattern")
        }),
        category: ErrorCategory::InfiniteRender,
        issue: "Event handler is called during render instead of passed as a function",
    },
    LinePattern {
        regex: Lazy::new(|| {
            Regex::new(r"^\s*(?:if|for|while)\b.*\buse[A-Z]\w*\s*\(").expect("conditional hook pattern")
        }),
        category: ErrorCategory::HooksViolation,
        issue: "Hook called inside a condition or loop",
    },
    LinePattern {
        regex: Lazy::new(|| Regex::new(r"\buseEffect\s*\(\s*async\b").expect("async effect pattern")),
        category: ErrorCategory::AsyncUnmount,
        issue: "Effect callback is async; it must return a cleanup function, not a promise",
    },
    LinePattern {
        regex: Lazy::new(|| {
            Regex::new(r"\b(?:ReactDOM\.render|createRoot|hydrateRoot)\s*\(").expect("root render pattern")
        }),
        category: ErrorCategory::InfiniteRender,
        issue: "Direct root render call conflicts with the host renderer",
    },
];

/// Output of the three-layer diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnosis {
    pub category: ErrorCategory,
    pub message: String,
    /// File the repair is scoped to
    pub file: String,
    pub line: Option<u32>,
    pub findings: Vec<ScanFinding>,
}

impl Diagnosis {
    pub fn signature(&self) -> ErrorSignature {
        ErrorSignature::new(self.category, &self.message, &self.file)
    }

    /// Scanner findings in the target file
    pub fn local_findings(&self) -> impl Iterator<Item = &ScanFinding> {
        self.findings.iter().filter(move |f| f.file == self.file)
    }
}

/// Outcome of one repair attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub mechanical_fixes: Vec<String>,
    /// Post-fix error signature, `None` when the attempt succeeded
    pub signature: Option<ErrorSignature>,
    pub stuck: bool,
    pub detail: String,
}

/// Terminal result of the debug loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugOutcome {
    pub fixed: bool,
    /// Empty unless fixed
    pub operations: Vec<FileOperation>,
    pub attempts: usize,
    pub category: ErrorCategory,
    /// File the repair was scoped to
    pub file: String,
    pub last_error: Option<String>,
    pub history: Vec<AttemptRecord>,
}

/// The Debugger Agent
pub struct Debugger {
    writer: Arc<CodeWriter>,
    validator: Validator,
}

impl Agent for Debugger {
    fn name(&self) -> &str {
        "Debugger"
    }

    fn system_prompt(&self) -> &str {
        SystemPrompts::debugger()
    }
}

impl Debugger {
    pub fn new(writer: Arc<CodeWriter>) -> Self {
        Self {
            writer,
            validator: Validator::default(),
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Layers (a) to (c) plus target-file location
    pub fn diagnose(&self, error: &RuntimeError, files: &FileMap) -> Diagnosis {
        let category = categorize(&error.message);
        let findings = self.scan(files);

        let (mentioned_file, mentioned_line) = parse_location(&error.message, files);
        let file = error
            .file
            .as_deref()
            .and_then(|f| resolve_file(f, files))
            .or(mentioned_file)
            .or_else(|| findings.iter().find(|f| f.category == category).map(|f| f.file.clone()))
            .or_else(|| findings.first().map(|f| f.file.clone()))
            .unwrap_or_else(|| entry_file(files));

        let diagnosis = Diagnosis {
            category,
            message: error.message.clone(),
            file,
            line: error.line.or(mentioned_line),
            findings,
        };
        log::info!(
            "Diagnosed {} in {} ({} scanner finding(s))",
            diagnosis.category,
            diagnosis.file,
            diagnosis.findings.len()
        );
        diagnosis
    }

    /// Layer (c): static scanners independent of the error text
    pub fn scan(&self, files: &FileMap) -> Vec<ScanFinding> {
        let mut findings = Vec::new();

        for (name, content) in files {
            for (idx, line) in content.lines().enumerate() {
                if line.trim_start().starts_with("//") {
                    continue;
                }
                for pattern in BROWSER_PATTERNS.iter().chain(FRAMEWORK_PATTERNS.iter()) {
                    if pattern.regex.is_match(line) {
                        findings.push(ScanFinding {
                            file: name.clone(),
                            line: idx + 1,
                            category: pattern.category,
                            issue: pattern.issue.to_string(),
                        });
                    }
                }
            }

            for package in self.validator.banned_imports(content) {
                findings.push(ScanFinding {
                    file: name.clone(),
                    line: line_of(content, &package),
                    category: ErrorCategory::BannedPackage,
                    issue: format!("Imports unsupported package '{}'", package),
                });
            }

            if let Some(problem) = check_balance(content).into_iter().next() {
                findings.push(ScanFinding {
                    file: name.clone(),
                    line: 0,
                    category: ErrorCategory::SyntaxError,
                    issue: problem,
                });
            }
        }

        findings
    }

    /// Fixes that need no model call. Returns the new code and what was done.
    pub fn mechanical_fixes(&self, category: ErrorCategory, code: &str, filename: &str) -> (String, Vec<String>) {
        let mut fixes = Vec::new();
        let mut code = code.to_string();

        if category == ErrorCategory::BrowserIncompatibility && code.contains("process.env.NODE_ENV") {
            code = code.replace("process.env.NODE_ENV", "'production'");
            fixes.push("Replaced process.env.NODE_ENV with 'production'".to_string());
        }

        let repaired = self.validator.validate_with_repair(&code, filename);
        if repaired.auto_fixed {
            code = repaired.code;
            fixes.extend(repaired.fixes);
        }

        (code, fixes)
    }

    /// One model-backed repair of the diagnosed file
    pub async fn attempt_fix(
        &self,
        diagnosis: &Diagnosis,
        current: &str,
        previous_failures: &[String],
        context: &AgentContext,
    ) -> Result<String, AgentError> {
        let target = ChangeTarget {
            pattern: diagnosis
                .line
                .and_then(|line| current.lines().nth((line as usize).saturating_sub(1)))
                .map(|l| l.trim().to_string())
                .unwrap_or_default(),
            replacement: String::new(),
            reason: format!(
                "{}: {}. Strategy: {}",
                diagnosis.category,
                diagnosis.message.trim(),
                diagnosis.category.guidance()
            ),
        };

        let mut notes = String::new();
        let local: Vec<&ScanFinding> = diagnosis.local_findings().collect();
        if !local.is_empty() {
            notes.push_str("Static scan findings:\n");
            for finding in local {
                notes.push_str(&format!("- line {}: [{}] {}\n", finding.line, finding.category, finding.issue));
            }
        }
        for (i, failure) in previous_failures.iter().enumerate() {
            notes.push_str(&format!(
                "\nPREVIOUS ATTEMPT {} FAILED: {}\nDo not repeat that change; try a different approach.\n",
                i + 1,
                failure
            ));
        }

        let mut request = ModifyRequest::new(&diagnosis.file, current, vec![target])
            .with_role_prompt(SystemPrompts::debugger());
        if !notes.is_empty() {
            request = request.with_notes(notes);
        }
        self.writer.modify(&request, context).await
    }

    /// Pattern recorded after a confirmed fix
    pub fn learned_pattern(&self, diagnosis: &Diagnosis, mechanical_fixes: &[String]) -> BugPattern {
        let mut fix = diagnosis.category.guidance().to_string();
        if !mechanical_fixes.is_empty() {
            fix = format!("{}; {}", mechanical_fixes.join("; "), fix);
        }
        BugPattern::new(diagnosis.category, &normalize_message(&diagnosis.message), &fix, &diagnosis.file)
    }
}

/// Layer (a): file and line mentioned in the raw message
fn parse_location(message: &str, files: &FileMap) -> (Option<String>, Option<u32>) {
    for caps in FILE_REF.captures_iter(message) {
        if let Some(file) = resolve_file(&caps[1], files) {
            let line = caps.get(2).and_then(|m| m.as_str().parse().ok());
            return (Some(file), line);
        }
    }
    (None, None)
}

/// Match a path from an error against snapshot names, by suffix
fn resolve_file(path: &str, files: &FileMap) -> Option<String> {
    let trimmed = path.trim_start_matches("./").trim_start_matches('/');
    if files.contains_key(trimmed) {
        return Some(trimmed.to_string());
    }
    files
        .keys()
        .find(|name| name.ends_with(&format!("/{}", trimmed)) || trimmed.ends_with(&format!("/{}", name)))
        .cloned()
}

fn entry_file(files: &FileMap) -> String {
    ["App.jsx", "App.tsx", "App.js", "src/App.jsx"]
        .iter()
        .find(|name| files.contains_key(**name))
        .map(|name| name.to_string())
        .or_else(|| files.keys().next().cloned())
        .unwrap_or_else(|| "App.jsx".to_string())
}

fn line_of(content: &str, needle: &str) -> usize {
    content
        .lines()
        .position(|line| line.contains(needle))
        .map(|idx| idx + 1)
        .unwrap_or(0)
}
