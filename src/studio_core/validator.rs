// Vibe-Forge: Validator
// Fast deterministic code gate: balanced syntax, ES module structure,
// sandbox deny-list, root-render calls and formatting. No model calls.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Packages the in-browser sandbox cannot run
pub const DEFAULT_DENY_LIST: &[&str] = &[
    "fs",
    "path",
    "os",
    "child_process",
    "crypto",
    "http",
    "https",
    "net",
    "worker_threads",
    "express",
    "mongoose",
    "sqlite3",
    "pg",
    "mysql",
    "dotenv",
    "electron",
    "next",
    "react-router-dom",
    "styled-components",
];

// Static `import ... from '...'`, bare `import '...'` and `export ... from '...'`,
// anywhere on a line and with or without whitespace around `from`
static STATIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\b\s*(?:[\w*{}\s,$]+?\s*\bfrom\s*)?['"]([^'"]+)['"][ \t]*;?"#)
        .expect("static import pattern")
});

static DYNAMIC_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\bimport\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("dynamic import pattern"));

static REQUIRE_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\brequire\s*\(\s*['"]([^'"]+)['"]\s*\)"#).expect("require pattern"));

static COMMONJS_EXPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)\bmodule\.exports\b|^\s*exports\.\w+\s*=").expect("commonjs export pattern"));

static ES_EXPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*export\s").expect("export pattern"));

static ROOT_RENDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:ReactDOM\.render|ReactDOM\.createRoot|ReactDOM\.hydrateRoot|createRoot|hydrateRoot)\s*\(")
        .expect("root render pattern")
});

static REACT_DOM_CLIENT_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*import\s+[^;]*['"]react-dom(?:/client)?['"];?\s*$"#).expect("react-dom import pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationMode {
    Full,
    /// Syntax plus structure and sandbox safety
    Fast,
    SyntaxOnly,
    FormatOnly,
}

impl ValidationMode {
    fn checks_syntax(self) -> bool {
        matches!(self, Self::Full | Self::Fast | Self::SyntaxOnly)
    }

    fn checks_basics(self) -> bool {
        matches!(self, Self::Full | Self::Fast)
    }

    fn checks_format(self) -> bool {
        matches!(self, Self::Full | Self::FormatOnly)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No errors in the code as submitted
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Mechanical fixes applied to `code`
    pub fixes: Vec<String>,
    /// Corrected code (identical to the input when nothing was fixed)
    pub code: String,
    pub auto_fixed: bool,
}

impl ValidationResult {
    /// One-line description of the first few errors
    pub fn error_summary(&self) -> String {
        self.errors.iter().take(3).cloned().collect::<Vec<_>>().join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct Validator {
    deny_list: Vec<String>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_DENY_LIST.iter().map(|s| s.to_string()).collect())
    }
}

impl Validator {
    pub fn new(deny_list: Vec<String>) -> Self {
        Self { deny_list }
    }

    pub fn deny_list(&self) -> &[String] {
        &self.deny_list
    }

    pub fn is_denied(&self, package: &str) -> bool {
        self.deny_list.iter().any(|denied| denied == package)
    }

    /// Validate one file and apply mechanical fixes where possible
    pub fn validate(&self, code: &str, filename: &str, mode: ValidationMode) -> ValidationResult {
        let mut result = ValidationResult {
            code: code.to_string(),
            ..Default::default()
        };

        if mode.checks_syntax() {
            result.errors.extend(check_balance(code));
        }

        if mode.checks_basics() {
            self.check_structure(code, filename, &mut result);
            self.check_safety(&mut result);
        }

        if mode.checks_format() {
            check_format(&mut result);
        }

        result.valid = result.errors.is_empty();
        result.auto_fixed = result.code != code;
        result
    }

    /// Full validation; when fixes were applied, the corrected code is
    /// validated again and that verdict is returned.
    pub fn validate_with_repair(&self, code: &str, filename: &str) -> ValidationResult {
        let first = self.validate(code, filename, ValidationMode::Full);
        if first.valid || !first.auto_fixed {
            return first;
        }

        let mut second = self.validate(&first.code, filename, ValidationMode::Full);
        let mut fixes = first.fixes;
        fixes.append(&mut second.fixes);
        second.fixes = fixes;
        second.auto_fixed = true;
        log::debug!(
            "{}: auto-fix {} ({} error(s) remain)",
            filename,
            if second.valid { "repaired the file" } else { "was not enough" },
            second.errors.len()
        );
        second
    }

    /// Deny-list and root-render checks only
    pub fn validate_runtime_safety(&self, code: &str) -> ValidationResult {
        let mut result = ValidationResult {
            code: code.to_string(),
            ..Default::default()
        };
        self.check_safety(&mut result);
        result.valid = result.errors.is_empty();
        result.auto_fixed = result.code != code;
        result
    }

    /// Deny-listed packages imported or required by `code`
    pub fn banned_imports(&self, code: &str) -> Vec<String> {
        let mut banned: Vec<String> = Vec::new();
        for package in imported_modules(code).iter().map(|specifier| package_name(specifier)) {
            if self.is_denied(&package) && !banned.contains(&package) {
                banned.push(package);
            }
        }
        banned
    }

    fn check_structure(&self, code: &str, filename: &str, result: &mut ValidationResult) {
        if REQUIRE_CALL.is_match(code) || COMMONJS_EXPORT.is_match(code) {
            result
                .errors
                .push("CommonJS require/module.exports is not supported; use ES module import/export".to_string());
        }

        let is_module = [".js", ".jsx", ".ts", ".tsx"].iter().any(|ext| filename.ends_with(ext));
        if is_module && !ES_EXPORT.is_match(code) {
            result.warnings.push(format!("{} has no export statement", filename));
        }
    }

    fn check_safety(&self, result: &mut ValidationResult) {
        for package in self.banned_imports(&result.code) {
            result.errors.push(format!(
                "Banned package '{}' is not supported in the browser sandbox",
                package
            ));
            let stripped = strip_module_references(&result.code, &package);
            if stripped != result.code {
                result.code = stripped;
                result.fixes.push(format!("Removed import of '{}'", package));
            }
        }

        if ROOT_RENDER.is_match(&result.code) {
            result.errors.push(
                "Direct root render call (ReactDOM.render/createRoot) conflicts with the host renderer".to_string(),
            );
            let stripped = strip_lines(&result.code, |line| {
                let trimmed = line.trim();
                (ROOT_RENDER.is_match(trimmed) && check_balance(trimmed).is_empty())
                    || REACT_DOM_CLIENT_IMPORT.is_match(line)
            });
            if stripped != result.code {
                result.code = stripped;
                result.fixes.push("Removed root render call".to_string());
            }
        }
    }
}

fn strip_lines(code: &str, remove: impl Fn(&str) -> bool) -> String {
    let trailing_newline = code.ends_with('\n');
    let mut out = code
        .lines()
        .filter(|line| !remove(line))
        .collect::<Vec<_>>()
        .join("\n");
    if trailing_newline && !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Drop every reference to `package`: static import/re-export statements are cut
/// out of their line, lines holding a `require` or dynamic `import()` of it go whole
fn strip_module_references(code: &str, package: &str) -> String {
    const CUT: char = '\u{0}';

    let mut marked = String::with_capacity(code.len());
    let mut last = 0;
    for caps in STATIC_IMPORT.captures_iter(code) {
        let Some(statement) = caps.get(0) else { continue };
        if package_name(&caps[1]) != package {
            continue;
        }
        marked.push_str(&code[last..statement.start()]);
        marked.push(CUT);
        last = statement.end();
    }
    marked.push_str(&code[last..]);

    let mut stripped = marked
        .lines()
        .filter(|line| {
            let emptied = line.contains(CUT) && line.chars().all(|c| c == CUT || c.is_whitespace());
            let dynamic = REQUIRE_CALL
                .captures_iter(line)
                .chain(DYNAMIC_IMPORT.captures_iter(line))
                .any(|caps| package_name(&caps[1]) == package);
            !emptied && !dynamic
        })
        .map(|line| {
            if !line.contains(CUT) {
                return line.to_string();
            }
            let indent = &line[..line.len() - line.trim_start().len()];
            format!("{}{}", indent, line.replace(CUT, "").trim())
        })
        .collect::<Vec<_>>()
        .join("\n");
    if code.ends_with('\n') && !stripped.is_empty() {
        stripped.push('\n');
    }
    stripped
}

/// Module specifiers from static imports, re-exports, dynamic `import()` and `require(...)`
pub(crate) fn imported_modules(code: &str) -> Vec<String> {
    STATIC_IMPORT
        .captures_iter(code)
        .chain(DYNAMIC_IMPORT.captures_iter(code))
        .chain(REQUIRE_CALL.captures_iter(code))
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Package name of a module specifier: `node:fs` -> `fs`, `@a/b/c` -> `@a/b`
pub(crate) fn package_name(specifier: &str) -> String {
    let specifier = specifier.strip_prefix("node:").unwrap_or(specifier);
    let mut parts = specifier.split('/');
    match (parts.next(), parts.next()) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{}/{}", scope, name),
        (Some(first), _) => first.to_string(),
        _ => specifier.to_string(),
    }
}

fn check_format(result: &mut ValidationResult) {
    if result.code.contains("\r\n") {
        result.code = result.code.replace("\r\n", "\n");
        result.fixes.push("Normalized CRLF line endings".to_string());
    }

    if result.code.lines().any(|line| line != line.trim_end()) {
        let trailing_newline = result.code.ends_with('\n');
        let mut trimmed = result.code.lines().map(str::trim_end).collect::<Vec<_>>().join("\n");
        if trailing_newline {
            trimmed.push('\n');
        }
        result.code = trimmed;
        result.fixes.push("Removed trailing whitespace".to_string());
    }

    let tab_indented = result.code.lines().any(|line| line.starts_with('\t'));
    let space_indented = result.code.lines().any(|line| line.starts_with("  "));
    if tab_indented && space_indented {
        result.warnings.push("Mixed tab and space indentation".to_string());
    }
}

#[derive(Clone, Copy, PartialEq)]
enum ScanState {
    Code,
    LineComment,
    BlockComment,
    Str(char),
    Template,
    /// `/.../` literal; the flag is set inside a `[...]` class
    Regex(bool),
}

/// Characters after which a `/` starts a regex literal rather than a division
fn starts_regex_after(c: char) -> bool {
    matches!(c, '\0' | '=' | '(' | ',' | ':' | '[' | '!' | '&' | '|' | '?' | '{' | ';')
}

/// Check `{}` / `[]` / `()` balance, skipping strings, templates and comments
pub(crate) fn check_balance(code: &str) -> Vec<String> {
    const MAX_ERRORS: usize = 5;

    // '$' marks an open `${` template expression
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut errors = Vec::new();
    let mut state = ScanState::Code;
    let mut line = 1usize;
    let mut prev = '\0';
    let mut last_significant = '\0';
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }

        match state {
            ScanState::Code => match c {
                '/' if chars.peek() == Some(&'/') => {
                    chars.next();
                    state = ScanState::LineComment;
                }
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = ScanState::BlockComment;
                }
                '/' if starts_regex_after(last_significant) => state = ScanState::Regex(false),
                '\'' if prev.is_alphanumeric() => {}
                '"' | '\'' => state = ScanState::Str(c),
                '`' => state = ScanState::Template,
                '{' | '[' | '(' => stack.push((c, line)),
                '}' | ']' | ')' => {
                    let opener = match c {
                        '}' => '{',
                        ']' => '[',
                        _ => '(',
                    };
                    match stack.last().copied() {
                        Some((open, _)) if open == opener => {
                            stack.pop();
                        }
                        Some(('$', _)) if c == '}' => {
                            stack.pop();
                            state = ScanState::Template;
                        }
                        Some((open, open_line)) => {
                            errors.push(format!(
                                "Mismatched '{}' at line {} (expected closing for '{}' from line {})",
                                c, line, open, open_line
                            ));
                            stack.pop();
                        }
                        None => errors.push(format!("Unexpected '{}' at line {}", c, line)),
                    }
                }
                _ => {}
            },
            ScanState::LineComment => {
                if c == '\n' {
                    state = ScanState::Code;
                }
            }
            ScanState::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = ScanState::Code;
                }
            }
            ScanState::Str(quote) => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                '\n' => state = ScanState::Code,
                _ if c == quote => state = ScanState::Code,
                _ => {}
            },
            ScanState::Template => match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                '`' => state = ScanState::Code,
                '$' if chars.peek() == Some(&'{') => {
                    chars.next();
                    stack.push(('$', line));
                    state = ScanState::Code;
                }
                _ => {}
            },
            ScanState::Regex(in_class) => match c {
                '\\' => {
                    chars.next();
                }
                '\n' => state = ScanState::Code,
                '[' => state = ScanState::Regex(true),
                ']' if in_class => state = ScanState::Regex(false),
                '/' if !in_class => state = ScanState::Code,
                _ => {}
            },
        }

        if state == ScanState::Code && !c.is_whitespace() {
            last_significant = c;
        }
        prev = c;
        if errors.len() >= MAX_ERRORS {
            return errors;
        }
    }

    if state == ScanState::Template {
        errors.push("Unterminated template literal".to_string());
    }
    if state == ScanState::BlockComment {
        errors.push("Unterminated block comment".to_string());
    }
    for (open, open_line) in stack.into_iter().rev().take(MAX_ERRORS) {
        let open = if open == '$' { "${".to_string() } else { open.to_string() };
        errors.push(format!("Unclosed '{}' opened at line {}", open, open_line));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "import React, { useState } from 'react';\n\nexport default function App() {\n  const [items] = useState([]);\n  return <p>Don't panic: {items.length} {`total ${items.length}`}</p>;\n}\n";

    #[test]
    fn test_valid_component() {
        let result = Validator::default().validate(GOOD, "App.jsx", ValidationMode::Full);
        assert!(result.valid, "{:?}", result.errors);
        assert!(!result.auto_fixed);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_balance_ignores_strings_and_comments() {
        assert!(check_balance("const a = '{'; // }\n/* ( */ const b = \"[\";").is_empty());
        assert_eq!(check_balance("function f() {\n  return [1, 2;\n}").len(), 2);
        assert_eq!(check_balance("}"), vec!["Unexpected '}' at line 1".to_string()]);
        assert!(check_balance("const s = `a ${`b ${c}`} d`;").is_empty());
    }

    #[test]
    fn test_banned_package_property() {
        let validator = Validator::default();
        for package in DEFAULT_DENY_LIST {
            let code = format!("import thing from '{}';\nexport default thing;\n", package);
            let result = validator.validate_runtime_safety(&code);
            assert!(!result.valid);
            assert!(result.errors.iter().any(|e| e.contains(&format!("'{}'", package))));
            assert!(!result.code.contains(&format!("'{}'", package)));
        }

        let scoped = validator.validate_runtime_safety("import { readFile } from 'node:fs';\n");
        assert!(!scoped.valid);
        assert!(scoped.errors[0].contains("'fs'"));
    }

    #[test]
    fn test_banned_import_sharing_a_line_is_cut_out() {
        let validator = Validator::default();
        let code = "import React from 'react'; import fs from 'fs';\nexport default function App() { return null; }\n";
        let result = validator.validate_runtime_safety(code);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("'fs'"));
        assert_eq!(
            result.code,
            "import React from 'react';\nexport default function App() { return null; }\n"
        );

        let leading = validator.validate_runtime_safety("  import fs from 'fs'; const x = 1;\n");
        assert_eq!(leading.code, "  const x = 1;\n");
    }

    #[test]
    fn test_minified_and_indirect_imports_are_caught() {
        let validator = Validator::default();
        for code in [
            "import fs from\"fs\";",
            "import{readFile}from'fs';",
            "export { readFile } from 'fs';\n",
            "export * from\"fs\";",
            "const load = () => import('fs');\n",
        ] {
            let result = validator.validate_runtime_safety(code);
            assert!(!result.valid, "accepted: {}", code);
            assert!(result.errors[0].contains("'fs'"), "{:?}", result.errors);
            assert!(!result.code.contains("fs'") && !result.code.contains("fs\""), "left in: {:?}", result.code);
        }
    }

    #[test]
    fn test_balance_skips_regex_literals() {
        assert!(check_balance("const re = /[(]/;").is_empty());
        assert!(check_balance("if (/\\{+/.test(s)) { f(s.split(/[)\\]]/)); }").is_empty());
        assert!(check_balance("const half = (a + b) / 2;\nconst x = [a / b];").is_empty());
        assert!(check_balance("<p>{done} / {total}</p>").is_empty());
        assert_eq!(check_balance("const re = /x/; f(").len(), 1);
    }

    #[test]
    fn test_root_render_is_stripped_then_repaired() {
        let code = "import { createRoot } from 'react-dom/client';\nexport default function App() { return null; }\ncreateRoot(document.getElementById('root')).render(<App />);\n";
        let validator = Validator::default();

        let first = validator.validate(code, "App.jsx", ValidationMode::Fast);
        assert!(!first.valid);
        assert!(first.auto_fixed);
        assert!(!first.code.contains("createRoot"));

        let repaired = validator.validate_with_repair(code, "App.jsx");
        assert!(repaired.valid);
        assert!(repaired.auto_fixed);
        assert_eq!(repaired.fixes, vec!["Removed root render call".to_string()]);
    }

    #[test]
    fn test_commonjs_and_missing_export() {
        let result = Validator::default().validate("const fs = require('fs');\n", "util.js", ValidationMode::Fast);
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.contains("CommonJS")));
        assert!(result.errors.iter().any(|e| e.contains("'fs'")));
        assert_eq!(result.warnings, vec!["util.js has no export statement".to_string()]);
    }

    #[test]
    fn test_format_fixes() {
        let result = Validator::default().validate(
            "export const a = 1;  \r\n\tconst b = 2;\r\n  const c = 3;\r\n",
            "a.js",
            ValidationMode::FormatOnly,
        );
        assert!(result.valid);
        assert_eq!(result.code, "export const a = 1;\n\tconst b = 2;\n  const c = 3;\n");
        assert_eq!(result.fixes.len(), 2);
        assert_eq!(result.warnings, vec!["Mixed tab and space indentation".to_string()]);
    }

    #[test]
    fn test_never_panics_on_garbage() {
        let validator = Validator::default();
        for input in ["", "`", "/*", "'", "${", "import from", "\u{1F600}{[(", "\\"] {
            let first = validator.validate(input, "x.jsx", ValidationMode::Full);
            let second = validator.validate(input, "x.jsx", ValidationMode::Full);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_package_name() {
        assert_eq!(package_name("@mui/material/Button"), "@mui/material");
        assert_eq!(package_name("node:child_process"), "child_process");
        assert_eq!(package_name("react-dom/client"), "react-dom");
    }
}
