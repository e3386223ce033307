// Vibe-Forge: Codebase Map
// Deterministic structural outline of a file set, injected into agent prompts.

use crate::agents::FileMap;
use crate::studio_core::validator::imported_modules;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static EXPORT_NAMED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+(?:default\s+)?(?:async\s+)?(?:function\*?|const|let|class)\s+([A-Za-z_$][\w$]*)")
        .expect("named export pattern")
});

static EXPORT_DEFAULT_IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$").expect("default export pattern")
});

static COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:function\s+([A-Z][\w$]*)\s*\(|const\s+([A-Z][\w$]*)\s*=\s*(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*=>)")
        .expect("component pattern")
});

static HOOK_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(use[A-Z][\w$]*)\s*\(").expect("hook call pattern"));

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub components: Vec<String>,
    pub hooks: Vec<String>,
    pub lines: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseMap {
    pub files: BTreeMap<String, FileSummary>,
}

fn unique(mut items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
    items
}

impl CodebaseMap {
    pub fn build(files: &FileMap) -> Self {
        let files = files
            .iter()
            .map(|(name, content)| (name.clone(), summarize(content)))
            .collect();
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Compact text form, one block per file
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, summary) in &self.files {
            out.push_str(&format!("{} ({} lines)\n", name, summary.lines));
            if !summary.imports.is_empty() {
                out.push_str(&format!("  imports: {}\n", summary.imports.join(", ")));
            }
            if !summary.exports.is_empty() {
                out.push_str(&format!("  exports: {}\n", summary.exports.join(", ")));
            }
            if !summary.components.is_empty() {
                out.push_str(&format!("  components: {}\n", summary.components.join(", ")));
            }
            if !summary.hooks.is_empty() {
                out.push_str(&format!("  hooks: {}\n", summary.hooks.join(", ")));
            }
        }
        out
    }
}

fn summarize(content: &str) -> FileSummary {
    let exports = EXPORT_NAMED
        .captures_iter(content)
        .chain(EXPORT_DEFAULT_IDENT.captures_iter(content))
        .map(|caps| caps[1].to_string())
        .collect();

    let components = COMPONENT
        .captures_iter(content)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string()))
        .collect();

    let hooks = HOOK_CALL
        .captures_iter(content)
        .map(|caps| caps[1].to_string())
        .collect();

    FileSummary {
        imports: unique(imported_modules(content)),
        exports: unique(exports),
        components: unique(components),
        hooks: unique(hooks),
        lines: content.lines().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_summarizes_structure() {
        let mut files = FileMap::new();
        files.insert(
            "App.jsx".to_string(),
            "import React, { useState, useEffect } from 'react';\nimport TodoList from './TodoList';\n\nconst Header = () => <h1>Todos</h1>;\n\nexport default function App() {\n  const [todos, setTodos] = useState([]);\n  useEffect(() => {}, []);\n  return <TodoList todos={todos} />;\n}\n"
                .to_string(),
        );

        let map = CodebaseMap::build(&files);
        let app = &map.files["App.jsx"];
        assert_eq!(app.imports, vec!["react".to_string(), "./TodoList".to_string()]);
        assert_eq!(app.exports, vec!["App".to_string()]);
        assert_eq!(app.components, vec!["Header".to_string(), "App".to_string()]);
        assert_eq!(app.hooks, vec!["useState".to_string(), "useEffect".to_string()]);
        assert_eq!(app.lines, 10);

        let rendered = map.render();
        assert!(rendered.starts_with("App.jsx (10 lines)\n"));
        assert!(rendered.contains("hooks: useState, useEffect"));
    }
}
