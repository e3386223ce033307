// Vibe-Forge: Prompt Engineering System
// Role prompts, templates with variable substitution, context injection and
// helpers for pulling structured output back out of model text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

static TEMPLATE_VAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("template variable pattern"));

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:[A-Za-z0-9_+-]+)?[ \t]*\r?\n([\s\S]*?)\r?\n?```").expect("code fence pattern")
});

/// Prompt template with `{{var}}` substitution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub template: String,
    pub required_vars: Vec<String>,
}

impl PromptTemplate {
    pub fn new(name: &str, template: &str) -> Self {
        let mut required_vars: Vec<String> = Vec::new();
        for caps in TEMPLATE_VAR.captures_iter(template) {
            let var = caps[1].to_string();
            if !required_vars.contains(&var) {
                required_vars.push(var);
            }
        }

        Self {
            name: name.to_string(),
            template: template.to_string(),
            required_vars,
        }
    }

    /// Render the template with provided variables
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String, String> {
        let mut result = self.template.clone();

        for var in &self.required_vars {
            let placeholder = format!("{{{{{}}}}}", var);
            let value = vars.get(var)
                .ok_or_else(|| format!("Template '{}' missing required variable: {}", self.name, var))?;
            result = result.replace(&placeholder, value);
        }

        Ok(result)
    }
}

/// Memory-derived context appended to every agent's system prompt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    /// Persistent rules, injected verbatim
    pub rules: Option<String>,
    /// Rendered bug patterns used as few-shot examples
    pub learned_fixes: Vec<String>,
    pub codebase_map: Option<String>,
    /// Compressed conversation (summaries + recent turns)
    pub conversation: Option<String>,
    pub constraints: Vec<String>,
    pub custom_vars: HashMap<String, String>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(mut self, rules: &str) -> Self {
        if !rules.trim().is_empty() {
            self.rules = Some(rules.to_string());
        }
        self
    }

    pub fn with_codebase_map(mut self, map: &str) -> Self {
        if !map.trim().is_empty() {
            self.codebase_map = Some(map.to_string());
        }
        self
    }

    pub fn with_conversation(mut self, conversation: &str) -> Self {
        if !conversation.trim().is_empty() {
            self.conversation = Some(conversation.to_string());
        }
        self
    }

    pub fn with_learned_fix(mut self, fix: String) -> Self {
        self.learned_fixes.push(fix);
        self
    }

    pub fn with_constraint(mut self, constraint: &str) -> Self {
        self.constraints.push(constraint.to_string());
        self
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.custom_vars.insert(key.to_string(), value.to_string());
        self
    }

    /// Append the context sections to a role prompt
    pub fn render_system(&self, base: &str) -> String {
        let mut prompt = base.to_string();

        if let Some(rules) = &self.rules {
            prompt.push_str("\n\n## Project Rules\n\n");
            prompt.push_str(rules);
        }

        if !self.constraints.is_empty() {
            prompt.push_str("\n\n## Constraints\n");
            for constraint in &self.constraints {
                prompt.push_str(&format!("- {}\n", constraint));
            }
        }

        if !self.learned_fixes.is_empty() {
            prompt.push_str("\n\n## Previously Successful Fixes\n");
            for fix in &self.learned_fixes {
                prompt.push_str(&format!("- {}\n", fix));
            }
        }

        if let Some(map) = &self.codebase_map {
            prompt.push_str("\n\n## Codebase Map\n\n");
            prompt.push_str(map);
        }

        if let Some(conversation) = &self.conversation {
            prompt.push_str("\n\n## Conversation Context\n\n");
            prompt.push_str(conversation);
        }

        prompt
    }

    /// Variables for template rendering
    pub fn to_vars(&self) -> HashMap<String, String> {
        let mut vars = self.custom_vars.clone();
        if !self.constraints.is_empty() {
            vars.insert("constraints".to_string(), self.constraints.join("\n- "));
        }
        vars
    }
}

/// Role prompts for all agents
pub struct SystemPrompts;

impl SystemPrompts {
    pub fn planner() -> &'static str {
        r#"You are the Planner agent of a browser-based app studio.
You turn a user's description into a build plan for a small React application
that runs in an in-browser sandbox (ES modules, no bundler, no server).

Rules:
- Keep the app small: between 1 and 19 files, entry file App.jsx.
- Only use packages that run in the browser sandbox.
- Every file you list must have a detailed specification.

Respond with JSON only:
{
  "app": {"name": "...", "tagline": "..."},
  "files": ["App.jsx", "components/TodoList.jsx"],
  "fileDetails": {"App.jsx": "what this file contains and does"},
  "layout": "layout and UX approach",
  "packages": ["lucide-react"]
}"#
    }

    pub fn analyzer() -> &'static str {
        r#"You are the Analyzer agent of a browser-based app studio.
You read an existing React code base and locate exactly what must change.

Respond with JSON only:
{
  "summary": "one paragraph about the current code",
  "filesToModify": ["App.jsx"],
  "changes": {
    "App.jsx": [
      {"pattern": "exact existing snippet", "replacement": "new snippet", "reason": "why"}
    ]
  },
  "explanation": "free text, only when asked to explain"
}"#
    }

    pub fn code_writer_generate() -> &'static str {
        r#"You are the Code Writer agent of a browser-based app studio.
Write one complete file of a React application.

Rules:
- Use ES module imports and a default export.
- Use function components and hooks; never use `var`.
- Do not call ReactDOM.render or createRoot; the host mounts App.
- Do not import Node.js modules or server frameworks.

Return only the file content inside a single fenced code block."#
    }

    pub fn code_writer_modify() -> &'static str {
        r#"You are the Code Writer agent of a browser-based app studio.
Apply the requested changes to an existing file and keep everything else intact.

Rules:
- Preserve unrelated code, imports and exports.
- Never use `var`; never call ReactDOM.render or createRoot.

Return the complete updated file inside a single fenced code block."#
    }

    pub fn designer() -> &'static str {
        r##"You are the UX Designer agent of a browser-based app studio.
Create a coherent design system for the application.

Respond with JSON only:
{
  "colorScheme": {"primary": "#...", "secondary": "#...", "background": "#...", "surface": "#...", "text": "#...", "accent": "#..."},
  "designStyle": {"aesthetic": "...", "corners": "...", "shadows": "..."},
  "interactions": ["hover lift on cards", "..."],
  "layout": {"structure": "...", "spacing": "...", "typography": "..."}
}"##
    }

    pub fn designer_extract() -> &'static str {
        r#"You are the UX Designer agent of a browser-based app studio.
Infer the design system already used by the code you are given, so new code stays consistent.
Respond with the same JSON shape you use for new designs."#
    }

    pub fn debugger() -> &'static str {
        r#"You are the Debugger agent of a browser-based app studio.
You receive a categorized runtime error, the file it occurred in, static scan findings and
fixes that worked before. Fix the root cause with the smallest correct change.

Return the complete corrected file inside a single fenced code block."#
    }

    pub fn summarizer() -> &'static str {
        r#"Summarize this coding session factually in at most 2000 characters.
Cover: what the user requested, what was implemented, key decisions,
errors encountered and how they were fixed, and sensible next steps.
Plain text, no preamble."#
    }
}

/// Extract JSON from a response that might be wrapped in markdown code blocks
pub fn extract_json(response: &str) -> String {
    if let Some(start) = response.find("```json") {
        let json_start = start + "```json".len();
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    if let Some(caps) = CODE_FENCE.captures(response) {
        let inner = caps[1].trim();
        if inner.starts_with('{') || inner.starts_with('[') {
            return inner.to_string();
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return response[start..=end].to_string();
        }
    }

    response.trim().to_string()
}

/// Extract the largest fenced code block, or the raw text when there is none
pub fn extract_code_block(response: &str) -> String {
    CODE_FENCE
        .captures_iter(response)
        .map(|caps| caps[1].to_string())
        .max_by_key(|block| block.len())
        .unwrap_or_else(|| response.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_render_and_missing_var() {
        let template = PromptTemplate::new("t", "Build {{name}} for {{name}} using {{stack}}");
        assert_eq!(template.required_vars, vec!["name".to_string(), "stack".to_string()]);

        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "todo".to_string());
        assert!(template.render(&vars).is_err());

        vars.insert("stack".to_string(), "react".to_string());
        assert_eq!(template.render(&vars).unwrap(), "Build todo for todo using react");
    }

    #[test]
    fn test_extract_json_variants() {
        assert_eq!(extract_json("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json("Here you go: {\"a\": 1} thanks"), "{\"a\": 1}");
        assert_eq!(extract_json("```\n{\"b\": 2}\n```"), "{\"b\": 2}");
    }

    #[test]
    fn test_extract_code_block_prefers_largest() {
        let text = "Intro\n```js\nconst a = 1;\n```\nand\n```jsx\nexport default function App() {\n  return null;\n}\n```";
        let code = extract_code_block(text);
        assert!(code.starts_with("export default function App()"));
        assert_eq!(extract_code_block("plain text"), "plain text");
    }

    #[test]
    fn test_render_system_sections() {
        let ctx = PromptContext::new()
            .with_rules("Use Tailwind classes")
            .with_learned_fix("NULL_ACCESS: guard list before map".to_string());
        let prompt = ctx.render_system("BASE");
        assert!(prompt.starts_with("BASE"));
        assert!(prompt.contains("## Project Rules\n\nUse Tailwind classes"));
        assert!(prompt.contains("guard list before map"));
        assert!(!prompt.contains("Codebase Map"));
    }

    #[test]
    fn test_designer_prompt_keeps_hex_placeholders() {
        let prompt = SystemPrompts::designer();
        assert!(prompt.contains(r##""primary": "#...""##));
        assert!(prompt.contains("\"typography\": \"...\""));
        assert!(prompt.trim_end().ends_with('}'));
    }
}
