// Shared test doubles for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use vibe_forge_lib::llm::{LanguageModel, ModelRequest};
use vibe_forge_lib::FileMap;

/// Which agent a request came from, read off the role prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Planner,
    Analyzer,
    CodeWriter,
    Designer,
    Debugger,
    Summarizer,
    Unknown,
}

impl Role {
    pub fn of(request: &ModelRequest) -> Self {
        let system = request.system_prompt.as_str();
        if system.starts_with("You are the Planner agent") {
            Role::Planner
        } else if system.starts_with("You are the Analyzer agent") {
            Role::Analyzer
        } else if system.starts_with("You are the Code Writer agent") {
            Role::CodeWriter
        } else if system.starts_with("You are the UX Designer agent") {
            Role::Designer
        } else if system.starts_with("You are the Debugger agent") {
            Role::Debugger
        } else if system.starts_with("Summarize this coding session") {
            Role::Summarizer
        } else {
            Role::Unknown
        }
    }
}

/// Answers from per-role queues and records every request.
/// The last queued answer for a role is repeated once the queue drains.
#[derive(Default)]
pub struct ScriptedModel {
    /// (role, text the user prompt must contain, answer), checked first
    keyed: Mutex<Vec<(Role, String, String)>>,
    scripts: Mutex<HashMap<Role, VecDeque<String>>>,
    calls: Mutex<Vec<(Role, ModelRequest)>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, role: Role, answer: impl Into<String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(answer.into());
        self
    }

    /// Answer `role` with `answer` whenever its user prompt contains `needle`
    pub fn respond_when(self, role: Role, needle: &str, answer: impl Into<String>) -> Self {
        self.keyed
            .lock()
            .unwrap()
            .push((role, needle.to_string(), answer.into()));
        self
    }

    pub fn calls(&self) -> Vec<(Role, ModelRequest)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.calls().into_iter().map(|(role, _)| role).collect()
    }

    pub fn count(&self, role: Role) -> usize {
        self.roles().into_iter().filter(|r| *r == role).count()
    }

    pub fn prompts_for(&self, role: Role) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| *r == role)
            .map(|(_, request)| request.user_prompt)
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn call(&self, request: ModelRequest) -> anyhow::Result<String> {
        let role = Role::of(&request);
        let keyed = self
            .keyed
            .lock()
            .unwrap()
            .iter()
            .find(|(r, needle, _)| *r == role && request.user_prompt.contains(needle.as_str()))
            .map(|(_, _, answer)| answer.clone());
        self.calls.lock().unwrap().push((role, request));
        if let Some(answer) = keyed {
            return Ok(answer);
        }

        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&role)
            .ok_or_else(|| anyhow::anyhow!("no scripted answer for {:?}", role))?;
        let answer = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        answer.ok_or_else(|| anyhow::anyhow!("no scripted answer for {:?}", role))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn fenced(code: &str) -> String {
    format!("Here you go:\n```jsx\n{}\n```", code)
}

pub const GOOD_PLAN: &str = r#"{
  "app": {"name": "Todo", "tagline": "Track what matters"},
  "files": ["App.jsx", "components/TodoList.jsx"],
  "fileDetails": {
    "App.jsx": "Root component holding the todo state",
    "components/TodoList.jsx": "Renders the list with toggles"
  },
  "layout": "Single column, centered card",
  "packages": []
}"#;

/// Passes only the file-list, file-count and file-details checks
pub const WEAK_PLAN: &str = r#"{"files": ["App.jsx"], "fileDetails": {"App.jsx": "everything"}}"#;

pub const DESIGN: &str = r##"{
  "colorScheme": {"primary": "#4f46e5", "background": "#ffffff"},
  "designStyle": {"aesthetic": "minimal", "corners": "rounded", "shadows": "soft"},
  "interactions": ["hover lift on cards"],
  "layout": {"structure": "single column", "spacing": "8px grid", "typography": "Inter"}
}"##;

pub const APP: &str = r#"import { useState } from 'react';
import TodoList from './components/TodoList';

export default function App() {
  const [todos, setTodos] = useState([]);
  return <TodoList todos={todos} onToggle={setTodos} />;
}"#;

pub const TODO_LIST: &str = r#"export default function TodoList({ todos, onToggle }) {
  return <ul>{todos.map((t) => <li key={t.id}>{t.text}</li>)}</ul>;
}"#;

pub fn counter_files() -> FileMap {
    let mut files = FileMap::new();
    files.insert(
        "App.jsx".to_string(),
        "import { useState } from 'react';\n\nexport default function App() {\n  const [count, setCount] = useState(0);\n  return <button onClick={() => setCount(count + 1)}>{count}</button>;\n}\n"
            .to_string(),
    );
    files
}

pub fn analysis_for(file: &str, reason: &str) -> String {
    serde_json::json!({
        "summary": "Counter app with a single component",
        "filesToModify": [file],
        "changes": {
            file: [{"pattern": "", "replacement": "", "reason": reason}]
        }
    })
    .to_string()
}
