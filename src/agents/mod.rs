// Vibe-Forge: Agent System
// Specialized single-call agents plus the two orchestrators that sequence them.

pub mod analyzer;
pub mod code_orchestrator;
pub mod code_writer;
pub mod debugger;
pub mod designer;
pub mod plan_orchestrator;
pub mod planner;
pub mod studio;

// Re-exports
pub use analyzer::Analyzer;
pub use code_orchestrator::{CodeMode, CodeOrchestrator, CodeOutcome, CodeRequest, FileFailure, MAX_DEBUG_ATTEMPTS};
pub use code_writer::{CodeWriter, ModifyRequest};
pub use debugger::{AttemptRecord, DebugOutcome, Debugger, Diagnosis, ErrorCategory, ErrorSignature, ScanFinding};
pub use designer::Designer;
pub use plan_orchestrator::{PlanOrchestrator, PlanOutcome};
pub use planner::{PlanRequest, Planner};
pub use studio::{Studio, StudioBuilder, StudioError, StudioOutcome, StudioRequest};

use crate::llm::{extract_json, LanguageModel, ModelRequest, PromptContext};
use crate::memory::MemoryStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Snapshot of the artifact's files: filename -> content
pub type FileMap = BTreeMap<String, String>;

/// Base trait for all agents
pub trait Agent: Send + Sync {
    /// Get the agent's name
    fn name(&self) -> &str;

    /// Get the agent's system prompt
    fn system_prompt(&self) -> &str;
}

/// Errors an agent call can surface to its orchestrator
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{agent} model call failed: {message}")]
    Model { agent: String, message: String },

    #[error("{agent} timed out after {seconds}s")]
    Timeout { agent: String, seconds: u64 },

    #[error("{agent} returned a malformed response: {detail}")]
    MalformedResponse { agent: String, detail: String },

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Per-agent model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Overrides the provider's model when set
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }
}

impl AgentSettings {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// Run one model call for an agent, bounded by the agent's timeout
pub(crate) async fn call_model(
    agent: &str,
    model: &dyn LanguageModel,
    settings: &AgentSettings,
    system_prompt: String,
    user_prompt: String,
) -> Result<String, AgentError> {
    let request = ModelRequest::new(system_prompt, user_prompt)
        .with_model(settings.model.clone())
        .with_max_tokens(settings.max_tokens)
        .with_temperature(settings.temperature);

    let start = Instant::now();
    let outcome = tokio::time::timeout(settings.timeout, model.call(request)).await;

    match outcome {
        Err(_) => {
            log::warn!("{} timed out after {:?}", agent, settings.timeout);
            Err(AgentError::Timeout {
                agent: agent.to_string(),
                seconds: settings.timeout.as_secs(),
            })
        }
        Ok(Err(e)) => {
            log::warn!("{} model call failed: {}", agent, e);
            Err(AgentError::Model {
                agent: agent.to_string(),
                message: e.to_string(),
            })
        }
        Ok(Ok(text)) if text.trim().is_empty() => Err(AgentError::MalformedResponse {
            agent: agent.to_string(),
            detail: "empty response".to_string(),
        }),
        Ok(Ok(text)) => {
            log::debug!("{} answered {} chars in {:?}", agent, text.len(), start.elapsed());
            Ok(text)
        }
    }
}

/// Parse a structured-output contract out of model text
pub(crate) fn parse_structured<T: DeserializeOwned>(agent: &str, response: &str) -> Result<T, AgentError> {
    let json = extract_json(response);
    serde_json::from_str(&json).map_err(|e| AgentError::MalformedResponse {
        agent: agent.to_string(),
        detail: format!("{} (response starts with: {:.120})", e, response.trim()),
    })
}

/// Memory-derived context handed to every agent call
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub rules: String,
    pub bug_patterns: Vec<crate::memory::BugPattern>,
    pub codebase_map: Option<String>,
    pub conversation: Option<String>,
}

impl AgentContext {
    /// Load rules, codebase map, summaries and (optionally) category patterns
    pub fn load(memory: &MemoryStore, category: Option<ErrorCategory>) -> Self {
        let bug_patterns = match category {
            Some(category) => memory.patterns_for(category, 5),
            None => memory.recent_patterns(3),
        };

        Self {
            rules: memory.rules(),
            bug_patterns,
            codebase_map: memory.codebase_map(),
            conversation: memory.session_summary(),
        }
    }

    pub fn with_conversation(mut self, conversation: String) -> Self {
        if !conversation.trim().is_empty() {
            self.conversation = Some(conversation);
        }
        self
    }

    pub fn to_prompt_context(&self) -> PromptContext {
        let mut ctx = PromptContext::new().with_rules(&self.rules);
        for pattern in &self.bug_patterns {
            ctx = ctx.with_learned_fix(pattern.as_example());
        }
        if let Some(map) = &self.codebase_map {
            ctx = ctx.with_codebase_map(map);
        }
        if let Some(conversation) = &self.conversation {
            ctx = ctx.with_conversation(conversation);
        }
        ctx
    }
}

/// The five model-backed agents sharing one collaborator
#[derive(Clone)]
pub struct AgentSuite {
    pub planner: Arc<Planner>,
    pub analyzer: Arc<Analyzer>,
    pub code_writer: Arc<CodeWriter>,
    pub designer: Arc<Designer>,
    pub debugger: Arc<Debugger>,
}

impl AgentSuite {
    /// Every agent on the same model with role-appropriate temperatures
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        let base = AgentSettings::default().with_timeout(timeout);
        let code_writer = Arc::new(CodeWriter::new(
            model.clone(),
            base.clone().with_temperature(0.3).with_max_tokens(8192),
        ));

        Self {
            planner: Arc::new(Planner::new(model.clone(), base.clone().with_temperature(0.7))),
            analyzer: Arc::new(Analyzer::new(model.clone(), base.clone().with_temperature(0.2))),
            designer: Arc::new(Designer::new(model, base.with_temperature(0.8))),
            debugger: Arc::new(Debugger::new(code_writer.clone())),
            code_writer,
        }
    }

    /// Agents configured individually; the Debugger repairs through its own writer
    pub fn from_agents(
        planner: Planner,
        analyzer: Analyzer,
        code_writer: CodeWriter,
        designer: Designer,
        debug_writer: CodeWriter,
    ) -> Self {
        Self {
            planner: Arc::new(planner),
            analyzer: Arc::new(analyzer),
            code_writer: Arc::new(code_writer),
            designer: Arc::new(designer),
            debugger: Arc::new(Debugger::new(Arc::new(debug_writer))),
        }
    }
}

// ============================================================================
// Structured outputs
// ============================================================================

/// Accepts a JSON list of strings; anything else becomes `None`
fn lenient_string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    })
}

/// Accepts a JSON list, keeping only its string entries; any other shape is empty
fn lenient_file_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(lenient_string_items(Option::<serde_json::Value>::deserialize(d)?))
}

fn lenient_string_items(value: Option<serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Any value that does not have the expected shape becomes `None`
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let text: Option<String> = lenient(d)?;
    Ok(text.unwrap_or_default())
}

/// Per-file change lists; files whose list is mis-shaped are dropped
fn lenient_changes<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, Vec<ChangeTarget>>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    let Some(serde_json::Value::Object(files)) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(files
        .into_iter()
        .filter_map(|(file, targets)| serde_json::from_value(targets).ok().map(|targets| (file, targets)))
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppIdentity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tagline: String,
}

/// Build plan produced by the Planner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default, deserialize_with = "lenient")]
    pub app: Option<AppIdentity>,
    #[serde(default, deserialize_with = "lenient_file_list")]
    pub files: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub file_details: Option<BTreeMap<String, String>>,
    #[serde(default, alias = "uxApproach", deserialize_with = "lenient")]
    pub layout: Option<String>,
    #[serde(default, deserialize_with = "lenient_string_list")]
    pub packages: Option<Vec<String>>,
}

impl Plan {
    pub fn app_name(&self) -> &str {
        self.app.as_ref().map(|a| a.name.as_str()).unwrap_or("App")
    }

    /// Specification for one file, empty when the plan has none
    pub fn file_spec(&self, filename: &str) -> &str {
        self.file_details
            .as_ref()
            .and_then(|details| details.get(filename))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Short human-readable outline used in downstream prompts
    pub fn outline(&self) -> String {
        let mut out = String::new();
        if let Some(app) = &self.app {
            out.push_str(&format!("{} - {}\n", app.name, app.tagline));
        }
        for file in &self.files {
            out.push_str(&format!("- {}: {}\n", file, self.file_spec(file)));
        }
        if let Some(layout) = &self.layout {
            out.push_str(&format!("Layout: {}\n", layout));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    CreateNew,
    Modify,
    Refactor,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateNew => "CREATE_NEW",
            Intent::Modify => "MODIFY",
            Intent::Refactor => "REFACTOR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisMode {
    Modification,
    Debug,
    StyleExtract,
    Explain,
    Refactor,
}

impl AnalysisMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::Modification => "MODIFICATION",
            AnalysisMode::Debug => "DEBUG",
            AnalysisMode::StyleExtract => "STYLE_EXTRACT",
            AnalysisMode::Explain => "EXPLAIN",
            AnalysisMode::Refactor => "REFACTOR",
        }
    }
}

/// One (pattern, replacement, rationale) triple
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeTarget {
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub reason: String,
}

/// Output of the Analyzer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_file_list")]
    pub files_to_modify: Vec<String>,
    #[serde(default, deserialize_with = "lenient_changes")]
    pub changes: BTreeMap<String, Vec<ChangeTarget>>,
    #[serde(default, deserialize_with = "lenient")]
    pub explanation: Option<String>,
}

impl AnalysisResult {
    pub fn targets_for(&self, filename: &str) -> &[ChangeTarget] {
        self.changes.get(filename).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Compact rendering for planner prompts
    pub fn render(&self) -> String {
        let mut out = format!("{}\n", self.summary);
        for file in &self.files_to_modify {
            out.push_str(&format!("- {}\n", file));
            for target in self.targets_for(file) {
                out.push_str(&format!("  * {}\n", target.reason));
            }
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignStyle {
    #[serde(default)]
    pub aesthetic: String,
    #[serde(default)]
    pub corners: String,
    #[serde(default)]
    pub shadows: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutRules {
    #[serde(default)]
    pub structure: String,
    #[serde(default)]
    pub spacing: String,
    #[serde(default)]
    pub typography: String,
}

/// Design system produced or extracted by the Designer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UxDesign {
    #[serde(default)]
    pub color_scheme: BTreeMap<String, String>,
    #[serde(default)]
    pub design_style: DesignStyle,
    #[serde(default)]
    pub interactions: Vec<String>,
    #[serde(default)]
    pub layout: LayoutRules,
}

impl UxDesign {
    pub fn is_empty(&self) -> bool {
        self.color_scheme.is_empty() && self.design_style == DesignStyle::default()
    }

    /// Rendering used as Code Writer context
    pub fn to_prompt(&self) -> String {
        let mut out = String::from("Colors:\n");
        for (role, value) in &self.color_scheme {
            out.push_str(&format!("- {}: {}\n", role, value));
        }
        out.push_str(&format!(
            "Style: {} (corners: {}, shadows: {})\n",
            self.design_style.aesthetic, self.design_style.corners, self.design_style.shadows
        ));
        if !self.interactions.is_empty() {
            out.push_str(&format!("Interactions: {}\n", self.interactions.join("; ")));
        }
        out.push_str(&format!(
            "Layout: {} | spacing: {} | typography: {}\n",
            self.layout.structure, self.layout.spacing, self.layout.typography
        ));
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Modify,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Modify => "modify",
        }
    }
}

/// Atomic unit of code output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperation {
    pub filename: String,
    pub content: String,
    pub kind: OperationKind,
}

impl FileOperation {
    pub fn create(filename: &str, content: String) -> Self {
        Self { filename: filename.to_string(), content, kind: OperationKind::Create }
    }

    pub fn modify(filename: &str, content: String) -> Self {
        Self { filename: filename.to_string(), content, kind: OperationKind::Modify }
    }

    /// Create or modify depending on whether the file already exists
    pub fn for_snapshot(files: &FileMap, filename: &str, content: String) -> Self {
        if files.contains_key(filename) {
            Self::modify(filename, content)
        } else {
            Self::create(filename, content)
        }
    }
}

/// Error reported by the preview sandbox
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub message: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
}

impl RuntimeError {
    pub fn new(message: &str) -> Self {
        Self { message: message.to_string(), ..Default::default() }
    }

    pub fn in_file(mut self, file: &str) -> Self {
        self.file = Some(file.to_string());
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}
