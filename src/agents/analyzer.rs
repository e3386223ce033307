// Vibe-Forge: The Analyzer Agent
// Reads the current code and locates what must change for a request.

use super::{
    call_model, parse_structured, Agent, AgentContext, AgentError, AgentSettings, AnalysisMode, AnalysisResult,
    FileMap,
};
use crate::llm::{LanguageModel, SystemPrompts};
use std::sync::Arc;

/// The Analyzer Agent
pub struct Analyzer {
    model: Arc<dyn LanguageModel>,
    settings: AgentSettings,
}

impl Agent for Analyzer {
    fn name(&self) -> &str {
        "Analyzer"
    }

    fn system_prompt(&self) -> &str {
        SystemPrompts::analyzer()
    }
}

impl Analyzer {
    pub fn new(model: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self { model, settings }
    }

    pub async fn analyze(
        &self,
        message: &str,
        files: &FileMap,
        mode: AnalysisMode,
        context: &AgentContext,
    ) -> Result<AnalysisResult, AgentError> {
        let system = context.to_prompt_context().render_system(self.system_prompt());
        let user = build_user_prompt(message, files, mode);

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        let mut analysis: AnalysisResult = parse_structured(self.name(), &response)?;
        normalize(&mut analysis, files, mode);

        log::info!(
            "Analyzer ({}) targets {} file(s)",
            mode.as_str(),
            analysis.files_to_modify.len()
        );
        Ok(analysis)
    }
}

fn mode_instructions(mode: AnalysisMode) -> &'static str {
    match mode {
        AnalysisMode::Modification => {
            "Identify the files and exact snippets that must change to satisfy the request."
        }
        AnalysisMode::Debug => "Locate the code responsible for the reported error and describe the fix.",
        AnalysisMode::StyleExtract => {
            "Describe the visual style in use: colors, spacing, typography and component patterns. Leave changes empty."
        }
        AnalysisMode::Explain => {
            "Explain how the code works in the `explanation` field. Leave changes empty."
        }
        AnalysisMode::Refactor => {
            "Identify structural improvements that preserve behavior: extract components, deduplicate state, simplify effects."
        }
    }
}

fn build_user_prompt(message: &str, files: &FileMap, mode: AnalysisMode) -> String {
    let mut prompt = format!(
        "## Mode\n\n{}: {}\n\n## Request\n\n{}\n\n## Files\n\n",
        mode.as_str(),
        mode_instructions(mode),
        message
    );
    for (name, content) in files {
        prompt.push_str(&format!("### {}\n```\n{}\n```\n\n", name, content));
    }
    prompt
}

/// Keep `files_to_modify` and `changes` consistent; read-only modes carry no changes
fn normalize(analysis: &mut AnalysisResult, files: &FileMap, mode: AnalysisMode) {
    if matches!(mode, AnalysisMode::Explain | AnalysisMode::StyleExtract) {
        analysis.changes.clear();
        analysis.files_to_modify.clear();
        return;
    }

    analysis.changes.retain(|_, targets| !targets.is_empty());
    for file in analysis.changes.keys() {
        if !analysis.files_to_modify.contains(file) {
            analysis.files_to_modify.push(file.clone());
        }
    }

    let mut seen = std::collections::HashSet::new();
    analysis.files_to_modify.retain(|file| seen.insert(file.clone()));

    for (file, targets) in &analysis.changes {
        if let Some(content) = files.get(file) {
            for target in targets {
                if !target.pattern.is_empty() && !content.contains(&target.pattern) {
                    log::debug!("Analyzer pattern not found verbatim in {}: {:.60}", file, target.pattern);
                }
            }
        }
    }
}
