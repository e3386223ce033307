// Vibe-Forge: The Planner Agent
// Turns a request into a build plan: identity, files, per-file specs, layout, packages.

use super::{call_model, parse_structured, Agent, AgentContext, AgentError, AgentSettings, AnalysisResult, Intent, Plan};
use crate::llm::{LanguageModel, SystemPrompts};
use std::sync::Arc;

/// Input to one planning call
#[derive(Debug, Clone)]
pub struct PlanRequest<'a> {
    pub message: &'a str,
    pub intent: Intent,
    /// Analyzer output grounding a contextual plan
    pub analysis: Option<&'a AnalysisResult>,
    /// Names of files that already exist
    pub existing_files: Vec<String>,
}

impl<'a> PlanRequest<'a> {
    pub fn new(message: &'a str, intent: Intent) -> Self {
        Self {
            message,
            intent,
            analysis: None,
            existing_files: Vec::new(),
        }
    }

    pub fn with_analysis(mut self, analysis: &'a AnalysisResult) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_existing_files(mut self, files: Vec<String>) -> Self {
        self.existing_files = files;
        self
    }
}

/// The Planner Agent
pub struct Planner {
    model: Arc<dyn LanguageModel>,
    settings: AgentSettings,
}

impl Agent for Planner {
    fn name(&self) -> &str {
        "Planner"
    }

    fn system_prompt(&self) -> &str {
        SystemPrompts::planner()
    }
}

impl Planner {
    pub fn new(model: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self { model, settings }
    }

    pub async fn plan(&self, request: &PlanRequest<'_>, context: &AgentContext) -> Result<Plan, AgentError> {
        let system = context.to_prompt_context().render_system(self.system_prompt());
        let user = self.build_user_prompt(request);

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        let plan: Plan = parse_structured(self.name(), &response)?;

        log::info!(
            "Planner produced {} file(s) for '{}' ({})",
            plan.files.len(),
            plan.app_name(),
            request.intent.as_str()
        );
        Ok(plan)
    }

    /// The original request with scorer suggestions appended as instructions
    pub fn refinement_message(message: &str, suggestions: &[String]) -> String {
        let mut refined = format!("{}\n\nIMPROVE THE PLAN. Address every point:\n", message);
        for suggestion in suggestions {
            refined.push_str(&format!("- {}\n", suggestion));
        }
        refined
    }

    fn build_user_prompt(&self, request: &PlanRequest<'_>) -> String {
        let mut prompt = format!("## Intent\n\n{}\n\n## Request\n\n{}\n\n", request.intent.as_str(), request.message);

        if !request.existing_files.is_empty() {
            prompt.push_str("## Existing Files\n\n");
            for file in &request.existing_files {
                prompt.push_str(&format!("- {}\n", file));
            }
            prompt.push('\n');
        }

        if let Some(analysis) = request.analysis {
            prompt.push_str(&format!("## Analysis of Current Code\n\n{}\n", analysis.render()));
        }

        match request.intent {
            Intent::CreateNew => prompt.push_str("Plan a new application from scratch."),
            Intent::Modify => prompt.push_str("Plan the changes. Only list files that must be created or modified."),
            Intent::Refactor => {
                prompt.push_str("Plan a restructuring that preserves behavior. List every file that changes.")
            }
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refinement_message_lists_suggestions() {
        let refined = Planner::refinement_message(
            "build a todo app",
            &["Describe the layout and UX approach".to_string(), "List the files to create".to_string()],
        );
        assert!(refined.starts_with("build a todo app\n\nIMPROVE THE PLAN"));
        assert!(refined.contains("- Describe the layout and UX approach\n"));
        assert!(refined.contains("- List the files to create\n"));
    }
}
