// Vibe-Forge: The UX Designer Agent
// Produces a design system for a new app, or infers the one existing code uses.

use super::{call_model, parse_structured, Agent, AgentContext, AgentError, AgentSettings, FileMap, Plan, UxDesign};
use crate::llm::{LanguageModel, SystemPrompts};
use std::sync::Arc;

/// Upper bound on code sent for style extraction
const MAX_EXTRACT_CHARS: usize = 12_000;

pub struct Designer {
    model: Arc<dyn LanguageModel>,
    settings: AgentSettings,
}

impl Agent for Designer {
    fn name(&self) -> &str {
        "Designer"
    }

    fn system_prompt(&self) -> &str {
        SystemPrompts::designer()
    }
}

impl Designer {
    pub fn new(model: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self { model, settings }
    }

    /// Fresh design keyed to the plan's identity
    pub async fn design(&self, message: &str, plan: &Plan, context: &AgentContext) -> Result<UxDesign, AgentError> {
        let system = context.to_prompt_context().render_system(self.system_prompt());
        let tagline = plan.app.as_ref().map(|a| a.tagline.as_str()).unwrap_or("");
        let user = format!(
            "## App\n\n{} - {}\n\n## Request\n\n{}\n\n## Plan\n\n{}",
            plan.app_name(),
            tagline,
            message,
            plan.outline()
        );

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        let design: UxDesign = parse_structured(self.name(), &response)?;
        log::info!("Designer chose a '{}' style for {}", design.design_style.aesthetic, plan.app_name());
        Ok(design)
    }

    /// Infer the design system already present in `files`
    pub async fn extract(&self, files: &FileMap, context: &AgentContext) -> Result<UxDesign, AgentError> {
        let system = context.to_prompt_context().render_system(SystemPrompts::designer_extract());

        let mut user = String::from("## Code\n\n");
        for (name, content) in files {
            if user.len() + content.len() > MAX_EXTRACT_CHARS {
                break;
            }
            user.push_str(&format!("### {}\n```\n{}\n```\n\n", name, content));
        }

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        parse_structured(self.name(), &response)
    }
}
