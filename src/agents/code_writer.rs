// Vibe-Forge: The Code Writer Agent
// Writes one file at a time: "generate" from a spec, "modify" from change targets.

use super::{call_model, Agent, AgentContext, AgentError, AgentSettings, ChangeTarget, Plan, UxDesign};
use crate::llm::{extract_code_block, LanguageModel, SystemPrompts};
use std::sync::Arc;

/// Input to one "modify" call
#[derive(Debug, Clone)]
pub struct ModifyRequest<'a> {
    pub filename: &'a str,
    pub current: &'a str,
    pub targets: Vec<ChangeTarget>,
    /// Extra free-text instructions appended after the targets
    pub notes: Option<String>,
    /// Role prompt replacing the Code Writer's own
    pub role_prompt: Option<&'static str>,
}

impl<'a> ModifyRequest<'a> {
    pub fn new(filename: &'a str, current: &'a str, targets: Vec<ChangeTarget>) -> Self {
        Self {
            filename,
            current,
            targets,
            notes: None,
            role_prompt: None,
        }
    }

    pub fn with_notes(mut self, notes: String) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn with_role_prompt(mut self, role_prompt: &'static str) -> Self {
        self.role_prompt = Some(role_prompt);
        self
    }
}

/// The Code Writer Agent
pub struct CodeWriter {
    model: Arc<dyn LanguageModel>,
    settings: AgentSettings,
}

impl Agent for CodeWriter {
    fn name(&self) -> &str {
        "CodeWriter"
    }

    fn system_prompt(&self) -> &str {
        SystemPrompts::code_writer_generate()
    }
}

impl CodeWriter {
    pub fn new(model: Arc<dyn LanguageModel>, settings: AgentSettings) -> Self {
        Self { model, settings }
    }

    /// Write `filename` from its plan specification
    pub async fn generate(
        &self,
        filename: &str,
        plan: &Plan,
        design: Option<&UxDesign>,
        context: &AgentContext,
    ) -> Result<String, AgentError> {
        let system = context.to_prompt_context().render_system(self.system_prompt());

        let mut user = format!(
            "## File\n\n{}\n\n## Specification\n\n{}\n\n## App Plan\n\n{}\n",
            filename,
            plan.file_spec(filename),
            plan.outline()
        );
        if let Some(packages) = plan.packages.as_ref().filter(|p| !p.is_empty()) {
            user.push_str(&format!("\n## Available Packages\n\n{}\n", packages.join(", ")));
        }
        if let Some(design) = design {
            user.push_str(&format!("\n## Design System\n\n{}", design.to_prompt()));
        }

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        self.extract(filename, &response)
    }

    /// Rewrite an existing file according to change targets
    pub async fn modify(&self, request: &ModifyRequest<'_>, context: &AgentContext) -> Result<String, AgentError> {
        let role = request.role_prompt.unwrap_or(SystemPrompts::code_writer_modify());
        let system = context.to_prompt_context().render_system(role);

        let mut user = format!("## File\n\n{}\n\n## Current Content\n\n```\n{}\n```\n\n## Changes\n\n", request.filename, request.current);
        for (i, target) in request.targets.iter().enumerate() {
            user.push_str(&format!("{}. {}\n", i + 1, target.reason));
            if !target.pattern.is_empty() {
                user.push_str(&format!("   Find:\n```\n{}\n```\n", target.pattern));
            }
            if !target.replacement.is_empty() {
                user.push_str(&format!("   Replace with:\n```\n{}\n```\n", target.replacement));
            }
        }
        if let Some(notes) = &request.notes {
            user.push_str(&format!("\n{}\n", notes));
        }

        let response = call_model(self.name(), self.model.as_ref(), &self.settings, system, user).await?;
        self.extract(request.filename, &response)
    }

    fn extract(&self, filename: &str, response: &str) -> Result<String, AgentError> {
        let mut code = extract_code_block(response);
        if code.trim().is_empty() {
            return Err(AgentError::MalformedResponse {
                agent: self.name().to_string(),
                detail: format!("no code returned for {}", filename),
            });
        }
        if !code.ends_with('\n') {
            code.push('\n');
        }
        log::debug!("CodeWriter wrote {} ({} lines)", filename, code.lines().count());
        Ok(code)
    }
}
