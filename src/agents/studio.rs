// Vibe-Forge: Studio
// Top-level request handler: scenario routing through the Plan Orchestrator,
// code production through the Code Orchestrator, one optional preview-driven
// repair round, and session memory upkeep.

use super::{
    AgentContext, AgentError, AgentSuite, AnalysisMode, AnalysisResult, CodeOrchestrator, CodeOutcome, CodeRequest,
    FileFailure, FileMap, FileOperation, PlanOrchestrator, PlanOutcome, RuntimeError, UxDesign,
};
use crate::llm::LanguageModel;
use crate::memory::{CodebaseMap, ContextCompressor, MemoryStore, TurnRole};
use crate::settings::PipelineConfig;
use crate::studio_core::{
    apply_with_history, PreviewReport, PreviewRunner, ProgressReporter, ProgressSink, Scenario, ScenarioClassifier,
    Validator, VersionHistory,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Request has no message and no runtime error to fix")]
    EmptyRequest,
}

/// One user turn against an artifact
#[derive(Debug, Clone, Default)]
pub struct StudioRequest {
    pub message: String,
    /// Full snapshot of the artifact; empty for a new app
    pub files: FileMap,
    /// Runtime error reported by the preview, routes straight to debugging
    pub error: Option<RuntimeError>,
}

impl StudioRequest {
    pub fn new(message: impl Into<String>, files: FileMap) -> Self {
        Self {
            message: message.into(),
            files,
            error: None,
        }
    }

    pub fn with_error(mut self, error: RuntimeError) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioOutcome {
    /// None for debug requests, which bypass planning
    pub scenario: Option<Scenario>,
    pub plan: Option<PlanOutcome>,
    pub code: CodeOutcome,
    /// Snapshot with every validated operation applied
    pub files: FileMap,
}

impl StudioOutcome {
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    pub fn operations(&self) -> &[FileOperation] {
        &self.code.operations
    }
}

pub struct StudioBuilder {
    model: Arc<dyn LanguageModel>,
    memory: MemoryStore,
    agents: Option<AgentSuite>,
    pipeline: PipelineConfig,
    preview: Option<Arc<dyn PreviewRunner>>,
    progress: ProgressReporter,
    classifier: Option<Arc<dyn ScenarioClassifier>>,
    validator: Validator,
    compress: bool,
}

impl StudioBuilder {
    /// `model` backs every agent unless `agents` overrides them, and always backs summarization
    pub fn new(model: Arc<dyn LanguageModel>, memory: MemoryStore) -> Self {
        Self {
            model,
            memory,
            agents: None,
            pipeline: PipelineConfig::default(),
            preview: None,
            progress: ProgressReporter::silent("studio"),
            classifier: None,
            validator: Validator::default(),
            compress: true,
        }
    }

    pub fn agents(mut self, agents: AgentSuite) -> Self {
        self.agents = Some(agents);
        self
    }

    pub fn pipeline(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn preview(mut self, preview: Arc<dyn PreviewRunner>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = ProgressReporter::new("studio", sink);
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn ScenarioClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    /// Turn off conversation summarization
    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    pub fn build(self) -> Studio {
        let agents = self
            .agents
            .unwrap_or_else(|| AgentSuite::new(self.model.clone(), self.pipeline.agent_timeout()));
        let scorer = self.pipeline.scorer();

        let mut plan = PlanOrchestrator::new(agents.clone())
            .with_scorer(scorer.clone())
            .with_progress(self.progress.clone());
        if let Some(classifier) = self.classifier {
            plan = plan.with_classifier(classifier);
        }

        let mut code = CodeOrchestrator::new(agents.clone(), self.memory.clone())
            .with_max_attempts(self.pipeline.max_debug_attempts)
            .with_validator(self.validator)
            .with_scorer(scorer)
            .with_progress(self.progress.clone());
        if let Some(preview) = &self.preview {
            code = code.with_preview(preview.clone());
        }

        let compressor = self
            .compress
            .then(|| ContextCompressor::new(self.model.clone(), self.memory.clone(), self.pipeline.compressor()));

        Studio {
            agents,
            memory: self.memory,
            plan,
            code,
            compressor,
            preview: self.preview,
            history: Mutex::new(VersionHistory::default()),
            auto_fix: self.pipeline.auto_fix,
            progress: self.progress,
        }
    }
}

pub struct Studio {
    agents: AgentSuite,
    memory: MemoryStore,
    plan: PlanOrchestrator,
    code: CodeOrchestrator,
    compressor: Option<ContextCompressor>,
    preview: Option<Arc<dyn PreviewRunner>>,
    history: Mutex<VersionHistory>,
    auto_fix: bool,
    progress: ProgressReporter,
}

impl Studio {
    pub fn builder(model: Arc<dyn LanguageModel>, memory: MemoryStore) -> StudioBuilder {
        StudioBuilder::new(model, memory)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn plan_orchestrator(&self) -> &PlanOrchestrator {
        &self.plan
    }

    pub fn code_orchestrator(&self) -> &CodeOrchestrator {
        &self.code
    }

    /// Undo the last applied change to `filename`, returning the restored content
    pub async fn undo(&self, filename: &str) -> Option<String> {
        self.history.lock().await.undo(filename).map(str::to_string)
    }

    pub async fn redo(&self, filename: &str) -> Option<String> {
        self.history.lock().await.redo(filename).map(str::to_string)
    }

    /// Handle one request; cancelling `cancel` abandons the in-flight agent call
    pub async fn handle(&self, request: StudioRequest, cancel: &CancellationToken) -> Result<StudioOutcome, StudioError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::warn!("Studio request cancelled");
                self.progress.emit("cancelled", "Request cancelled");
                Err(StudioError::Cancelled)
            }
            result = self.process(request) => result,
        }
    }

    async fn process(&self, request: StudioRequest) -> Result<StudioOutcome, StudioError> {
        let message = request.message.trim().to_string();
        if message.is_empty() && request.error.is_none() {
            return Err(StudioError::EmptyRequest);
        }

        let files = Arc::new(request.files);
        self.refresh_codebase_map(&files).await;
        let context = self.context_for(&message).await;

        let (scenario, plan, mut code) = match &request.error {
            Some(error) => {
                self.progress.emit("debug", format!("Fixing runtime error: {}", error.message));
                let code_request = CodeRequest::new(&message, files.clone(), context.clone()).with_error(error);
                (None, None, self.code.run(code_request).await?)
            }
            None => {
                let plan = self.plan.run(&message, &files, &context).await?;
                let code = self.code_for_plan(&message, &files, &plan, &context).await?;
                let scenario = match &plan {
                    PlanOutcome::Planned { scenario, .. } => *scenario,
                    PlanOutcome::Skipped { .. } => Scenario::Skip,
                };
                (Some(scenario), Some(plan), code)
            }
        };

        let mut merged = self.apply(&files, &code.operations, "generate").await;
        if self.auto_fix && !code.operations.is_empty() {
            merged = self.preview_round(merged, &mut code, &context).await;
        }

        self.record_reply(&code).await;
        Ok(StudioOutcome {
            scenario,
            plan,
            code,
            files: merged,
        })
    }

    async fn code_for_plan(
        &self,
        message: &str,
        files: &Arc<FileMap>,
        plan: &PlanOutcome,
        context: &AgentContext,
    ) -> Result<CodeOutcome, AgentError> {
        let request = CodeRequest::new(message, files.clone(), context.clone());
        let request = match plan {
            PlanOutcome::Planned {
                plan, design, analysis, ..
            } => {
                let request = request.with_plan(plan, design.as_ref());
                match analysis {
                    Some(analysis) => request.with_analysis(analysis),
                    None => request,
                }
            }
            PlanOutcome::Skipped { .. } => request,
        };
        self.code.run(request).await
    }

    /// Run the preview once over the merged snapshot and repair what it reports
    async fn preview_round(&self, merged: FileMap, code: &mut CodeOutcome, context: &AgentContext) -> FileMap {
        let Some(preview) = &self.preview else {
            return merged;
        };

        let error = match preview.run(&merged).await {
            Ok(PreviewReport::Success) => return merged,
            Ok(PreviewReport::RuntimeError(error)) => error,
            Err(e) => {
                log::warn!("Preview unavailable: {}", e);
                return merged;
            }
        };

        self.progress.emit("auto_fix", format!("Preview reported: {}", error.message));
        let debug = self.code.fix_bugs(&error, &merged, context).await;
        let repaired = if debug.fixed {
            for op in &debug.operations {
                code.operations.retain(|existing| existing.filename != op.filename);
                code.operations.push(op.clone());
            }
            self.apply(&merged, &debug.operations, "auto-fix").await
        } else {
            code.failures.push(FileFailure {
                filename: debug.file.clone(),
                error: debug.last_error.clone().unwrap_or_else(|| error.message.clone()),
                category: Some(debug.category),
            });
            merged
        };
        code.debug = Some(debug);
        repaired
    }

    /// Answer a question about the code without changing it
    pub async fn explain(&self, question: &str, files: &FileMap) -> Result<String, StudioError> {
        let context = self.context_for(question).await;
        let analysis: AnalysisResult = self
            .agents
            .analyzer
            .analyze(question, files, AnalysisMode::Explain, &context)
            .await?;
        let answer = analysis.explanation.unwrap_or(analysis.summary);
        self.record_turn(TurnRole::Assistant, &answer).await;
        Ok(answer)
    }

    /// Infer the design system an existing artifact already uses
    pub async fn extract_style(&self, files: &FileMap) -> Result<UxDesign, StudioError> {
        let context = AgentContext::load(&self.memory, None);
        Ok(self.agents.designer.extract(files, &context).await?)
    }

    async fn refresh_codebase_map(&self, files: &FileMap) {
        if files.is_empty() {
            return;
        }
        if let Err(e) = self.memory.set_codebase_map(&CodebaseMap::build(files)).await {
            log::warn!("Failed to store codebase map: {}", e);
        }
    }

    async fn context_for(&self, message: &str) -> AgentContext {
        let context = AgentContext::load(&self.memory, None);
        let Some(compressor) = &self.compressor else {
            return context;
        };
        if !message.is_empty() && compressor.add_turn(TurnRole::User, message).await {
            self.progress.emit("compressed", "Conversation summarized");
        }
        context.with_conversation(compressor.compressed_context().await)
    }

    async fn record_reply(&self, code: &CodeOutcome) {
        let mut reply = format!(
            "{:?}: {} file(s) written",
            code.mode,
            code.operations.len()
        );
        for op in &code.operations {
            reply.push_str(&format!("\n- {} {}", op.kind.as_str(), op.filename));
        }
        for failure in &code.failures {
            reply.push_str(&format!("\n- failed {}: {}", failure.filename, failure.error));
        }
        self.record_turn(TurnRole::Assistant, &reply).await;
    }

    async fn record_turn(&self, role: TurnRole, content: &str) {
        if let Some(compressor) = &self.compressor {
            compressor.add_turn(role, content).await;
        }
    }

    async fn apply(&self, files: &FileMap, operations: &[FileOperation], label: &str) -> FileMap {
        let mut history = self.history.lock().await;
        apply_with_history(files, operations, &mut history, label)
    }
}
