// Vibe-Forge: Code Orchestrator
// Turns plans and change targets into validated File Operations, and drives
// the bounded debug-repair loop for runtime errors.

use super::debugger::{categorize, ErrorSignature};
use super::{
    AgentContext, AgentError, AgentSuite, AnalysisMode, AnalysisResult, AttemptRecord, ChangeTarget, DebugOutcome,
    Diagnosis, ErrorCategory, FileMap, FileOperation, ModifyRequest, Plan, RuntimeError, UxDesign,
};
use crate::memory::MemoryStore;
use crate::studio_core::scenario::mentions_refactor;
use crate::studio_core::{PreviewReport, PreviewRunner, ProgressReporter, QualityScore, QualityScorer, Validator};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default bound on debug attempts
pub const MAX_DEBUG_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeMode {
    Generate,
    Modify,
    Refactor,
    Debug,
}

/// A file that could not be produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub filename: String,
    pub error: String,
    pub category: Option<ErrorCategory>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeOutcome {
    pub mode: CodeMode,
    /// Validated operations only
    pub operations: Vec<FileOperation>,
    pub failures: Vec<FileFailure>,
    pub debug: Option<DebugOutcome>,
}

impl CodeOutcome {
    fn new(mode: CodeMode) -> Self {
        Self {
            mode,
            operations: Vec::new(),
            failures: Vec::new(),
            debug: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.debug.as_ref().map(|d| d.fixed).unwrap_or(true)
    }

    fn absorb(&mut self, results: Vec<Result<FileOperation, FileFailure>>) {
        for result in results {
            match result {
                Ok(op) => self.operations.push(op),
                Err(failure) => self.failures.push(failure),
            }
        }
    }
}

/// Everything one code request needs
#[derive(Clone)]
pub struct CodeRequest<'a> {
    pub message: &'a str,
    /// Immutable snapshot for the duration of the request
    pub files: Arc<FileMap>,
    pub plan: Option<&'a Plan>,
    pub design: Option<&'a UxDesign>,
    pub analysis: Option<&'a AnalysisResult>,
    pub error: Option<&'a RuntimeError>,
    pub context: AgentContext,
}

impl<'a> CodeRequest<'a> {
    pub fn new(message: &'a str, files: Arc<FileMap>, context: AgentContext) -> Self {
        Self {
            message,
            files,
            plan: None,
            design: None,
            analysis: None,
            error: None,
            context,
        }
    }

    pub fn with_plan(mut self, plan: &'a Plan, design: Option<&'a UxDesign>) -> Self {
        self.plan = Some(plan);
        self.design = design;
        self
    }

    pub fn with_analysis(mut self, analysis: &'a AnalysisResult) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_error(mut self, error: &'a RuntimeError) -> Self {
        self.error = Some(error);
        self
    }
}

enum Verdict {
    Fixed(String),
    Failed {
        signature: ErrorSignature,
        detail: String,
        /// Candidate that passed validation, used as the next attempt's base
        valid_code: Option<String>,
    },
}

pub struct CodeOrchestrator {
    agents: AgentSuite,
    memory: MemoryStore,
    validator: Validator,
    scorer: QualityScorer,
    max_attempts: usize,
    preview: Option<Arc<dyn PreviewRunner>>,
    progress: ProgressReporter,
}

impl CodeOrchestrator {
    pub fn new(agents: AgentSuite, memory: MemoryStore) -> Self {
        Self {
            agents,
            memory,
            validator: Validator::default(),
            scorer: QualityScorer::default(),
            max_attempts: MAX_DEBUG_ATTEMPTS,
            preview: None,
            progress: ProgressReporter::silent("code"),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    /// Verifies debug fixes by re-running the preview
    pub fn with_preview(mut self, preview: Arc<dyn PreviewRunner>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress.for_orchestrator("code");
        self
    }

    /// Soft quality signal for callers; not used as a gate here
    pub fn score_code(&self, code: &str) -> QualityScore {
        self.scorer.score_code(code)
    }

    pub fn select_mode(
        message: &str,
        files: &FileMap,
        plan: Option<&Plan>,
        error: Option<&RuntimeError>,
    ) -> CodeMode {
        if error.is_some() {
            return CodeMode::Debug;
        }
        let plan_is_all_new = plan
            .map(|p| !p.files.is_empty() && p.files.iter().all(|f| !files.contains_key(f)))
            .unwrap_or(false);
        if files.is_empty() || plan_is_all_new {
            CodeMode::Generate
        } else if mentions_refactor(message) {
            CodeMode::Refactor
        } else {
            CodeMode::Modify
        }
    }

    pub async fn run(&self, request: CodeRequest<'_>) -> Result<CodeOutcome, AgentError> {
        let files = request.files.clone();
        let mode = Self::select_mode(request.message, &files, request.plan, request.error);
        self.progress.emit("mode", format!("Code mode: {:?}", mode));

        match (mode, request.error, request.plan) {
            (CodeMode::Debug, Some(error), _) => {
                let debug = self.fix_bugs(error, &files, &request.context).await;
                let mut outcome = CodeOutcome::new(CodeMode::Debug);
                if debug.fixed {
                    outcome.operations = debug.operations.clone();
                } else {
                    outcome.failures.push(FileFailure {
                        filename: debug.file.clone(),
                        error: debug.last_error.clone().unwrap_or_else(|| error.message.clone()),
                        category: Some(debug.category),
                    });
                }
                outcome.debug = Some(debug);
                Ok(outcome)
            }
            (CodeMode::Generate, _, Some(plan)) => Ok(self.generate(plan, request.design, &files, &request.context).await),
            (CodeMode::Generate, _, None) => {
                let plan = fallback_plan(request.message);
                Ok(self.generate(&plan, request.design, &files, &request.context).await)
            }
            (_, _, Some(plan)) => {
                let mut outcome = self.modify_from_plan(plan, request.design, &files, &request.context).await;
                outcome.mode = mode;
                Ok(outcome)
            }
            (CodeMode::Refactor, _, None) => {
                let analysis = self
                    .agents
                    .analyzer
                    .analyze(request.message, &files, AnalysisMode::Refactor, &request.context)
                    .await?;
                let mut outcome = self.modify(&analysis, &files, &request.context).await;
                outcome.mode = CodeMode::Refactor;
                Ok(outcome)
            }
            (_, _, None) => {
                let analysis = match request.analysis {
                    Some(analysis) => analysis.clone(),
                    None => {
                        self.agents
                            .analyzer
                            .analyze(request.message, &files, AnalysisMode::Modification, &request.context)
                            .await?
                    }
                };
                Ok(self.modify(&analysis, &files, &request.context).await)
            }
        }
    }

    /// Generate every plan file concurrently; failures are isolated per file
    pub async fn generate(
        &self,
        plan: &Plan,
        design: Option<&UxDesign>,
        files: &FileMap,
        context: &AgentContext,
    ) -> CodeOutcome {
        self.progress.emit("generating", format!("Writing {} file(s)", plan.files.len()));

        let tasks = plan.files.iter().map(|filename| async move {
            let candidate = self.agents.code_writer.generate(filename, plan, design, context).await;
            self.settle_file(filename, candidate, files, context).await
        });
        let results = join_all(tasks).await;

        let mut outcome = CodeOutcome::new(CodeMode::Generate);
        outcome.absorb(results);
        self.report(&outcome);
        outcome
    }

    /// Apply Analyzer change targets, one call per file
    pub async fn modify(&self, analysis: &AnalysisResult, files: &FileMap, context: &AgentContext) -> CodeOutcome {
        self.progress.emit("modifying", format!("Modifying {} file(s)", analysis.files_to_modify.len()));

        let tasks = analysis.files_to_modify.iter().map(|filename| async move {
            let current = files.get(filename).map(String::as_str).unwrap_or("");
            let mut targets = analysis.targets_for(filename).to_vec();
            if targets.is_empty() {
                targets.push(ChangeTarget {
                    reason: analysis.summary.clone(),
                    ..Default::default()
                });
            }
            let request = ModifyRequest::new(filename, current, targets);
            let candidate = self.agents.code_writer.modify(&request, context).await;
            self.settle_file(filename, candidate, files, context).await
        });
        let results = join_all(tasks).await;

        let mut outcome = CodeOutcome::new(CodeMode::Modify);
        outcome.absorb(results);
        self.report(&outcome);
        outcome
    }

    /// Existing plan files are modified from their spec; new ones are generated
    pub async fn modify_from_plan(
        &self,
        plan: &Plan,
        design: Option<&UxDesign>,
        files: &FileMap,
        context: &AgentContext,
    ) -> CodeOutcome {
        self.progress.emit("modifying", format!("Applying plan to {} file(s)", plan.files.len()));

        let tasks = plan.files.iter().map(|filename| async move {
            let candidate = match files.get(filename) {
                Some(current) => {
                    let target = ChangeTarget {
                        reason: plan.file_spec(filename).to_string(),
                        ..Default::default()
                    };
                    let request = ModifyRequest::new(filename, current, vec![target]);
                    self.agents.code_writer.modify(&request, context).await
                }
                None => self.agents.code_writer.generate(filename, plan, design, context).await,
            };
            self.settle_file(filename, candidate, files, context).await
        });
        let results = join_all(tasks).await;

        let mut outcome = CodeOutcome::new(CodeMode::Modify);
        outcome.absorb(results);
        self.report(&outcome);
        outcome
    }

    /// Validate one produced file; broken output goes through the debug loop
    async fn settle_file(
        &self,
        filename: &str,
        candidate: Result<String, AgentError>,
        files: &FileMap,
        context: &AgentContext,
    ) -> Result<FileOperation, FileFailure> {
        let code = candidate.map_err(|e| FileFailure {
            filename: filename.to_string(),
            error: e.to_string(),
            category: None,
        })?;

        let checked = self.validator.validate_with_repair(&code, filename);
        if checked.valid {
            return Ok(FileOperation::for_snapshot(files, filename, checked.code));
        }

        log::warn!("{} failed validation: {}", filename, checked.error_summary());
        self.progress.emit("repairing", format!("{} failed validation; repairing", filename));

        let mut candidate_files = files.clone();
        candidate_files.insert(filename.to_string(), checked.code.clone());
        let error = RuntimeError::new(&format!("SyntaxError: {}", checked.error_summary())).in_file(filename);
        let debug = self.fix_bugs(&error, &candidate_files, context).await;

        match debug.operations.into_iter().find(|op| op.filename == filename) {
            Some(op) if debug.fixed => Ok(FileOperation::for_snapshot(files, filename, op.content)),
            _ => Err(FileFailure {
                filename: filename.to_string(),
                error: debug.last_error.unwrap_or_else(|| checked.error_summary()),
                category: Some(debug.category),
            }),
        }
    }

    /// Bounded diagnose-fix-verify loop for one runtime error
    pub async fn fix_bugs(&self, error: &RuntimeError, files: &FileMap, context: &AgentContext) -> DebugOutcome {
        let debugger = &self.agents.debugger;
        let snapshot = files.clone();
        let diagnosis = debugger.diagnose(error, &snapshot);
        let reporter = self.progress.for_orchestrator("debug");
        reporter.emit(
            "diagnosed",
            format!("{} in {}", diagnosis.category, diagnosis.file),
        );

        let context = AgentContext {
            bug_patterns: self.memory.patterns_for(diagnosis.category, 5),
            ..context.clone()
        };

        let mut working = snapshot.get(&diagnosis.file).cloned().unwrap_or_default();
        let mut current_signature = diagnosis.signature();
        let mut failures: Vec<String> = Vec::new();
        let mut history: Vec<AttemptRecord> = Vec::new();

        for attempt in 1..=self.max_attempts {
            reporter.emit("attempt", format!("Attempt {}/{}", attempt, self.max_attempts));

            let (prepared, mechanical) = debugger.mechanical_fixes(diagnosis.category, &working, &diagnosis.file);
            let verdict = match debugger.attempt_fix(&diagnosis, &prepared, &failures, &context).await {
                Ok(candidate) => self.verify(&diagnosis, &current_signature, &snapshot, &working, candidate).await,
                Err(e) => Verdict::Failed {
                    signature: current_signature.clone(),
                    detail: format!("Repair call failed: {}", e),
                    valid_code: None,
                },
            };

            match verdict {
                Verdict::Fixed(code) => {
                    reporter.emit("fixed", format!("Fixed {} on attempt {}", diagnosis.file, attempt));
                    history.push(AttemptRecord {
                        attempt,
                        mechanical_fixes: mechanical.clone(),
                        signature: None,
                        stuck: false,
                        detail: "fixed".to_string(),
                    });
                    self.learn(&diagnosis, &mechanical).await;
                    return DebugOutcome {
                        fixed: true,
                        operations: vec![FileOperation::for_snapshot(&snapshot, &diagnosis.file, code)],
                        attempts: attempt,
                        category: diagnosis.category,
                        file: diagnosis.file.clone(),
                        last_error: None,
                        history,
                    };
                }
                Verdict::Failed { signature, detail, valid_code } => {
                    let stuck = signature == current_signature;
                    let detail = if stuck {
                        format!("{} (same error as before: {})", detail, signature)
                    } else {
                        detail
                    };
                    log::warn!("Debug attempt {} failed: {}", attempt, detail);
                    reporter.emit("attempt_failed", detail.clone());

                    if let Some(code) = valid_code {
                        working = code;
                        current_signature = signature.clone();
                    }
                    history.push(AttemptRecord {
                        attempt,
                        mechanical_fixes: mechanical,
                        signature: Some(signature),
                        stuck,
                        detail: detail.clone(),
                    });
                    failures.push(detail);
                }
            }
        }

        reporter.emit(
            "failed",
            format!("Could not fix {} after {} attempts", diagnosis.file, self.max_attempts),
        );
        DebugOutcome {
            fixed: false,
            operations: Vec::new(),
            attempts: history.len(),
            category: diagnosis.category,
            file: diagnosis.file.clone(),
            last_error: failures.last().cloned().or_else(|| Some(error.message.clone())),
            history,
        }
    }

    async fn verify(
        &self,
        diagnosis: &Diagnosis,
        current_signature: &ErrorSignature,
        snapshot: &FileMap,
        before: &str,
        candidate: String,
    ) -> Verdict {
        let file = diagnosis.file.as_str();

        let checked = self.validator.validate_with_repair(&candidate, file);
        if !checked.valid {
            let summary = checked.error_summary();
            return Verdict::Failed {
                signature: ErrorSignature::new(categorize(&summary), &summary, file),
                detail: format!("Validation failed: {}", summary),
                valid_code: None,
            };
        }

        let code = checked.code;
        if code.trim() == before.trim() {
            return Verdict::Failed {
                signature: current_signature.clone(),
                detail: "The fix left the file unchanged".to_string(),
                valid_code: None,
            };
        }

        if let Some(preview) = &self.preview {
            let mut merged = snapshot.clone();
            merged.insert(file.to_string(), code.clone());
            return match preview.run(&merged).await {
                Ok(PreviewReport::Success) => Verdict::Fixed(code),
                Ok(PreviewReport::RuntimeError(error)) => {
                    let next = self.agents.debugger.diagnose(&error, &merged);
                    Verdict::Failed {
                        signature: next.signature(),
                        detail: format!("Runtime error after fix: {}", error.message),
                        valid_code: Some(code),
                    }
                }
                Err(e) => Verdict::Failed {
                    signature: current_signature.clone(),
                    detail: format!("Preview could not run: {}", e),
                    valid_code: None,
                },
            };
        }

        let mut single = FileMap::new();
        single.insert(file.to_string(), code.clone());
        let remaining = self
            .agents
            .debugger
            .scan(&single)
            .into_iter()
            .find(|finding| finding.category == diagnosis.category);

        match remaining {
            Some(finding) => Verdict::Failed {
                signature: ErrorSignature::new(finding.category, &finding.issue, file),
                detail: format!("Static scan still reports line {}: {}", finding.line, finding.issue),
                valid_code: Some(code),
            },
            None => Verdict::Fixed(code),
        }
    }

    async fn learn(&self, diagnosis: &Diagnosis, mechanical: &[String]) {
        let pattern = self.agents.debugger.learned_pattern(diagnosis, mechanical);
        match self.memory.record_pattern(pattern).await {
            Ok(total) => log::info!("Recorded {} fix pattern ({} stored)", diagnosis.category, total),
            Err(e) => log::warn!("Failed to record bug pattern: {}", e),
        }
    }

    fn report(&self, outcome: &CodeOutcome) {
        for failure in &outcome.failures {
            self.progress.emit("file_failed", format!("{}: {}", failure.filename, failure.error));
        }
        self.progress.emit(
            "done",
            format!("{} operation(s), {} failure(s)", outcome.operations.len(), outcome.failures.len()),
        );
    }
}

/// Single-file plan used when generating without a Planner
fn fallback_plan(message: &str) -> Plan {
    let mut details = BTreeMap::new();
    details.insert("App.jsx".to_string(), message.to_string());
    Plan {
        files: vec!["App.jsx".to_string()],
        file_details: Some(details),
        ..Plan::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_file() -> FileMap {
        let mut files = FileMap::new();
        files.insert("App.jsx".to_string(), "export default function App() {}".to_string());
        files
    }

    #[test]
    fn test_mode_selection() {
        let error = RuntimeError::new("boom");
        assert_eq!(CodeOrchestrator::select_mode("x", &one_file(), None, Some(&error)), CodeMode::Debug);
        assert_eq!(CodeOrchestrator::select_mode("build", &FileMap::new(), None, None), CodeMode::Generate);
        assert_eq!(CodeOrchestrator::select_mode("refactor state", &one_file(), None, None), CodeMode::Refactor);
        assert_eq!(CodeOrchestrator::select_mode("add a button", &one_file(), None, None), CodeMode::Modify);

        let plan = Plan { files: vec!["Settings.jsx".into()], ..Plan::default() };
        assert_eq!(CodeOrchestrator::select_mode("add settings", &one_file(), Some(&plan), None), CodeMode::Generate);
    }

    #[test]
    fn test_fallback_plan_targets_entry_file() {
        let plan = fallback_plan("a counter");
        assert_eq!(plan.files, vec!["App.jsx".to_string()]);
        assert_eq!(plan.file_spec("App.jsx"), "a counter");
    }
}
