// Vibe-Forge: Plan Orchestrator
// Greenfield vs. contextual planning with a single-shot quality refinement.

use super::{
    AgentContext, AgentError, AgentSuite, AnalysisMode, AnalysisResult, FileMap, Intent, Plan, PlanRequest, Planner,
    UxDesign,
};
use crate::studio_core::scenario::contextual_intent;
use crate::studio_core::{KeywordClassifier, ProgressReporter, QualityScore, QualityScorer, Scenario, ScenarioClassifier};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned {
        scenario: Scenario,
        intent: Intent,
        plan: Plan,
        quality: QualityScore,
        design: Option<UxDesign>,
        analysis: Option<AnalysisResult>,
        /// The refinement pass ran
        refined: bool,
    },
    Skipped {
        reason: String,
    },
}

impl PlanOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, PlanOutcome::Skipped { .. })
    }

    pub fn plan(&self) -> Option<&Plan> {
        match self {
            PlanOutcome::Planned { plan, .. } => Some(plan),
            PlanOutcome::Skipped { .. } => None,
        }
    }
}

pub struct PlanOrchestrator {
    agents: AgentSuite,
    scorer: QualityScorer,
    classifier: Arc<dyn ScenarioClassifier>,
    progress: ProgressReporter,
}

impl PlanOrchestrator {
    pub fn new(agents: AgentSuite) -> Self {
        Self {
            agents,
            scorer: QualityScorer::default(),
            classifier: Arc::new(KeywordClassifier),
            progress: ProgressReporter::silent("plan"),
        }
    }

    pub fn with_scorer(mut self, scorer: QualityScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn ScenarioClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress.for_orchestrator("plan");
        self
    }

    pub fn detect_scenario(&self, message: &str, files: &FileMap) -> Scenario {
        self.classifier.classify(message, files)
    }

    pub async fn run(&self, message: &str, files: &FileMap, context: &AgentContext) -> Result<PlanOutcome, AgentError> {
        let scenario = self.detect_scenario(message, files);
        self.progress.emit("scenario", format!("Scenario: {}", scenario.as_str()));

        match scenario {
            Scenario::Skip => {
                let reason = "Simple change to existing code; going straight to code".to_string();
                self.progress.emit("skipped", reason.clone());
                Ok(PlanOutcome::Skipped { reason })
            }
            Scenario::Greenfield => self.plan_greenfield(message, context).await,
            Scenario::Contextual => self.plan_contextual(message, files, context).await,
        }
    }

    async fn plan_greenfield(&self, message: &str, context: &AgentContext) -> Result<PlanOutcome, AgentError> {
        self.progress.emit("planning", "Planning a new app");
        let request = PlanRequest::new(message, Intent::CreateNew);
        let plan = self.agents.planner.plan(&request, context).await?;

        self.progress.emit("designing", format!("Designing {}", plan.app_name()));
        let design = self.agents.designer.design(message, &plan, context).await?;

        let (plan, quality, refined) = self.score_and_refine(message, plan, request, context).await?;
        Ok(PlanOutcome::Planned {
            scenario: Scenario::Greenfield,
            intent: Intent::CreateNew,
            plan,
            quality,
            design: Some(design),
            analysis: None,
            refined,
        })
    }

    async fn plan_contextual(
        &self,
        message: &str,
        files: &FileMap,
        context: &AgentContext,
    ) -> Result<PlanOutcome, AgentError> {
        self.progress.emit("analyzing", format!("Analyzing {} file(s)", files.len()));
        let analysis = self
            .agents
            .analyzer
            .analyze(message, files, AnalysisMode::Modification, context)
            .await?;

        let intent = contextual_intent(message);
        self.progress.emit("planning", format!("Planning ({})", intent.as_str()));
        let request = PlanRequest::new(message, intent)
            .with_analysis(&analysis)
            .with_existing_files(files.keys().cloned().collect());
        let plan = self.agents.planner.plan(&request, context).await?;

        let (plan, quality, refined) = self.score_and_refine(message, plan, request, context).await?;
        Ok(PlanOutcome::Planned {
            scenario: Scenario::Contextual,
            intent,
            plan,
            quality,
            design: None,
            analysis: Some(analysis),
            refined,
        })
    }

    /// Score; below threshold, re-plan once with the suggestions appended
    async fn score_and_refine(
        &self,
        message: &str,
        plan: Plan,
        request: PlanRequest<'_>,
        context: &AgentContext,
    ) -> Result<(Plan, QualityScore, bool), AgentError> {
        let quality = self.scorer.score_plan(&plan);
        self.progress.emit("scored", format!("Plan quality {:.2}", quality.score));
        if quality.passed {
            return Ok((plan, quality, false));
        }

        self.progress.emit(
            "refining",
            format!("Plan scored {:.2}; refining once", quality.score),
        );
        let refined_message = Planner::refinement_message(message, &quality.suggestions);
        let refined_request = PlanRequest {
            message: &refined_message,
            ..request
        };
        let refined = self.agents.planner.plan(&refined_request, context).await?;
        let refined_quality = self.scorer.score_plan(&refined);
        log::info!("Plan refined: {:.2} -> {:.2}", quality.score, refined_quality.score);

        if refined_quality.score >= quality.score {
            Ok((refined, refined_quality, true))
        } else {
            Ok((plan, quality, true))
        }
    }
}
