mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vibe_forge_lib::agents::{AgentContext, AgentSuite, Intent, OperationKind};
use vibe_forge_lib::llm::{LanguageModel, ModelRequest};
use vibe_forge_lib::studio_core::ProgressEvent;
use vibe_forge_lib::{
    CodeMode, FileMap, MemoryStore, PlanOrchestrator, PlanOutcome, Scenario, Studio, StudioError, StudioRequest,
};

fn studio(model: Arc<ScriptedModel>) -> Studio {
    Studio::builder(model, MemoryStore::in_memory()).build()
}

const COMPONENT: &str = "export default function Component() {\n  return <div className=\"card\">Todo</div>;\n}";

#[tokio::test]
async fn test_greenfield_plans_designs_and_generates() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Planner, GOOD_PLAN)
            .respond(Role::Designer, DESIGN)
            .respond_when(Role::CodeWriter, "## File\n\nApp.jsx", fenced(APP))
            .respond(Role::CodeWriter, fenced(TODO_LIST)),
    );
    let studio = studio(model.clone());

    let outcome = studio
        .handle(StudioRequest::new("build a todo app", FileMap::new()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.scenario, Some(Scenario::Greenfield));
    assert_eq!(model.count(Role::Analyzer), 0);
    assert_eq!(model.count(Role::Planner), 1);
    assert_eq!(model.count(Role::Designer), 1);
    assert_eq!(&model.roles()[..2], &[Role::Planner, Role::Designer]);

    match outcome.plan.as_ref().unwrap() {
        PlanOutcome::Planned { intent, quality, design, refined, .. } => {
            assert_eq!(*intent, Intent::CreateNew);
            assert_eq!(quality.score, 1.0);
            assert!(design.is_some());
            assert!(!refined);
        }
        other => panic!("expected a plan, got {:?}", other),
    }

    assert!(outcome.is_success());
    assert_eq!(outcome.code.mode, CodeMode::Generate);
    assert_eq!(outcome.operations().len(), 2);
    assert!(outcome.operations().iter().all(|op| op.kind == OperationKind::Create));
    assert!(outcome.files.contains_key("App.jsx"));
    assert!(outcome.files.contains_key("components/TodoList.jsx"));

    // The design system reaches the code writer
    let writer_prompt = &model.prompts_for(Role::CodeWriter)[0];
    assert!(writer_prompt.contains("## Design System"));
}

#[tokio::test]
async fn test_additive_request_skips_planning() {
    // Plan Orchestrator alone: no agent is consulted
    let model = Arc::new(ScriptedModel::new());
    let orchestrator = PlanOrchestrator::new(AgentSuite::new(model.clone(), Duration::from_secs(5)));
    let outcome = orchestrator
        .run("add a button", &counter_files(), &AgentContext::default())
        .await
        .unwrap();
    assert!(outcome.is_skipped());
    assert!(model.calls().is_empty());

    // Through the Studio the change goes straight to code
    let updated = counter_files()["App.jsx"].replace("</button>;", "</button>;\n  // reset lives next to the counter");
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Analyzer, analysis_for("App.jsx", "Add a reset button"))
            .respond(Role::CodeWriter, fenced(&updated)),
    );
    let studio = studio(model.clone());
    let outcome = studio
        .handle(StudioRequest::new("add a button", counter_files()), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.scenario, Some(Scenario::Skip));
    assert!(outcome.plan.as_ref().unwrap().is_skipped());
    assert_eq!(model.count(Role::Planner), 0);
    assert_eq!(model.count(Role::Designer), 0);
    assert_eq!(model.roles(), vec![Role::Analyzer, Role::CodeWriter]);

    assert_eq!(outcome.code.mode, CodeMode::Modify);
    assert_eq!(outcome.operations().len(), 1);
    assert_eq!(outcome.operations()[0].kind, OperationKind::Modify);
    assert!(outcome.files["App.jsx"].contains("reset lives next to the counter"));
}

#[tokio::test]
async fn test_refactor_request_analyzes_before_planning() {
    let plan = r#"{
      "app": {"name": "Counter", "tagline": "Count things"},
      "files": ["App.jsx", "hooks/useCounter.js"],
      "fileDetails": {
        "App.jsx": "Use the useCounter hook instead of local state",
        "hooks/useCounter.js": "Hook owning the count state"
      },
      "layout": "Unchanged",
      "packages": []
    }"#;
    let hook = "import { useState } from 'react';\n\nexport default function useCounter() {\n  const [count, setCount] = useState(0);\n  return [count, () => setCount(count + 1)];\n}";
    let app = "import useCounter from './hooks/useCounter';\n\nexport default function App() {\n  const [count, increment] = useCounter();\n  return <button onClick={increment}>{count}</button>;\n}";

    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Analyzer, analysis_for("App.jsx", "Move state into a hook"))
            .respond(Role::Planner, plan)
            .respond_when(Role::CodeWriter, "## File\n\nhooks/useCounter.js", fenced(hook))
            .respond(Role::CodeWriter, fenced(app)),
    );
    let studio = studio(model.clone());

    let outcome = studio
        .handle(
            StudioRequest::new("refactor the state logic", counter_files()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.scenario, Some(Scenario::Contextual));
    assert_eq!(&model.roles()[..2], &[Role::Analyzer, Role::Planner]);
    assert_eq!(model.count(Role::Designer), 0);
    assert!(model.prompts_for(Role::Planner)[0].starts_with("## Intent\n\nREFACTOR"));

    match outcome.plan.as_ref().unwrap() {
        PlanOutcome::Planned { intent, analysis, design, .. } => {
            assert_eq!(*intent, Intent::Refactor);
            assert!(analysis.is_some());
            assert!(design.is_none());
        }
        other => panic!("expected a plan, got {:?}", other),
    }

    assert_eq!(outcome.code.mode, CodeMode::Refactor);
    let kinds: Vec<(String, OperationKind)> = outcome
        .operations()
        .iter()
        .map(|op| (op.filename.clone(), op.kind))
        .collect();
    assert!(kinds.contains(&("App.jsx".to_string(), OperationKind::Modify)));
    assert!(kinds.contains(&("hooks/useCounter.js".to_string(), OperationKind::Create)));
}

#[tokio::test]
async fn test_weak_plan_is_refined_once() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Planner, WEAK_PLAN)
            .respond(Role::Planner, GOOD_PLAN)
            .respond(Role::Designer, DESIGN),
    );
    let orchestrator = PlanOrchestrator::new(AgentSuite::new(model.clone(), Duration::from_secs(5)));

    let outcome = orchestrator
        .run("build a todo app", &FileMap::new(), &AgentContext::default())
        .await
        .unwrap();

    assert_eq!(model.count(Role::Planner), 2);
    let prompts = model.prompts_for(Role::Planner);
    assert!(!prompts[0].contains("IMPROVE THE PLAN"));
    assert!(prompts[1].contains("IMPROVE THE PLAN"));
    assert!(prompts[1].contains("Describe the layout and UX approach"));

    match outcome {
        PlanOutcome::Planned { plan, quality, refined, .. } => {
            assert!(refined);
            assert_eq!(plan.app_name(), "Todo");
            assert_eq!(quality.score, 1.0);
        }
        other => panic!("expected a plan, got {:?}", other),
    }
}

#[tokio::test]
async fn test_refinement_never_recurses() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Planner, WEAK_PLAN)
            .respond(Role::Designer, DESIGN),
    );
    let orchestrator = PlanOrchestrator::new(AgentSuite::new(model.clone(), Duration::from_secs(5)));

    let outcome = orchestrator
        .run("build a todo app", &FileMap::new(), &AgentContext::default())
        .await
        .unwrap();

    assert_eq!(model.count(Role::Planner), 2);
    match outcome {
        PlanOutcome::Planned { quality, refined, .. } => {
            assert!(refined);
            assert!(!quality.passed);
        }
        other => panic!("expected a plan, got {:?}", other),
    }
}

#[tokio::test]
async fn test_misshaped_plan_scores_low_and_is_refined() {
    let misshaped = r#"{"app":{"name":"Todo","tagline":"Track"},"files":["App.jsx"],"fileDetails":{"App.jsx":{"purpose":"root"}},"layout":"stacked","packages":[]}"#;
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Planner, misshaped)
            .respond(Role::Planner, GOOD_PLAN)
            .respond(Role::Designer, DESIGN),
    );
    let orchestrator = PlanOrchestrator::new(AgentSuite::new(model.clone(), Duration::from_secs(5)));

    let outcome = orchestrator
        .run("build a todo app", &FileMap::new(), &AgentContext::default())
        .await
        .unwrap();

    assert_eq!(model.count(Role::Planner), 2);
    assert!(model.prompts_for(Role::Planner)[1].contains("Describe what each file contains in fileDetails"));
    match outcome {
        PlanOutcome::Planned { plan, quality, refined, .. } => {
            assert!(refined);
            assert!(quality.passed);
            assert_eq!(plan.file_spec("App.jsx"), "Root component holding the todo state");
        }
        other => panic!("expected a plan, got {:?}", other),
    }
}

#[tokio::test]
async fn test_progress_events_are_tagged_by_orchestrator() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Planner, GOOD_PLAN)
            .respond(Role::Designer, DESIGN)
            .respond(Role::CodeWriter, fenced(COMPONENT)),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
    let studio = Studio::builder(model, MemoryStore::in_memory())
        .progress(Arc::new(tx))
        .build();

    studio
        .handle(StudioRequest::new("build a todo app", FileMap::new()), &CancellationToken::new())
        .await
        .unwrap();
    drop(studio);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.iter().any(|e| e.orchestrator == "plan" && e.phase == "scenario"));
    assert!(events.iter().any(|e| e.orchestrator == "code" && e.phase == "generating"));
}

#[tokio::test]
async fn test_empty_request_is_rejected() {
    let model = Arc::new(ScriptedModel::new());
    let studio = studio(model.clone());

    let result = studio
        .handle(StudioRequest::new("   ", counter_files()), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(StudioError::EmptyRequest)));
    assert!(model.calls().is_empty());
}

/// Never answers within a test's lifetime
struct HangingModel;

#[async_trait::async_trait]
impl LanguageModel for HangingModel {
    async fn call(&self, _request: ModelRequest) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

#[tokio::test]
async fn test_cancellation_abandons_in_flight_call() {
    let studio = Studio::builder(Arc::new(HangingModel), MemoryStore::in_memory()).build();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        studio.handle(StudioRequest::new("build a todo app", FileMap::new()), &cancel),
    )
    .await
    .expect("cancellation should end the request promptly");
    assert!(matches!(result, Err(StudioError::Cancelled)));
}

#[tokio::test]
async fn test_agent_failure_propagates() {
    // No Planner script: the model call fails
    let model = Arc::new(ScriptedModel::new());
    let studio = studio(model);

    let result = studio
        .handle(StudioRequest::new("build a todo app", FileMap::new()), &CancellationToken::new())
        .await;
    assert!(matches!(result, Err(StudioError::Agent(_))));
}

#[tokio::test]
async fn test_explain_leaves_files_untouched() {
    let explanation = r#"{"summary": "A counter", "explanation": "Clicking the button increments count", "filesToModify": ["App.jsx"]}"#;
    let model = Arc::new(ScriptedModel::new().respond(Role::Analyzer, explanation));
    let studio = studio(model.clone());

    let answer = studio.explain("how does the counter work?", &counter_files()).await.unwrap();
    assert_eq!(answer, "Clicking the button increments count");
    assert!(model.prompts_for(Role::Analyzer)[0].contains("EXPLAIN"));
}

#[tokio::test]
async fn test_undo_restores_previous_content() {
    let updated = counter_files()["App.jsx"].replace("useState(0)", "useState(10)");
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Analyzer, analysis_for("App.jsx", "Start at ten"))
            .respond(Role::CodeWriter, fenced(&updated)),
    );
    let studio = studio(model);

    let outcome = studio
        .handle(StudioRequest::new("change the start value to 10", counter_files()), &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.files["App.jsx"].contains("useState(10)"));

    let restored = studio.undo("App.jsx").await.unwrap();
    assert!(restored.contains("useState(0)"));
    let redone = studio.redo("App.jsx").await.unwrap();
    assert!(redone.contains("useState(10)"));
}
