mod common;

use async_trait::async_trait;
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vibe_forge_lib::agents::{
    AgentContext, AgentSuite, CodeRequest, ErrorCategory, OperationKind, Plan, MAX_DEBUG_ATTEMPTS,
};
use vibe_forge_lib::{
    CodeMode, CodeOrchestrator, FileMap, MemoryStore, PreviewReport, PreviewRunner, RuntimeError,
};

fn orchestrator(model: Arc<ScriptedModel>, memory: MemoryStore) -> CodeOrchestrator {
    CodeOrchestrator::new(AgentSuite::new(model, Duration::from_secs(5)), memory)
}

const LIST_APP: &str = "export default function App({ items }) {\n  return <ul>{items.map((i) => <li key={i}>{i}</li>)}</ul>;\n}\n";

const GUARDED_LIST_APP: &str = "export default function App({ items = [] }) {\n  return <ul>{items.map((i) => <li key={i}>{i}</li>)}</ul>;\n}\n";

const BROKEN: &str = "export default function App() {\n  return <div>broken</div>;\n";

fn list_files() -> FileMap {
    let mut files = FileMap::new();
    files.insert("App.jsx".to_string(), LIST_APP.to_string());
    files
}

fn null_access() -> RuntimeError {
    RuntimeError::new("TypeError: Cannot read properties of undefined (reading 'map')").in_file("App.jsx")
}

#[tokio::test]
async fn test_unfixable_error_stops_after_three_attempts() {
    let model = Arc::new(ScriptedModel::new().respond(Role::Debugger, fenced(BROKEN)));
    let memory = MemoryStore::in_memory();
    let code = orchestrator(model.clone(), memory.clone());

    let outcome = code.fix_bugs(&null_access(), &list_files(), &AgentContext::default()).await;

    assert!(!outcome.fixed);
    assert_eq!(outcome.attempts, MAX_DEBUG_ATTEMPTS);
    assert_eq!(outcome.history.len(), 3);
    assert_eq!(model.count(Role::Debugger), 3);
    assert_eq!(outcome.category, ErrorCategory::NullAccess);
    assert_eq!(outcome.file, "App.jsx");
    assert!(outcome.operations.is_empty());
    assert!(outcome.last_error.unwrap().contains("Validation failed"));
    assert!(memory.patterns().is_empty());
}

#[tokio::test]
async fn test_identical_signature_counts_as_stuck() {
    // The model hands back the file unchanged every time
    let model = Arc::new(ScriptedModel::new().respond(Role::Debugger, fenced(LIST_APP)));
    let code = orchestrator(model.clone(), MemoryStore::in_memory());

    let outcome = code.fix_bugs(&null_access(), &list_files(), &AgentContext::default()).await;

    assert!(!outcome.fixed);
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.history.iter().all(|a| a.stuck));

    let prompts = model.prompts_for(Role::Debugger);
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("PREVIOUS ATTEMPT"));
    assert!(prompts[1].contains("PREVIOUS ATTEMPT 1 FAILED"));
    assert!(prompts[2].contains("PREVIOUS ATTEMPT 2 FAILED"));
}

#[tokio::test]
async fn test_fix_records_pattern_and_feeds_later_repairs() {
    let model = Arc::new(ScriptedModel::new().respond(Role::Debugger, fenced(GUARDED_LIST_APP)));
    let memory = MemoryStore::in_memory();
    let code = orchestrator(model.clone(), memory.clone());

    let outcome = code.fix_bugs(&null_access(), &list_files(), &AgentContext::default()).await;

    assert!(outcome.fixed);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.operations.len(), 1);
    assert_eq!(outcome.operations[0].kind, OperationKind::Modify);
    assert!(outcome.operations[0].content.contains("items = []"));

    let patterns = memory.patterns();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].category, ErrorCategory::NullAccess);
    assert_eq!(patterns[0].file, "App.jsx");

    // A second error of the same category sees the learned fix
    code.fix_bugs(&null_access(), &list_files(), &AgentContext::default()).await;
    let calls = model.calls();
    let (_, second) = calls.last().unwrap();
    assert!(second.system_prompt.contains("## Previously Successful Fixes"));
}

/// Reports the scripted sequence, then success
struct SequencePreview {
    errors: Vec<RuntimeError>,
    runs: AtomicUsize,
}

#[async_trait]
impl PreviewRunner for SequencePreview {
    async fn run(&self, _files: &FileMap) -> anyhow::Result<PreviewReport> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(match self.errors.get(n) {
            Some(error) => PreviewReport::RuntimeError(error.clone()),
            None => PreviewReport::Success,
        })
    }
}

#[tokio::test]
async fn test_preview_decides_success() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::Debugger, fenced(&LIST_APP.replace("{ items }", "{ items, title }")))
            .respond(Role::Debugger, fenced(GUARDED_LIST_APP)),
    );
    let preview = Arc::new(SequencePreview {
        errors: vec![null_access()],
        runs: AtomicUsize::new(0),
    });
    let code = orchestrator(model.clone(), MemoryStore::in_memory()).with_preview(preview.clone());

    let outcome = code.fix_bugs(&null_access(), &list_files(), &AgentContext::default()).await;

    assert!(outcome.fixed);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.history[0].stuck);
    assert_eq!(preview.runs.load(Ordering::SeqCst), 2);
    // The second attempt builds on the first candidate, which passed validation
    assert!(model.prompts_for(Role::Debugger)[1].contains("{ items, title }"));
}

#[tokio::test]
async fn test_debug_mode_reports_failure_with_category() {
    let model = Arc::new(ScriptedModel::new().respond(Role::Debugger, fenced(BROKEN)));
    let code = orchestrator(model, MemoryStore::in_memory());

    let error = RuntimeError::new("Error: Too many re-renders. React limits the number of renders")
        .in_file("App.jsx");
    let request = CodeRequest::new("", Arc::new(list_files()), AgentContext::default()).with_error(&error);
    let outcome = code.run(request).await.unwrap();

    assert_eq!(outcome.mode, CodeMode::Debug);
    assert!(!outcome.is_success());
    assert!(outcome.operations.is_empty());
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].category, Some(ErrorCategory::InfiniteRender));
    assert_eq!(outcome.debug.as_ref().unwrap().attempts, 3);
}

#[tokio::test]
async fn test_generate_isolates_a_failing_file() {
    let model = Arc::new(
        ScriptedModel::new()
            .respond_when(Role::CodeWriter, "## File\n\nList.jsx", fenced(BROKEN))
            .respond(Role::CodeWriter, fenced(GUARDED_LIST_APP))
            .respond(Role::Debugger, fenced(BROKEN)),
    );
    let code = orchestrator(model.clone(), MemoryStore::in_memory());

    let plan = Plan {
        files: vec!["App.jsx".to_string(), "List.jsx".to_string()],
        ..Plan::default()
    };
    let outcome = code.generate(&plan, None, &FileMap::new(), &AgentContext::default()).await;

    assert_eq!(outcome.operations.len(), 1);
    assert_eq!(outcome.operations[0].filename, "App.jsx");
    assert_eq!(outcome.operations[0].kind, OperationKind::Create);

    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].filename, "List.jsx");
    assert_eq!(outcome.failures[0].category, Some(ErrorCategory::SyntaxError));
    assert_eq!(model.count(Role::Debugger), 3);
}

#[tokio::test]
async fn test_validation_repair_routes_through_debugger() {
    let fixed = "export default function List() {\n  return <ul />;\n}\n";
    let model = Arc::new(
        ScriptedModel::new()
            .respond(Role::CodeWriter, fenced(BROKEN))
            .respond(Role::Debugger, fenced(fixed)),
    );
    let memory = MemoryStore::in_memory();
    let code = orchestrator(model.clone(), memory.clone());

    let plan = Plan {
        files: vec!["List.jsx".to_string()],
        ..Plan::default()
    };
    let outcome = code.generate(&plan, None, &FileMap::new(), &AgentContext::default()).await;

    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.operations.len(), 1);
    assert_eq!(outcome.operations[0].content, fixed);
    assert_eq!(model.count(Role::Debugger), 1);
    assert_eq!(memory.patterns()[0].category, ErrorCategory::SyntaxError);
}

#[tokio::test]
async fn test_banned_import_is_stripped_without_a_model_repair() {
    let code_with_banned = "import fs from 'fs';\n\nexport default function App() {\n  return <p>hi</p>;\n}\n";
    let model = Arc::new(ScriptedModel::new().respond(Role::CodeWriter, fenced(code_with_banned)));
    let code = orchestrator(model.clone(), MemoryStore::in_memory());

    let plan = Plan {
        files: vec!["App.jsx".to_string()],
        ..Plan::default()
    };
    let outcome = code.generate(&plan, None, &FileMap::new(), &AgentContext::default()).await;

    assert_eq!(outcome.operations.len(), 1);
    assert!(!outcome.operations[0].content.contains("from 'fs'"));
    assert_eq!(model.count(Role::Debugger), 0);
}
