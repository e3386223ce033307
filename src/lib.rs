// Vibe-Forge: AI App Studio Core
// Plans, writes, validates and repairs small multi-file front-end apps with a
// pipeline of specialized language-model agents.

// Deterministic building blocks - scoring, validation, scenarios, history
pub mod studio_core;

// Agent System module - Planner, Analyzer, Code Writer, Designer, Debugger
pub mod agents;

// LLM abstraction layer - unified provider interface
pub mod llm;

// Rules, session context and learned bug patterns
pub mod memory;

// Persisted settings
pub mod settings;

// Re-export agent types
pub use agents::{
    Agent, AgentContext, AgentError, AgentSuite, CodeMode, CodeOrchestrator, CodeOutcome, DebugOutcome,
    ErrorCategory, FileMap, FileOperation, Plan, PlanOrchestrator, PlanOutcome, RuntimeError, Studio,
    StudioBuilder, StudioError, StudioOutcome, StudioRequest, UxDesign,
};

// Re-export LLM types
pub use llm::{LanguageModel, LlmConfig, LlmProvider, ModelRequest, ResilientLlmProvider};

// Re-export memory types
pub use memory::{BugPattern, ContextCompressor, MemoryStore};

// Re-export studio core types
pub use studio_core::{
    PreviewReport, PreviewRunner, ProgressEvent, ProgressSink, QualityScore, QualityScorer, Scenario, ValidationMode,
    ValidationResult, Validator,
};

pub use settings::{PipelineConfig, StudioSettings};
