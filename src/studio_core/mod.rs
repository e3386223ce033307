// Vibe-Forge: Studio Core
// Deterministic building blocks shared by the orchestrators.

pub mod events;
pub mod preview;
pub mod quality;
pub mod scenario;
pub mod validator;
pub mod version_control;
pub mod workspace;

// Re-exports for convenience
pub use events::{NullSink, ProgressEvent, ProgressReporter, ProgressSink};
pub use preview::{PreviewReport, PreviewRunner};
pub use quality::{QualityScore, QualityScorer, DEFAULT_THRESHOLD};
pub use scenario::{detect_scenario, KeywordClassifier, Scenario, ScenarioClassifier};
pub use validator::{ValidationMode, ValidationResult, Validator};
pub use version_control::{VersionHistory, VersionRecord};
pub use workspace::{apply_operations, apply_with_history, changed_files};
