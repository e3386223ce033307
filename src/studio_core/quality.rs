// Vibe-Forge: Quality Scorer
// Rule-based heuristic scoring of plans and code. Pure and deterministic.

use crate::agents::Plan;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Default pass threshold for both artifact kinds
pub const DEFAULT_THRESHOLD: f64 = 0.85;

/// Upper (exclusive) bound on a plan's file count
pub const MAX_PLAN_FILES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// In [0, 1]
    pub score: f64,
    pub passed: bool,
    pub suggestions: Vec<String>,
}

/// One weighted boolean check. Weights are in hundredths.
struct Check {
    weight: u32,
    passed: bool,
    suggestion: &'static str,
}

fn tally(checks: &[Check], threshold: f64) -> QualityScore {
    let hundredths: u32 = checks.iter().filter(|c| c.passed).map(|c| c.weight).sum();
    let score = f64::from(hundredths) / 100.0;
    let suggestions = checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.suggestion.to_string())
        .collect();

    QualityScore {
        score,
        passed: score >= threshold,
        suggestions,
    }
}

/// Scores plans and code against fixed weighted rule sets
#[derive(Debug, Clone, Copy)]
pub struct QualityScorer {
    threshold: f64,
    max_plan_files: usize,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_plan_files: MAX_PLAN_FILES,
        }
    }
}

impl QualityScorer {
    pub fn new(threshold: f64) -> Self {
        Self { threshold, ..Self::default() }
    }

    pub fn with_max_plan_files(mut self, max_plan_files: usize) -> Self {
        self.max_plan_files = max_plan_files;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score_plan(&self, plan: &Plan) -> QualityScore {
        let has_identity = plan
            .app
            .as_ref()
            .map(|app| !app.name.trim().is_empty() && !app.tagline.trim().is_empty())
            .unwrap_or(false);
        let has_details = plan
            .file_details
            .as_ref()
            .map(|details| !details.is_empty())
            .unwrap_or(false);
        let has_layout = plan
            .layout
            .as_ref()
            .map(|layout| !layout.trim().is_empty())
            .unwrap_or(false);
        let file_count = plan.files.len();

        let checks = [
            Check {
                weight: 20,
                passed: has_identity,
                suggestion: "Give the app a name and a one-line tagline",
            },
            Check {
                weight: 20,
                passed: !plan.files.is_empty(),
                suggestion: "List the files to create",
            },
            Check {
                weight: 30,
                passed: has_details,
                suggestion: "Describe what each file contains in fileDetails",
            },
            Check {
                weight: 10,
                passed: has_layout,
                suggestion: "Describe the layout and UX approach",
            },
            Check {
                weight: 10,
                passed: plan.packages.is_some(),
                suggestion: "List the required packages as an array (use [] when none)",
            },
            Check {
                weight: 10,
                passed: file_count > 0 && file_count < self.max_plan_files,
                suggestion: "Keep the file count between 1 and 19",
            },
        ];

        tally(&checks, self.threshold)
    }

    pub fn score_code(&self, code: &str) -> QualityScore {
        let checks = [
            Check {
                weight: 20,
                passed: code.chars().count() > 50,
                suggestion: "Code is too short to be a complete module",
            },
            Check {
                weight: 20,
                passed: code.contains("export "),
                suggestion: "Add an export statement",
            },
            Check {
                weight: 20,
                passed: code.matches('{').count() == code.matches('}').count(),
                suggestion: "Balance curly braces",
            },
            Check {
                weight: 15,
                passed: code.matches('[').count() == code.matches(']').count(),
                suggestion: "Balance square brackets",
            },
            Check {
                weight: 15,
                passed: !uses_var(code),
                suggestion: "Replace `var` with `const` or `let`",
            },
            Check {
                weight: 10,
                passed: code.lines().count() < 300,
                suggestion: "Split the file; keep it under 300 lines",
            },
        ];

        tally(&checks, self.threshold)
    }
}

static VAR_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bvar\s+[A-Za-z_$\[{]").expect("var declaration pattern"));

/// True when `var` appears as a declaration keyword outside line comments
pub(crate) fn uses_var(code: &str) -> bool {
    code.lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .any(|line| VAR_DECL.is_match(line))
}
