// Vibe-Forge: Scenario Detection
// Decides whether a request needs fresh planning, grounded planning, or no planning.

use crate::agents::{FileMap, Intent};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// Inflected forms count ("adding", "updated"), unrelated words sharing a stem ("address") do not
static ADDITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:add(?:s|ed|ing)?|chang(?:e|es|ed|ing)|updat(?:e|es|ed|ing))\b")
        .expect("additive keyword pattern")
});

static RESTRUCTURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:refactor|redesign|reorganize)").expect("restructure keyword pattern")
});

static REFACTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)refactor").expect("refactor pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Greenfield,
    Contextual,
    /// Simple tweak: go straight to code
    Skip,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::Greenfield => "greenfield",
            Scenario::Contextual => "contextual",
            Scenario::Skip => "skip",
        }
    }
}

/// Pluggable request classifier used by the plan orchestrator
pub trait ScenarioClassifier: Send + Sync {
    fn classify(&self, message: &str, files: &FileMap) -> Scenario;
}

/// Keyword heuristic: add/change/update without refactor/redesign/reorganize is a tweak
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl ScenarioClassifier for KeywordClassifier {
    fn classify(&self, message: &str, files: &FileMap) -> Scenario {
        detect_scenario(message, files)
    }
}

pub fn detect_scenario(message: &str, files: &FileMap) -> Scenario {
    if files.is_empty() {
        Scenario::Greenfield
    } else if is_simple_tweak(message) {
        Scenario::Skip
    } else {
        Scenario::Contextual
    }
}

pub fn is_simple_tweak(message: &str) -> bool {
    ADDITIVE.is_match(message) && !RESTRUCTURE.is_match(message)
}

/// Intent of a contextual request
pub fn contextual_intent(message: &str) -> Intent {
    if mentions_refactor(message) {
        Intent::Refactor
    } else {
        Intent::Modify
    }
}

pub fn mentions_refactor(message: &str) -> bool {
    REFACTOR.is_match(message)
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
    fn test_documented_cases() {
        assert_eq!(detect_scenario("build a todo app", &FileMap::new()), Scenario::Greenfield);
        assert_eq!(detect_scenario("add a button", &one_file()), Scenario::Skip);
        assert_eq!(detect_scenario("refactor the state logic", &one_file()), Scenario::Contextual);
        assert_eq!(contextual_intent("refactor the state logic"), Intent::Refactor);
        assert_eq!(contextual_intent("make it dark themed"), Intent::Modify);
    }

    #[test]
    fn test_classification_is_total() {
        let empty = FileMap::new();
        let files = one_file();
        for message in ["", "   ", "add", "Update the header", "add comprehensive refactored styling", "redesign"] {
            for snapshot in [&empty, &files] {
                let scenario = KeywordClassifier.classify(message, snapshot);
                assert!(matches!(scenario, Scenario::Greenfield | Scenario::Contextual | Scenario::Skip));
            }
        }
        assert_eq!(detect_scenario("", &files), Scenario::Contextual);
        assert_eq!(detect_scenario("", &empty), Scenario::Greenfield);
    }

    #[test]
    fn test_keyword_boundaries() {
        assert!(is_simple_tweak("Update the header color"));
        assert!(!is_simple_tweak("add comprehensive refactored styling"));
        assert!(!is_simple_tweak("reorganize and add tabs"));
        assert!(!is_simple_tweak("make the address field wider"));
        assert!(!is_simple_tweak("the addon panel is too tall"));
    }

    #[test]
    fn test_inflected_tweaks_skip_planning() {
        assert_eq!(detect_scenario("Adding a dark mode toggle", &one_file()), Scenario::Skip);
        assert_eq!(detect_scenario("updated header text", &one_file()), Scenario::Skip);
        assert_eq!(detect_scenario("Changing the font size", &one_file()), Scenario::Skip);
        assert_eq!(detect_scenario("adds a footer", &one_file()), Scenario::Skip);
        assert_eq!(detect_scenario("added tabs but reorganized the nav", &one_file()), Scenario::Contextual);
    }
}
