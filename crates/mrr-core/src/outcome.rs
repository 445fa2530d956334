use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::scenario::Category;

// ---------------------------------------------------------------------------
// Model output
// ---------------------------------------------------------------------------

/// What the model under test produced for one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub bug_id: String,
    /// Files the model retrieved, best first.
    #[serde(default)]
    pub retrieved_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix: Option<ProposedFix>,
    /// Result of running the scenario's test against the patched code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
}

impl ModelOutput {
    pub fn empty(bug_id: impl Into<String>) -> Self {
        Self {
            bug_id: bug_id.into(),
            retrieved_files: Vec::new(),
            fix: None,
            tests_passed: None,
            iterations: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedFix {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default)]
    pub patch: String,
    #[serde(default)]
    pub root_cause: String,
}

/// A scenario's slot in the outputs file: parsed, or present but unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSlot {
    Parsed(ModelOutput),
    Malformed { reason: String },
}

/// Add a slot unless `bug_id` already has one. The first output for an id
/// wins; returns false for a duplicate.
pub fn insert_output(
    slots: &mut HashMap<String, OutputSlot>,
    bug_id: String,
    slot: OutputSlot,
) -> bool {
    match slots.entry(bug_id) {
        Entry::Occupied(e) => {
            tracing::warn!(bug_id = %e.key(), "duplicate model output ignored");
            false
        }
        Entry::Vacant(e) => {
            e.insert(slot);
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Per-scenario outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Evaluated,
    MissingOutput,
    MalformedOutput,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluated => write!(f, "evaluated"),
            Self::MissingOutput => write!(f, "missing_output"),
            Self::MalformedOutput => write!(f, "malformed_output"),
        }
    }
}

impl std::str::FromStr for OutcomeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "evaluated" => Ok(Self::Evaluated),
            "missing_output" => Ok(Self::MissingOutput),
            "malformed_output" => Ok(Self::MalformedOutput),
            _ => Err(format!("invalid outcome status: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub bug_id: String,
    pub category: Category,
    pub status: OutcomeStatus,
    pub fix_success: bool,
    pub root_cause_match: bool,
    pub location_match: bool,
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub should_recall_at_k: f64,
    /// Distinct files retrieved (before the top-k cut).
    pub retrieved: usize,
    pub iterations: u32,
}

impl ScenarioOutcome {
    /// Zero-score outcome for a scenario without usable output.
    pub fn failed(
        bug_id: impl Into<String>,
        category: Category,
        status: OutcomeStatus,
        max_iterations: u32,
    ) -> Self {
        Self {
            bug_id: bug_id.into(),
            category,
            status,
            fix_success: false,
            root_cause_match: false,
            location_match: false,
            precision_at_k: 0.0,
            recall_at_k: 0.0,
            should_recall_at_k: 0.0,
            retrieved: 0,
            iterations: max_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_output_keeps_first() {
        let mut slots = HashMap::new();
        let mut first = ModelOutput::empty("mrr_logic_errors_0001");
        first.iterations = Some(2);
        let mut second = ModelOutput::empty("mrr_logic_errors_0001");
        second.iterations = Some(9);

        assert!(insert_output(&mut slots, first.bug_id.clone(), OutputSlot::Parsed(first)));
        assert!(!insert_output(&mut slots, second.bug_id.clone(), OutputSlot::Parsed(second)));
        assert!(!insert_output(
            &mut slots,
            "mrr_logic_errors_0001".into(),
            OutputSlot::Malformed { reason: "bad".into() }
        ));
        match &slots["mrr_logic_errors_0001"] {
            OutputSlot::Parsed(o) => assert_eq!(o.iterations, Some(2)),
            other => panic!("unexpected slot {other:?}"),
        }
    }
}
