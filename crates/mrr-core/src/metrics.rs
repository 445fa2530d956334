//! Per-scenario scoring: retrieval precision/recall, root-cause and
//! fix-location matching.

use std::collections::HashSet;

use crate::outcome::{ModelOutput, OutcomeStatus, OutputSlot, ScenarioOutcome};
use crate::scenario::Scenario;

/// Knobs that affect how a single scenario is scored.
#[derive(Debug, Clone, Copy)]
pub struct ScoringParams {
    pub k: usize,
    pub max_iterations: u32,
    pub root_cause_min_matches: usize,
}

/// Normalise a path for comparison: forward slashes, no leading `./`.
pub fn normalize_path(path: &str) -> String {
    let unified = path.trim().replace('\\', "/");
    let mut s = unified.as_str();
    while let Some(rest) = s.strip_prefix("./") {
        s = rest;
    }
    s.trim_start_matches('/').to_string()
}

/// Normalised retrieved files with duplicates removed, first rank kept.
pub fn dedup_ranked(files: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    files
        .iter()
        .map(|f| normalize_path(f))
        .filter(|f| !f.is_empty() && seen.insert(f.clone()))
        .collect()
}

/// Fraction of the top-k retrieved files that are relevant.
/// Denominator is `min(k, retrieved)`; nothing retrieved scores 0.
pub fn precision_at_k(ranked: &[String], relevant: &HashSet<String>, k: usize) -> f64 {
    let considered = k.min(ranked.len());
    if considered == 0 {
        return 0.0;
    }
    let hits = ranked.iter().take(k).filter(|f| relevant.contains(*f)).count();
    hits as f64 / considered as f64
}

/// Fraction of `targets` that appear in the top-k. An empty target set is
/// trivially fully recalled.
pub fn recall_at_k(ranked: &[String], targets: &HashSet<String>, k: usize) -> f64 {
    if targets.is_empty() {
        return 1.0;
    }
    let found = ranked.iter().take(k).filter(|f| targets.contains(*f)).count();
    found as f64 / targets.len() as f64
}

/// Keyword check of a proposed root cause against the ground-truth keywords.
/// At least `min_matches` keywords must appear (all of them when fewer exist).
pub fn root_cause_matches(answer: &str, keywords: &[String], min_matches: usize) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let answer_lower = answer.to_lowercase();
    let matches = keywords
        .iter()
        .filter(|kw| answer_lower.contains(&kw.to_lowercase()))
        .count();
    matches >= min_matches.min(keywords.len()).max(1)
}

fn location_matches(scenario: &Scenario, output: &ModelOutput) -> bool {
    let Some(fix) = &output.fix else {
        return false;
    };
    let expected = &scenario.ground_truth.fix_location;
    if normalize_path(&fix.file) != normalize_path(&expected.file) {
        return false;
    }
    fix.line.map_or(true, |line| expected.contains_line(line))
}

/// Score one scenario. `slot` is `None` when the model produced nothing for it.
pub fn score_scenario(
    scenario: &Scenario,
    slot: Option<&OutputSlot>,
    params: &ScoringParams,
) -> ScenarioOutcome {
    let output = match slot {
        Some(OutputSlot::Parsed(output)) => output,
        Some(OutputSlot::Malformed { .. }) => {
            return ScenarioOutcome::failed(
                &scenario.bug_id,
                scenario.category,
                OutcomeStatus::MalformedOutput,
                params.max_iterations,
            )
        }
        None => {
            return ScenarioOutcome::failed(
                &scenario.bug_id,
                scenario.category,
                OutcomeStatus::MissingOutput,
                params.max_iterations,
            )
        }
    };

    let truth = &scenario.ground_truth;
    let must: HashSet<String> = truth.must_find_files.iter().map(|f| normalize_path(f)).collect();
    let should: HashSet<String> = truth
        .should_find_files
        .iter()
        .map(|f| normalize_path(f))
        .collect();
    let relevant: HashSet<String> = must.union(&should).cloned().collect();

    let ranked = dedup_ranked(&output.retrieved_files);

    let fix_success = output.fix.is_some() && output.tests_passed == Some(true);
    let root_cause_match = output.fix.as_ref().is_some_and(|fix| {
        root_cause_matches(
            &fix.root_cause,
            &truth.root_cause_keywords,
            params.root_cause_min_matches,
        )
    });

    ScenarioOutcome {
        bug_id: scenario.bug_id.clone(),
        category: scenario.category,
        status: OutcomeStatus::Evaluated,
        fix_success,
        root_cause_match,
        location_match: location_matches(scenario, output),
        precision_at_k: precision_at_k(&ranked, &relevant, params.k),
        recall_at_k: recall_at_k(&ranked, &must, params.k),
        should_recall_at_k: recall_at_k(&ranked, &should, params.k),
        retrieved: ranked.len(),
        iterations: output
            .iterations
            .unwrap_or(params.max_iterations)
            .min(params.max_iterations),
    }
}
