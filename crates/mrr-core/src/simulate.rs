//! Synthetic model outputs drawn from a baseline profile.
//!
//! Lets the evaluation pipeline run end to end without an external model.
//! Each scenario uses its own stream keyed by bug id, so the outputs for a
//! scenario do not depend on which other scenarios were sampled.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::baseline::ModelBaseline;
use crate::outcome::{ModelOutput, ProposedFix};
use crate::scenario::Scenario;
use crate::seed::stream_rng;

fn prob(p: f64) -> f64 {
    if p.is_finite() {
        p.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn simulate_output(scenario: &Scenario, profile: &ModelBaseline, seed: u64) -> ModelOutput {
    let mut rng = stream_rng(seed, &format!("simulate:{}", scenario.bug_id), 0);
    let truth = &scenario.ground_truth;
    let recall = prob(profile.recall);
    let precision = prob(profile.precision);

    let mut retrieved = Vec::new();
    for file in &truth.must_find_files {
        if rng.gen_bool(recall) {
            retrieved.push(file.clone());
        }
    }
    for file in &truth.should_find_files {
        if rng.gen_bool(recall * 0.8) {
            retrieved.push(file.clone());
        }
    }

    // Pad with irrelevant context so hits / retrieved lands near `precision`.
    let hits = retrieved.len().max(1);
    let noise = if precision > 0.0 {
        ((hits as f64) * (1.0 - precision) / precision).round() as usize
    } else {
        hits * 4
    };
    let mut others: Vec<&str> = scenario
        .context_paths()
        .filter(|p| !scenario.relevant_files().any(|r| r == *p))
        .collect();
    others.shuffle(&mut rng);
    retrieved.extend(others.into_iter().take(noise).map(str::to_string));
    retrieved.shuffle(&mut rng);

    let success = rng.gen_bool(prob(profile.success_for(scenario.category)));
    let (fix, tests_passed) = if success {
        let fix = ProposedFix {
            file: truth.fix_location.file.clone(),
            line: Some(truth.fix_location.line_start),
            patch: truth.fix_description.clone(),
            root_cause: format!("{} ({})", truth.root_cause, truth.root_cause_keywords.join(", ")),
        };
        (Some(fix), Some(true))
    } else if rng.gen_bool(0.5) {
        // A plausible but wrong attempt.
        let file = scenario
            .scattered_context
            .choose(&mut rng)
            .map(|c| c.file_path.clone())
            .unwrap_or_default();
        let fix = ProposedFix {
            file,
            line: Some(rng.gen_range(1..=500)),
            patch: String::new(),
            root_cause: scenario.symptoms.first().cloned().unwrap_or_default(),
        };
        (Some(fix), Some(false))
    } else {
        (None, None)
    };

    let mean = profile.mean_iterations.max(1.0);
    let iterations = (mean * rng.gen_range(0.5..1.5)).round().max(1.0) as u32;

    ModelOutput {
        bug_id: scenario.bug_id.clone(),
        retrieved_files: retrieved,
        fix,
        tests_passed,
        iterations: Some(iterations),
    }
}

pub fn simulate_outputs(scenarios: &[Scenario], profile: &ModelBaseline, seed: u64) -> Vec<ModelOutput> {
    let outputs: Vec<ModelOutput> = scenarios
        .iter()
        .map(|s| simulate_output(s, profile, seed))
        .collect();
    tracing::debug!(count = outputs.len(), "simulated model outputs");
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{EvalConfig, Evaluator};
    use crate::outcome::{insert_output, ModelOutput, OutputSlot};
    use crate::test_fixtures::scenario_with_context;
    use std::collections::HashMap;

    fn slots(outputs: Vec<ModelOutput>) -> HashMap<String, OutputSlot> {
        let mut slots = HashMap::new();
        for o in outputs {
            insert_output(&mut slots, o.bug_id.clone(), OutputSlot::Parsed(o));
        }
        slots
    }

    fn scenarios(n: usize) -> Vec<Scenario> {
        (1..=n)
            .map(|i| scenario_with_context(&format!("mrr_logic_errors_{i:04}"), 20))
            .collect()
    }

    fn profile(success: f64) -> ModelBaseline {
        ModelBaseline {
            success_rate: success,
            precision: 0.5,
            recall: 0.9,
            mean_iterations: 3.0,
            ..ModelBaseline::default()
        }
    }

    #[test]
    fn test_simulation_is_deterministic() {
        let s = scenarios(20);
        assert_eq!(simulate_outputs(&s, &profile(0.6), 4), simulate_outputs(&s, &profile(0.6), 4));
        assert_ne!(simulate_outputs(&s, &profile(0.6), 4), simulate_outputs(&s, &profile(0.6), 5));
    }

    #[test]
    fn test_output_independent_of_batch() {
        let s = scenarios(10);
        let batch = simulate_outputs(&s, &profile(0.5), 9);
        assert_eq!(batch[6], simulate_output(&s[6], &profile(0.5), 9));
    }

    #[test]
    fn test_extreme_profiles() {
        let s = scenarios(30);
        let eval = Evaluator::new(EvalConfig {
            bootstrap_resamples: 50,
            ..EvalConfig::default()
        });

        let outputs = slots(simulate_outputs(&s, &profile(1.0), 1));
        let (_, report) = eval.run("perfect", &s, &outputs, None);
        assert_eq!(report.overall.success_rate.mean, 1.0);
        assert_eq!(report.overall.root_cause_accuracy, 1.0);

        let outputs = slots(simulate_outputs(&s, &profile(0.0), 1));
        let (_, report) = eval.run("hopeless", &s, &outputs, None);
        assert_eq!(report.overall.success_rate.mean, 0.0);
    }

    #[test]
    fn test_out_of_range_profile_does_not_panic() {
        let s = scenarios(3);
        let weird = ModelBaseline {
            success_rate: 7.0,
            precision: -1.0,
            recall: f64::NAN,
            ..ModelBaseline::default()
        };
        let outputs = simulate_outputs(&s, &weird, 2);
        assert_eq!(outputs.len(), 3);
    }
}
