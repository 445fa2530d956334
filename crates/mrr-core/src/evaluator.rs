//! Scores model outputs against ground truth and aggregates the results.
//!
//! Aggregates never depend on input order: outcomes are put in canonical
//! `bug_id` order before any floating-point sum or bootstrap draw.

use std::collections::{BTreeMap, HashMap};

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::baseline::ModelBaseline;
use crate::metrics::{score_scenario, ScoringParams};
use crate::outcome::{OutcomeStatus, OutputSlot, ScenarioOutcome};
use crate::scenario::{Category, Scenario};
use crate::seed::{stream_rng, DEFAULT_SEED};
use crate::stats::{bootstrap_mean_ci, cohens_d, ConfidenceInterval, EffectMagnitude};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Cut-off for precision@k / recall@k.
    pub k: usize,
    pub bootstrap_resamples: usize,
    /// Confidence level of the bootstrap intervals, e.g. 0.95.
    pub confidence: f64,
    /// Iteration cap; also charged to scenarios without output.
    pub max_iterations: u32,
    pub root_cause_min_matches: usize,
    /// Scoring threads. 0 means available parallelism.
    pub workers: usize,
    pub seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            k: 10,
            bootstrap_resamples: 1000,
            confidence: 0.95,
            max_iterations: 10,
            root_cause_min_matches: 2,
            workers: 0,
            seed: DEFAULT_SEED,
        }
    }
}

// ---------------------------------------------------------------------------
// Tally
// ---------------------------------------------------------------------------

/// Additive summary of a set of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub scenarios: usize,
    pub evaluated: usize,
    pub missing: usize,
    pub malformed: usize,
    pub fix_successes: usize,
    pub root_cause_matches: usize,
    pub location_matches: usize,
    pub precision_sum: f64,
    pub recall_sum: f64,
    pub should_recall_sum: f64,
    pub iterations_sum: u64,
}

impl Tally {
    pub fn record(&mut self, outcome: &ScenarioOutcome) {
        self.scenarios += 1;
        match outcome.status {
            OutcomeStatus::Evaluated => self.evaluated += 1,
            OutcomeStatus::MissingOutput => self.missing += 1,
            OutcomeStatus::MalformedOutput => self.malformed += 1,
        }
        self.fix_successes += usize::from(outcome.fix_success);
        self.root_cause_matches += usize::from(outcome.root_cause_match);
        self.location_matches += usize::from(outcome.location_match);
        self.precision_sum += outcome.precision_at_k;
        self.recall_sum += outcome.recall_at_k;
        self.should_recall_sum += outcome.should_recall_at_k;
        self.iterations_sum += u64::from(outcome.iterations);
    }

    pub fn merge(mut self, other: &Tally) -> Tally {
        self.scenarios += other.scenarios;
        self.evaluated += other.evaluated;
        self.missing += other.missing;
        self.malformed += other.malformed;
        self.fix_successes += other.fix_successes;
        self.root_cause_matches += other.root_cause_matches;
        self.location_matches += other.location_matches;
        self.precision_sum += other.precision_sum;
        self.recall_sum += other.recall_sum;
        self.should_recall_sum += other.should_recall_sum;
        self.iterations_sum += other.iterations_sum;
        self
    }

    fn ratio(&self, n: f64) -> f64 {
        if self.scenarios == 0 {
            0.0
        } else {
            n / self.scenarios as f64
        }
    }

    pub fn success_rate(&self) -> f64 {
        self.ratio(self.fix_successes as f64)
    }

    pub fn mean_precision(&self) -> f64 {
        self.ratio(self.precision_sum)
    }

    pub fn mean_recall(&self) -> f64 {
        self.ratio(self.recall_sum)
    }

    pub fn mean_should_recall(&self) -> f64 {
        self.ratio(self.should_recall_sum)
    }

    pub fn root_cause_accuracy(&self) -> f64 {
        self.ratio(self.root_cause_matches as f64)
    }

    pub fn location_accuracy(&self) -> f64 {
        self.ratio(self.location_matches as f64)
    }

    pub fn mean_iterations(&self) -> f64 {
        self.ratio(self.iterations_sum as f64)
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub ci: ConfidenceInterval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub tally: Tally,
    pub success_rate: MetricSummary,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
    pub should_recall: f64,
    pub root_cause_accuracy: f64,
    pub location_accuracy: f64,
    pub mean_iterations: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_success: Option<f64>,
}

impl GroupStats {
    pub fn baseline_delta(&self) -> Option<f64> {
        self.baseline_success.map(|b| self.success_rate.mean - b)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub model: String,
    pub k: usize,
    pub confidence: f64,
    pub sample_size: usize,
    pub overall: GroupStats,
    pub categories: BTreeMap<Category, GroupStats>,
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

pub struct Evaluator {
    config: EvalConfig,
}

impl Evaluator {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn scoring_params(&self) -> ScoringParams {
        ScoringParams {
            k: self.config.k.max(1),
            max_iterations: self.config.max_iterations,
            root_cause_min_matches: self.config.root_cause_min_matches,
        }
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let wanted = if self.config.workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.config.workers
        };
        wanted.clamp(1, jobs.max(1))
    }

    /// Score every scenario. Results come back in scenario order.
    pub fn evaluate(
        &self,
        scenarios: &[Scenario],
        outputs: &HashMap<String, OutputSlot>,
    ) -> Vec<ScenarioOutcome> {
        let params = self.scoring_params();
        let workers = self.worker_count(scenarios.len());
        if workers == 1 {
            return scenarios
                .iter()
                .map(|s| score_scenario(s, outputs.get(&s.bug_id), &params))
                .collect();
        }

        let chunk_size = scenarios.len().div_ceil(workers);
        tracing::debug!(workers, chunk_size, "scoring scenarios in parallel");
        std::thread::scope(|scope| {
            let handles: Vec<_> = scenarios
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|s| score_scenario(s, outputs.get(&s.bug_id), &params))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                .collect()
        })
    }

    /// Build per-category and overall statistics.
    pub fn aggregate(
        &self,
        model: &str,
        outcomes: &[ScenarioOutcome],
        baseline: Option<&ModelBaseline>,
    ) -> Report {
        let mut sorted: Vec<&ScenarioOutcome> = outcomes.iter().collect();
        sorted.sort_by(|a, b| a.bug_id.cmp(&b.bug_id));

        let mut by_category: BTreeMap<Category, Vec<&ScenarioOutcome>> = BTreeMap::new();
        for outcome in sorted.iter().copied() {
            by_category.entry(outcome.category).or_default().push(outcome);
        }

        let categories: BTreeMap<Category, GroupStats> = by_category
            .iter()
            .map(|(category, group)| {
                let tally = group.iter().fold(Tally::default(), |mut t, o| {
                    t.record(o);
                    t
                });
                let stats = self.group_stats(
                    category.as_str(),
                    group,
                    tally,
                    baseline.map(|b| b.success_for(*category)),
                );
                (*category, stats)
            })
            .collect();

        // Categories partition the outcomes, so their tallies reduce to the overall one.
        let overall_tally = categories
            .values()
            .fold(Tally::default(), |acc, stats| acc.merge(&stats.tally));
        let overall = self.group_stats(
            "overall",
            &sorted,
            overall_tally,
            baseline.map(|b| b.success_rate),
        );

        Report {
            model: model.to_string(),
            k: self.scoring_params().k,
            confidence: self.config.confidence,
            sample_size: outcomes.len(),
            overall,
            categories,
        }
    }

    pub fn run(
        &self,
        model: &str,
        scenarios: &[Scenario],
        outputs: &HashMap<String, OutputSlot>,
        baseline: Option<&ModelBaseline>,
    ) -> (Vec<ScenarioOutcome>, Report) {
        let outcomes = self.evaluate(scenarios, outputs);
        let report = self.aggregate(model, &outcomes, baseline);
        tracing::info!(
            model,
            scenarios = outcomes.len(),
            success_rate = report.overall.success_rate.mean,
            "evaluation complete"
        );
        (outcomes, report)
    }

    fn group_stats(
        &self,
        label: &str,
        group: &[&ScenarioOutcome],
        tally: Tally,
        baseline_success: Option<f64>,
    ) -> GroupStats {
        let success: Vec<f64> = group.iter().map(|o| f64::from(u8::from(o.fix_success))).collect();
        let precision: Vec<f64> = group.iter().map(|o| o.precision_at_k).collect();
        let recall: Vec<f64> = group.iter().map(|o| o.recall_at_k).collect();

        let summary = |metric: &str, mean: f64, values: &[f64]| {
            let mut rng = stream_rng(self.config.seed, &format!("bootstrap:{label}:{metric}"), 0);
            MetricSummary {
                mean,
                ci: bootstrap_mean_ci(
                    values,
                    self.config.bootstrap_resamples,
                    self.config.confidence,
                    &mut rng,
                ),
            }
        };

        GroupStats {
            success_rate: summary("success", tally.success_rate(), &success),
            precision: summary("precision", tally.mean_precision(), &precision),
            recall: summary("recall", tally.mean_recall(), &recall),
            should_recall: tally.mean_should_recall(),
            root_cause_accuracy: tally.root_cause_accuracy(),
            location_accuracy: tally.location_accuracy(),
            mean_iterations: tally.mean_iterations(),
            baseline_success,
            tally,
        }
    }
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Deterministic stratified sample of `n` scenarios, keeping category
/// proportions (largest remainder). Result is sorted by `bug_id`.
pub fn sample_scenarios(mut scenarios: Vec<Scenario>, n: usize, seed: u64) -> Vec<Scenario> {
    scenarios.sort_by(|a, b| a.bug_id.cmp(&b.bug_id));
    let total = scenarios.len();
    if n >= total {
        return scenarios;
    }

    let mut groups: BTreeMap<Category, Vec<Scenario>> = BTreeMap::new();
    for s in scenarios {
        groups.entry(s.category).or_default().push(s);
    }

    // Floor shares first, then hand out the remainder by largest fraction.
    let mut shares: Vec<(Category, usize, usize)> = groups
        .iter()
        .map(|(c, g)| {
            let exact = n * g.len();
            (*c, exact / total, exact % total)
        })
        .collect();
    let assigned: usize = shares.iter().map(|(_, q, _)| q).sum();
    let mut order: Vec<usize> = (0..shares.len()).collect();
    order.sort_by(|&a, &b| shares[b].2.cmp(&shares[a].2).then(shares[a].0.cmp(&shares[b].0)));
    for &i in order.iter().take(n - assigned) {
        shares[i].1 += 1;
    }

    let mut picked = Vec::with_capacity(n);
    for (category, quota, _) in shares {
        let Some(mut group) = groups.remove(&category) else {
            continue;
        };
        let mut rng = stream_rng(seed, &format!("sample:{category}"), 0);
        group.shuffle(&mut rng);
        group.truncate(quota);
        picked.extend(group);
    }
    picked.sort_by(|a, b| a.bug_id.cmp(&b.bug_id));
    picked
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: String,
    pub mean_a: f64,
    pub mean_b: f64,
    pub cohens_d: Option<f64>,
    pub magnitude: Option<EffectMagnitude>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub overall: Vec<MetricComparison>,
    pub categories: BTreeMap<Category, Vec<MetricComparison>>,
}

type MetricFn = fn(&ScenarioOutcome) -> f64;

const COMPARED_METRICS: &[(&str, MetricFn)] = &[
    ("success", |o| f64::from(u8::from(o.fix_success))),
    ("precision", |o| o.precision_at_k),
    ("recall", |o| o.recall_at_k),
    ("iterations", |o| f64::from(o.iterations)),
];

fn compare_group(a: &[&ScenarioOutcome], b: &[&ScenarioOutcome]) -> Vec<MetricComparison> {
    COMPARED_METRICS
        .iter()
        .map(|(name, f)| {
            let va: Vec<f64> = a.iter().map(|o| f(o)).collect();
            let vb: Vec<f64> = b.iter().map(|o| f(o)).collect();
            let d = cohens_d(&va, &vb);
            MetricComparison {
                metric: (*name).to_string(),
                mean_a: crate::stats::mean(&va),
                mean_b: crate::stats::mean(&vb),
                cohens_d: d,
                magnitude: d.map(EffectMagnitude::classify),
            }
        })
        .collect()
}

/// Effect sizes of run `a` over run `b`, overall and per shared category.
pub fn compare(a: &[ScenarioOutcome], b: &[ScenarioOutcome]) -> Comparison {
    fn canonical(outcomes: &[ScenarioOutcome]) -> Vec<&ScenarioOutcome> {
        let mut v: Vec<&ScenarioOutcome> = outcomes.iter().collect();
        v.sort_by(|x, y| x.bug_id.cmp(&y.bug_id));
        v
    }
    let (sa, sb) = (canonical(a), canonical(b));

    let mut categories = BTreeMap::new();
    for category in Category::ALL {
        let ga: Vec<&ScenarioOutcome> = sa.iter().copied().filter(|o| o.category == category).collect();
        let gb: Vec<&ScenarioOutcome> = sb.iter().copied().filter(|o| o.category == category).collect();
        if !ga.is_empty() && !gb.is_empty() {
            categories.insert(category, compare_group(&ga, &gb));
        }
    }

    Comparison {
        overall: compare_group(&sa, &sb),
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ModelOutput, ProposedFix};
    use crate::test_fixtures::scenario_with_context;

    fn config() -> EvalConfig {
        EvalConfig {
            bootstrap_resamples: 200,
            workers: 3,
            ..EvalConfig::default()
        }
    }

    fn passing_output(scenario: &Scenario) -> ModelOutput {
        let mut output = ModelOutput::empty(&scenario.bug_id);
        output.retrieved_files = scenario.ground_truth.must_find_files.clone();
        output.fix = Some(ProposedFix {
            file: scenario.ground_truth.fix_location.file.clone(),
            line: None,
            patch: String::new(),
            root_cause: "off-by-one in the loop".into(),
        });
        output.tests_passed = Some(true);
        output.iterations = Some(2);
        output
    }

    fn mixed_outcomes() -> Vec<ScenarioOutcome> {
        let scenarios: Vec<Scenario> = (1..=12)
            .map(|i| {
                let category = if i % 2 == 0 { "logic_errors" } else { "api_misuse" };
                scenario_with_context(&format!("mrr_{category}_{i:04}"), 10 + i)
            })
            .collect();
        let outputs: HashMap<String, OutputSlot> = scenarios
            .iter()
            .filter(|s| !s.bug_id.ends_with('3'))
            .enumerate()
            .map(|(i, s)| {
                let mut o = passing_output(s);
                if i % 3 == 0 {
                    o.tests_passed = Some(false);
                    o.retrieved_files.push("noise.py".into());
                }
                (s.bug_id.clone(), OutputSlot::Parsed(o))
            })
            .collect();
        Evaluator::new(config()).evaluate(&scenarios, &outputs)
    }

    #[test]
    fn test_logic_error_1060_success_is_tallied() {
        // Hand-built fixture; the generator draws its own pattern for this id.
        let scenario = scenario_with_context("mrr_logic_errors_1060", 30);
        assert_eq!(scenario.title, "Off-by-one error in loop boundary");
        let outputs: HashMap<String, OutputSlot> = [(
            scenario.bug_id.clone(),
            OutputSlot::Parsed(passing_output(&scenario)),
        )]
        .into_iter()
        .collect();

        let evaluator = Evaluator::new(config());
        let (outcomes, report) = evaluator.run("model", &[scenario], &outputs, None);
        assert!(outcomes[0].fix_success);
        let logic = &report.categories[&Category::LogicErrors];
        assert_eq!(logic.tally.fix_successes, 1);
        assert_eq!(report.overall.tally.fix_successes, 1);
    }

    #[test]
    fn test_evaluate_preserves_scenario_order() {
        let scenarios: Vec<Scenario> = (1..=9)
            .map(|i| scenario_with_context(&format!("mrr_memory_issues_{i:04}"), 10))
            .collect();
        let outcomes = Evaluator::new(config()).evaluate(&scenarios, &HashMap::new());
        let ids: Vec<&str> = outcomes.iter().map(|o| o.bug_id.as_str()).collect();
        let expected: Vec<&str> = scenarios.iter().map(|s| s.bug_id.as_str()).collect();
        assert_eq!(ids, expected);
        assert!(outcomes.iter().all(|o| o.status == OutcomeStatus::MissingOutput));
    }

    #[test]
    fn test_aggregate_is_order_independent() {
        let outcomes = mixed_outcomes();
        let evaluator = Evaluator::new(config());
        let forward = evaluator.aggregate("m", &outcomes, None);

        let mut reversed = outcomes.clone();
        reversed.reverse();
        let mut rotated = outcomes.clone();
        rotated.rotate_left(5);

        assert_eq!(forward, evaluator.aggregate("m", &reversed, None));
        assert_eq!(forward, evaluator.aggregate("m", &rotated, None));
    }

    #[test]
    fn test_tally_merge_matches_single_pass() {
        let outcomes = mixed_outcomes();
        let (left, right) = outcomes.split_at(5);
        let fold = |xs: &[ScenarioOutcome]| {
            xs.iter().fold(Tally::default(), |mut t, o| {
                t.record(o);
                t
            })
        };
        let merged = fold(left).merge(&fold(right));
        let whole = fold(&outcomes);
        assert_eq!(merged.scenarios, whole.scenarios);
        assert_eq!(merged.fix_successes, whole.fix_successes);
        assert_eq!(merged.missing, whole.missing);
        assert!((merged.precision_sum - whole.precision_sum).abs() < 1e-9);
        let swapped = fold(right).merge(&fold(left));
        assert_eq!(swapped.fix_successes, merged.fix_successes);
    }

    #[test]
    fn test_overall_tally_is_merge_of_categories() {
        let outcomes = mixed_outcomes();
        let report = Evaluator::new(config()).aggregate("m", &outcomes, None);
        assert_eq!(report.categories.len(), 2);
        let scenarios: usize = report.categories.values().map(|g| g.tally.scenarios).sum();
        let successes: usize = report.categories.values().map(|g| g.tally.fix_successes).sum();
        assert_eq!(report.overall.tally.scenarios, scenarios);
        assert_eq!(report.overall.tally.fix_successes, successes);
        let single_pass = outcomes.iter().fold(Tally::default(), |mut t, o| {
            t.record(o);
            t
        });
        assert_eq!(report.overall.tally.evaluated, single_pass.evaluated);
        assert!((report.overall.tally.recall_sum - single_pass.recall_sum).abs() < 1e-9);
    }

    #[test]
    fn test_compare_is_order_independent() {
        let outcomes = mixed_outcomes();
        let mut reversed = outcomes.clone();
        reversed.reverse();
        let forward = compare(&outcomes, &outcomes);
        assert_eq!(forward, compare(&reversed, &outcomes));
        let success = &forward.overall[0];
        assert_eq!(success.metric, "success");
        assert_eq!(success.mean_a, success.mean_b);
    }

    #[test]
    fn test_missing_outputs_count_as_failures() {
        let outcomes = mixed_outcomes();
        let report = Evaluator::new(config()).aggregate("m", &outcomes, None);
        // mrr_api_misuse_0003 has no output
        assert_eq!(report.overall.tally.missing, 1);
        assert_eq!(report.overall.tally.scenarios, 12);
        assert!(report.overall.success_rate.mean < 1.0);
        let ci = report.overall.success_rate.ci;
        assert!(ci.lower <= report.overall.success_rate.mean);
        assert!(report.overall.success_rate.mean <= ci.upper);
    }

    #[test]
    fn test_baseline_delta() {
        let outcomes = mixed_outcomes();
        let baseline = ModelBaseline {
            success_rate: 0.5,
            ..ModelBaseline::default()
        };
        let report = Evaluator::new(config()).aggregate("m", &outcomes, Some(&baseline));
        let delta = report.overall.baseline_delta().unwrap();
        assert!((delta - (report.overall.success_rate.mean - 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_sample_is_stratified_and_deterministic() {
        let mut scenarios = Vec::new();
        for i in 1..=30 {
            scenarios.push(scenario_with_context(&format!("mrr_logic_errors_{i:04}"), 10));
        }
        for i in 1..=10 {
            scenarios.push(scenario_with_context(&format!("mrr_syntax_errors_{i:04}"), 10));
        }
        let a = sample_scenarios(scenarios.clone(), 8, 11);
        let b = sample_scenarios(scenarios.clone(), 8, 11);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        let logic = a.iter().filter(|s| s.category == Category::LogicErrors).count();
        assert_eq!(logic, 6);

        scenarios.reverse();
        assert_eq!(sample_scenarios(scenarios.clone(), 8, 11), a);
        assert_eq!(sample_scenarios(scenarios, 100, 11).len(), 40);
    }

    #[test]
    fn test_compare_detects_difference() {
        let good = mixed_outcomes();
        let bad: Vec<ScenarioOutcome> = good
            .iter()
            .map(|o| ScenarioOutcome::failed(&o.bug_id, o.category, OutcomeStatus::MissingOutput, 10))
            .collect();
        let cmp = compare(&good, &bad);
        let success = cmp.overall.iter().find(|m| m.metric == "success").unwrap();
        assert!(success.mean_a > success.mean_b);
        assert!(success.cohens_d.is_some_and(|d| d > 0.0));
        assert!(cmp.categories.contains_key(&Category::LogicErrors));
    }
}
