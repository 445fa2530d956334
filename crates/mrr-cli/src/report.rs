//! Rendering of evaluation reports, comparisons and validation results.

use std::path::Path;

use anyhow::{Context, Result};

use mrr_core::evaluator::{MetricComparison, MetricSummary};
use mrr_core::{Comparison, GroupStats, Report, RunRecord, ScenarioOutcome, ValidationReport};

const RULE: usize = 86;

fn pct(x: f64) -> String {
    format!("{:.1}%", x * 100.0)
}

fn fmt_summary(m: &MetricSummary) -> String {
    format!("{} [{}, {}]", pct(m.mean), pct(m.ci.lower), pct(m.ci.upper))
}

fn fmt_delta(stats: &GroupStats) -> String {
    match stats.baseline_delta() {
        Some(d) => format!("{:+.1}pp", d * 100.0),
        None => "-".into(),
    }
}

// ---------------------------------------------------------------------------
// Terminal
// ---------------------------------------------------------------------------

fn print_group_row(label: &str, stats: &GroupStats) {
    println!(
        "{:<20} {:>5} {:>24} {:>8} {:>8} {:>7} {:>6} {:>9}",
        label,
        stats.tally.scenarios,
        fmt_summary(&stats.success_rate),
        pct(stats.precision.mean),
        pct(stats.recall.mean),
        pct(stats.root_cause_accuracy),
        format!("{:.1}", stats.mean_iterations),
        fmt_delta(stats),
    );
}

pub fn print_report(report: &Report) {
    println!(
        "MRR Evaluation: {} ({} scenarios, k={}, {:.0}% CI)",
        report.model,
        report.sample_size,
        report.k,
        report.confidence * 100.0
    );
    println!("{}", "─".repeat(RULE));
    println!(
        "{:<20} {:>5} {:>24} {:>8} {:>8} {:>7} {:>6} {:>9}",
        "Category", "N", "Success [CI]", "P@k", "R@k", "Cause", "Iter", "vs base"
    );
    println!("{}", "─".repeat(RULE));
    for (category, stats) in &report.categories {
        print_group_row(category.as_str(), stats);
    }
    println!("{}", "─".repeat(RULE));
    print_group_row("overall", &report.overall);

    let t = &report.overall.tally;
    if t.missing > 0 || t.malformed > 0 {
        println!();
        println!(
            "{} scenarios had no output and {} had malformed output (scored as failures).",
            t.missing, t.malformed
        );
    }
}

fn print_comparison_rows(rows: &[MetricComparison]) {
    for row in rows {
        let (d, magnitude) = match (row.cohens_d, row.magnitude) {
            (Some(d), Some(m)) => (format!("{d:+.3}"), m.to_string()),
            _ => ("n/a".into(), "-".into()),
        };
        println!(
            "  {:<12} {:>10.3} {:>10.3} {:>9} {:>11}",
            row.metric, row.mean_a, row.mean_b, d, magnitude
        );
    }
}

pub fn print_comparison(comparison: &Comparison, a: &RunRecord, b: &RunRecord) {
    println!("A: {} ({}, {} scenarios)", a.id, a.model, a.sample_size);
    println!("B: {} ({}, {} scenarios)", b.id, b.model, b.sample_size);
    if a.dataset_fingerprint != b.dataset_fingerprint {
        println!("warning: runs were evaluated against different scenario sets");
    }
    println!("{}", "─".repeat(58));
    println!(
        "  {:<12} {:>10} {:>10} {:>9} {:>11}",
        "Metric", "A", "B", "d", "Effect"
    );
    println!("overall");
    print_comparison_rows(&comparison.overall);
    for (category, rows) in &comparison.categories {
        println!("{category}");
        print_comparison_rows(rows);
    }
}

pub fn print_validation(report: &ValidationReport) {
    for issue in &report.issues {
        println!(
            "{:<7} {:<20} {}: {}",
            issue.severity, issue.kind, issue.location, issue.message
        );
    }
    if !report.issues.is_empty() {
        println!();
    }
    println!("Scenarios: {}", report.scenarios);
    for (category, count) in &report.counts {
        println!("  {category:<20} {count}");
    }
    let errors = report.errors().count();
    let warnings = report.warnings().count();
    println!("Errors: {errors}  Warnings: {warnings}");
    if report.is_publishable() {
        println!("Result: publishable");
    } else {
        println!("Result: NOT publishable");
    }
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

pub fn render_markdown(report: &Report, run_id: Option<&str>, dataset: &str) -> String {
    let mut md = format!("# MRR evaluation: {}\n\n", report.model);
    if let Some(id) = run_id {
        md.push_str(&format!("- Run: `{id}`\n"));
    }
    md.push_str(&format!("- Scenarios: `{dataset}`\n"));
    md.push_str(&format!("- Sample size: {}\n", report.sample_size));
    md.push_str(&format!("- k: {}\n", report.k));
    md.push_str(&format!("- Confidence level: {:.0}%\n\n", report.confidence * 100.0));
    md.push_str(
        "| Category | N | Success | CI | Precision@k | Recall@k | Root cause | Location | Iterations | vs baseline |\n",
    );
    md.push_str("|---|---:|---:|---|---:|---:|---:|---:|---:|---:|\n");

    let row = |label: &str, s: &GroupStats| {
        format!(
            "| {label} | {} | {} | [{}, {}] | {} | {} | {} | {} | {:.2} | {} |\n",
            s.tally.scenarios,
            pct(s.success_rate.mean),
            pct(s.success_rate.ci.lower),
            pct(s.success_rate.ci.upper),
            pct(s.precision.mean),
            pct(s.recall.mean),
            pct(s.root_cause_accuracy),
            pct(s.location_accuracy),
            s.mean_iterations,
            fmt_delta(s),
        )
    };
    for (category, stats) in &report.categories {
        md.push_str(&row(category.as_str(), stats));
    }
    md.push_str(&row("**overall**", &report.overall));

    let t = &report.overall.tally;
    md.push_str(&format!(
        "\nEvaluated: {}, missing output: {}, malformed output: {}.\n",
        t.evaluated, t.missing, t.malformed
    ));
    md
}

/// Write `report.json`, `report.md` and `outcomes.jsonl` into `dir`.
pub fn write_run_files(
    dir: &Path,
    report: &Report,
    outcomes: &[ScenarioOutcome],
    markdown: &str,
) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut json = serde_json::to_string_pretty(report)?;
    json.push('\n');
    std::fs::write(dir.join("report.json"), json).context("writing report.json")?;
    std::fs::write(dir.join("report.md"), markdown).context("writing report.md")?;

    let mut sorted: Vec<&ScenarioOutcome> = outcomes.iter().collect();
    sorted.sort_by(|a, b| a.bug_id.cmp(&b.bug_id));
    let mut lines = String::new();
    for outcome in sorted {
        lines.push_str(&serde_json::to_string(outcome)?);
        lines.push('\n');
    }
    std::fs::write(dir.join("outcomes.jsonl"), lines).context("writing outcomes.jsonl")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrr_core::{insert_output, simulate_outputs, Category, EvalConfig, Evaluator, GeneratorConfig};
    use mrr_core::{ModelBaseline, ModelOutput, OutputSlot, ScenarioGenerator};
    use std::collections::HashMap;

    fn slots(outputs: Vec<ModelOutput>) -> HashMap<String, OutputSlot> {
        let mut slots = HashMap::new();
        for o in outputs {
            insert_output(&mut slots, o.bug_id.clone(), OutputSlot::Parsed(o));
        }
        slots
    }

    fn run() -> (Vec<ScenarioOutcome>, Report) {
        let generator = ScenarioGenerator::new(GeneratorConfig {
            quotas: [(Category::LogicErrors, 6), (Category::ApiMisuse, 4)].into_iter().collect(),
            artifact_count: 0,
            ..GeneratorConfig::default()
        });
        let scenarios: Vec<_> = [Category::LogicErrors, Category::ApiMisuse]
            .into_iter()
            .flat_map(|c| generator.category(c, &[]))
            .collect();
        let profile = ModelBaseline {
            success_rate: 0.5,
            precision: 0.7,
            recall: 0.7,
            mean_iterations: 3.0,
            ..ModelBaseline::default()
        };
        let outputs = slots(simulate_outputs(&scenarios, &profile, 1));
        let evaluator = Evaluator::new(EvalConfig {
            bootstrap_resamples: 20,
            ..EvalConfig::default()
        });
        evaluator.run("chronos", &scenarios, &outputs, Some(&profile))
    }

    #[test]
    fn test_markdown_has_every_category() {
        let (_, report) = run();
        let md = render_markdown(&report, Some("01ABC"), "/data/mrr");
        assert!(md.starts_with("# MRR evaluation: chronos"));
        assert!(md.contains("| logic_errors | 6 |"));
        assert!(md.contains("| api_misuse | 4 |"));
        assert!(md.contains("| **overall** | 10 |"));
        assert!(md.contains("`01ABC`"));
    }

    #[test]
    fn test_write_run_files() {
        let dir = tempfile::tempdir().unwrap();
        let (outcomes, report) = run();
        let md = render_markdown(&report, None, "x");
        write_run_files(dir.path(), &report, &outcomes, &md).unwrap();

        let json = std::fs::read_to_string(dir.path().join("report.json")).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sample_size, 10);
        let lines = std::fs::read_to_string(dir.path().join("outcomes.jsonl")).unwrap();
        assert_eq!(lines.lines().count(), 10);
        assert!(dir.path().join("report.md").is_file());
    }

    #[test]
    fn test_pct() {
        assert_eq!(pct(0.6734), "67.3%");
        assert_eq!(pct(0.0), "0.0%");
    }
}
