mod config;
mod outputs;
mod report;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use mrr_core::scenario::{standard_quotas, ContextKind, Obfuscation};
use mrr_core::{
    compare, sample_scenarios, simulate_outputs, validate, Category, Evaluator, GeneratorConfig,
    Language, RunLedger, RunRecord, Scenario, ScenarioGenerator, ScenarioStore,
};
use mrr_store::{DirStore, SqliteLedger};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mrr",
    version,
    about = "Multi Random Retrieval - debugging benchmark generator and evaluator"
)]
struct Cli {
    /// Path to the SQLite run ledger
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a scenario set
    Generate {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        /// Generation seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Number of shared artifacts
        #[arg(short, long)]
        artifacts: Option<usize>,

        /// Cap every category at this many scenarios (smoke tests)
        #[arg(long)]
        limit_per_category: Option<usize>,

        /// Overwrite a non-empty output directory
        #[arg(long)]
        force: bool,
    },

    /// Check a scenario set for structural problems
    Validate {
        /// Scenario directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Fail on warnings too
        #[arg(long)]
        strict: bool,
    },

    /// Evaluate model outputs against a scenario set
    Run {
        /// Scenario directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Model name (used for baselines and the ledger)
        #[arg(short, long)]
        model: String,

        /// Model outputs (JSON array or JSON Lines)
        #[arg(long)]
        outputs: PathBuf,

        /// Number of scenarios to sample (default: all)
        #[arg(short, long)]
        count: Option<usize>,

        /// Sampling and bootstrap seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Directory for report.json / report.md
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Cut-off for precision@k and recall@k
        #[arg(short, long)]
        k: Option<usize>,

        /// Don't record the run in the ledger
        #[arg(long)]
        no_record: bool,
    },

    /// Produce synthetic model outputs from a configured baseline profile
    Simulate {
        /// Scenario directory
        #[arg(short, long)]
        dir: PathBuf,

        /// Baseline profile name from [baselines.<name>]
        #[arg(short, long)]
        profile: String,

        /// Output file (JSON Lines)
        #[arg(short, long)]
        out: PathBuf,

        /// Number of scenarios to sample (default: all)
        #[arg(short, long)]
        count: Option<usize>,

        /// Simulation seed
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Compare two recorded runs (Cohen's d per metric)
    Compare {
        /// Run A
        run_a: String,

        /// Run B
        run_b: String,
    },

    /// Recorded runs
    Runs {
        #[command(subcommand)]
        command: RunsCommands,
    },

    /// Show category, language and complexity breakdown of a scenario set
    Stats {
        /// Scenario directory
        #[arg(short, long)]
        dir: PathBuf,
    },

    /// Show active configuration
    Config,
}

#[derive(Subcommand)]
enum RunsCommands {
    /// List recorded runs, newest first
    List {
        /// Filter by model
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Show the report of a run
    Show {
        /// Run ID
        id: String,
    },

    /// Delete a run and its outcomes
    Delete {
        /// Run ID
        id: String,
    },
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "mrr", "mrr")
        .map(|dirs| dirs.data_dir().join("runs.db"))
        .unwrap_or_else(|| PathBuf::from("runs.db"))
}

fn open_ledger(db: Option<PathBuf>, cfg: &config::Config) -> Result<SqliteLedger> {
    let path = db
        .or_else(|| cfg.ledger.path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path);
    SqliteLedger::new(&path).context("failed to open run ledger")
}

fn open_scenarios(dir: &Path) -> Result<DirStore> {
    DirStore::open(dir).with_context(|| format!("opening scenario directory {}", dir.display()))
}

/// WARN unless `RUST_LOG` says otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn main() -> Result<()> {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config()?;

    match cli.command {
        Commands::Generate {
            out,
            seed,
            artifacts,
            limit_per_category,
            force,
        } => cmd_generate(&cfg, &out, seed, artifacts, limit_per_category, force),
        Commands::Validate { dir, json, strict } => {
            if !cmd_validate(&dir, json, strict)? {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Run {
            dir,
            model,
            outputs,
            count,
            seed,
            out,
            k,
            no_record,
        } => {
            let ledger = if no_record {
                None
            } else {
                Some(open_ledger(cli.db, &cfg)?)
            };
            let args = RunArgs {
                dir,
                model,
                outputs,
                count,
                seed,
                out,
                k,
            };
            cmd_run(&cfg, ledger.as_ref(), args)
        }
        Commands::Simulate {
            dir,
            profile,
            out,
            count,
            seed,
        } => cmd_simulate(&cfg, &dir, &profile, &out, count, seed),
        Commands::Compare { run_a, run_b } => {
            let ledger = open_ledger(cli.db, &cfg)?;
            cmd_compare(&ledger, &run_a, &run_b)
        }
        Commands::Runs { command } => {
            let ledger = open_ledger(cli.db, &cfg)?;
            match command {
                RunsCommands::List { model } => cmd_runs_list(&ledger, model.as_deref()),
                RunsCommands::Show { id } => cmd_runs_show(&ledger, &id),
                RunsCommands::Delete { id } => cmd_runs_delete(&ledger, &id),
            }
        }
        Commands::Stats { dir } => cmd_stats(&dir),
        Commands::Config => cmd_config(&cfg),
    }
}

// ---------------------------------------------------------------------------
// Scenario set commands
// ---------------------------------------------------------------------------

fn cmd_generate(
    cfg: &config::Config,
    out: &Path,
    seed: Option<u64>,
    artifacts: Option<usize>,
    limit_per_category: Option<usize>,
    force: bool,
) -> Result<()> {
    let mut quotas = standard_quotas();
    if let Some(limit) = limit_per_category {
        for quota in quotas.values_mut() {
            *quota = (*quota).min(limit);
        }
    }
    let generator = ScenarioGenerator::new(GeneratorConfig {
        seed: seed.unwrap_or(cfg.generator.seed),
        quotas,
        artifact_count: artifacts.unwrap_or(cfg.generator.artifacts),
        ..GeneratorConfig::default()
    });

    let store = DirStore::create(out, force)
        .with_context(|| format!("preparing output directory {}", out.display()))?;

    let t0 = Instant::now();
    let summary = generator
        .generate_into(&store)
        .context("scenario generation failed")?;
    let elapsed = t0.elapsed().as_secs_f64();

    println!(
        "Generated {} scenarios and {} artifacts in {:.2}s",
        summary.scenarios, summary.artifacts, elapsed
    );
    for (category, count) in &summary.metadata.quotas {
        println!("  {category:<20} {count}");
    }
    println!("Seed:        {}", summary.metadata.seed);
    if let Some(fp) = &summary.metadata.fingerprint {
        println!("Fingerprint: {fp}");
    }
    println!("Output:      {}", out.display());
    Ok(())
}

/// Returns whether the set passed.
fn cmd_validate(dir: &Path, json: bool, strict: bool) -> Result<bool> {
    let store = open_scenarios(dir)?;
    let report = validate(&store, true).context("validation failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report::print_validation(&report);
    }

    let warnings = report.warnings().count();
    Ok(report.is_publishable() && !(strict && warnings > 0))
}

fn load_scenarios(store: &DirStore) -> Result<Vec<Scenario>> {
    if store.metadata()?.is_none() {
        bail!(
            "{} has no metadata.json; is it a scenario directory?",
            store.root().display()
        );
    }
    let scan = store.scan()?;
    let malformed = scan.malformed().count();
    if malformed > 0 {
        tracing::warn!(malformed, "skipping unreadable scenario files (run `mrr validate`)");
    }
    let duplicates = scan.duplicate_ids();
    if !duplicates.is_empty() {
        bail!(
            "{} defines {} bug id(s) more than once (first: {}); run `mrr validate --dir {}`",
            store.root().display(),
            duplicates.len(),
            duplicates[0],
            store.root().display()
        );
    }
    let scenarios = scan.into_scenarios();
    if scenarios.is_empty() {
        bail!("no scenarios found in {}", store.root().display());
    }
    Ok(scenarios)
}

fn cmd_stats(dir: &Path) -> Result<()> {
    let store = open_scenarios(dir)?;
    let scenarios = load_scenarios(&store)?;
    let n = scenarios.len() as f64;

    let mut categories: BTreeMap<Category, usize> = BTreeMap::new();
    let mut languages: BTreeMap<Language, usize> = BTreeMap::new();
    let mut obfuscation: BTreeMap<Obfuscation, usize> = BTreeMap::new();
    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    let (mut spatial, mut temporal, mut must, mut should) = (0usize, 0u64, 0usize, 0usize);

    for s in &scenarios {
        *categories.entry(s.category).or_default() += 1;
        *languages.entry(s.language).or_default() += 1;
        *obfuscation.entry(s.complexity.obfuscation).or_default() += 1;
        for c in &s.scattered_context {
            let kind = match c.kind {
                ContextKind::Code => "code",
                ContextKind::Test => "test",
                ContextKind::Config => "config",
                ContextKind::Doc => "doc",
                ContextKind::Log => "log",
                ContextKind::Commit => "commit",
            };
            *kinds.entry(kind.to_string()).or_default() += 1;
        }
        spatial += s.complexity.spatial_files;
        temporal += u64::from(s.complexity.temporal_months);
        must += s.ground_truth.must_find_files.len();
        should += s.ground_truth.should_find_files.len();
    }

    println!("Scenarios: {}", scenarios.len());
    println!();
    println!("{:<20} {:>6} {:>7}", "Category", "Count", "Share");
    println!("{}", "-".repeat(35));
    for (category, count) in &categories {
        println!("{category:<20} {count:>6} {:>6.1}%", *count as f64 / n * 100.0);
    }
    println!();
    println!("{:<20} {:>6}", "Language", "Count");
    println!("{}", "-".repeat(27));
    for (language, count) in &languages {
        println!("{:<20} {count:>6}", language.to_string());
    }
    println!();
    println!("{:<20} {:>6}", "Obfuscation", "Count");
    println!("{}", "-".repeat(27));
    for (level, count) in &obfuscation {
        println!("{:<20} {count:>6}", level.to_string());
    }
    println!();
    println!("{:<20} {:>6}", "Context kind", "Files");
    println!("{}", "-".repeat(27));
    for (kind, count) in &kinds {
        println!("{kind:<20} {count:>6}");
    }
    println!();
    println!("Avg spatial files:  {:.1}", spatial as f64 / n);
    println!("Avg temporal span:  {:.1} months", temporal as f64 / n);
    println!("Avg must-find:      {:.2}", must as f64 / n);
    println!("Avg should-find:    {:.2}", should as f64 / n);
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation commands
// ---------------------------------------------------------------------------

struct RunArgs {
    dir: PathBuf,
    model: String,
    outputs: PathBuf,
    count: Option<usize>,
    seed: Option<u64>,
    out: Option<PathBuf>,
    k: Option<usize>,
}

/// Keep model names usable as a directory name.
fn path_safe(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn cmd_run(cfg: &config::Config, ledger: Option<&SqliteLedger>, args: RunArgs) -> Result<()> {
    let store = open_scenarios(&args.dir)?;
    let metadata = store.metadata()?;
    let scenarios = load_scenarios(&store)?;

    let mut eval_config = cfg.evaluation.eval.clone();
    if let Some(seed) = args.seed {
        eval_config.seed = seed;
    }
    if let Some(k) = args.k {
        if k == 0 {
            bail!("--k must be at least 1");
        }
        eval_config.k = k;
    }
    let seed = eval_config.seed;

    let total = scenarios.len();
    let count = args.count.or(cfg.evaluation.sample_size).unwrap_or(total);
    let sample = sample_scenarios(scenarios, count, seed);
    tracing::info!(sampled = sample.len(), total, "scenarios selected");

    let loaded = outputs::load_outputs(&args.outputs)?;
    let known = sample.iter().filter(|s| loaded.slots.contains_key(&s.bug_id)).count();
    if known < loaded.slots.len() {
        tracing::debug!(
            unused = loaded.slots.len() - known,
            "outputs for scenarios outside the sample ignored"
        );
    }

    let baseline = cfg.baselines.get(&args.model);
    if baseline.is_none() {
        tracing::debug!(model = %args.model, "no baseline configured");
    }

    let evaluator = Evaluator::new(eval_config);
    let (outcomes, report) = evaluator.run(&args.model, &sample, &loaded.slots, baseline);

    report::print_report(&report);

    let dataset = args.dir.display().to_string();
    let fingerprint = metadata.and_then(|m| m.fingerprint);
    let run_id = match ledger {
        Some(ledger) => {
            let run = RunRecord::new(report.clone(), dataset.clone(), fingerprint, seed);
            let id = ledger.record_run(&run, &outcomes)?;
            println!();
            println!("Recorded run {id}");
            Some(id)
        }
        None => None,
    };

    let out = args.out.unwrap_or_else(|| {
        PathBuf::from("mrr-results").join(run_id.clone().unwrap_or_else(|| path_safe(&args.model)))
    });
    let markdown = report::render_markdown(&report, run_id.as_deref(), &dataset);
    report::write_run_files(&out, &report, &outcomes, &markdown)?;
    println!("Reports written to {}", out.display());
    Ok(())
}

fn cmd_simulate(
    cfg: &config::Config,
    dir: &Path,
    profile: &str,
    out: &Path,
    count: Option<usize>,
    seed: Option<u64>,
) -> Result<()> {
    let Some(baseline) = cfg.baselines.get(profile) else {
        let known: Vec<&str> = cfg.baselines.names().collect();
        if known.is_empty() {
            bail!("no baseline profiles configured; add a [baselines.{profile}] section to the config");
        }
        bail!("unknown profile '{profile}' (configured: {})", known.join(", "));
    };

    let store = open_scenarios(dir)?;
    let scenarios = load_scenarios(&store)?;
    let seed = seed.unwrap_or(cfg.evaluation.eval.seed);
    let total = scenarios.len();
    let sample = sample_scenarios(scenarios, count.unwrap_or(total), seed);

    let simulated = simulate_outputs(&sample, baseline, seed);
    let mut lines = String::new();
    for output in &simulated {
        lines.push_str(&serde_json::to_string(output)?);
        lines.push('\n');
    }
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(out, lines).with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Simulated {} outputs for profile '{profile}' -> {}",
        simulated.len(),
        out.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger commands
// ---------------------------------------------------------------------------

fn resolve_run(ledger: &SqliteLedger, id: &str) -> Result<RunRecord> {
    ledger
        .get_run(id)?
        .with_context(|| format!("run not found: {id}"))
}

fn cmd_compare(ledger: &SqliteLedger, a: &str, b: &str) -> Result<()> {
    let run_a = resolve_run(ledger, a)?;
    let run_b = resolve_run(ledger, b)?;
    let outcomes_a = ledger.outcomes(&run_a.id)?;
    let outcomes_b = ledger.outcomes(&run_b.id)?;

    let comparison = compare(&outcomes_a, &outcomes_b);
    report::print_comparison(&comparison, &run_a, &run_b);
    Ok(())
}

fn cmd_runs_list(ledger: &SqliteLedger, model: Option<&str>) -> Result<()> {
    let runs = ledger.list_runs(model)?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    println!(
        "{:<26} {:<16} {:<16} {:>6} {:>8}",
        "ID", "Created", "Model", "N", "Success"
    );
    println!("{}", "-".repeat(76));
    for run in &runs {
        println!(
            "{:<26} {:<16} {:<16} {:>6} {:>7.1}%",
            run.id,
            run.created_at.format("%Y-%m-%d %H:%M"),
            truncate(&run.model, 16),
            run.sample_size,
            run.report.overall.success_rate.mean * 100.0
        );
    }
    Ok(())
}

fn cmd_runs_show(ledger: &SqliteLedger, id: &str) -> Result<()> {
    let run = resolve_run(ledger, id)?;
    println!("Run:       {}", run.id);
    println!("Created:   {}", run.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Scenarios: {}", run.dataset);
    if let Some(fp) = &run.dataset_fingerprint {
        println!("Digest:    {fp}");
    }
    println!("Seed:      {}", run.seed);
    println!();
    report::print_report(&run.report);
    Ok(())
}

fn cmd_runs_delete(ledger: &SqliteLedger, id: &str) -> Result<()> {
    ledger.delete_run(id)?;
    println!("Deleted: {id}");
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config(cfg: &config::Config) -> Result<()> {
    println!("Config: {}", config::show_config_path());
    println!();
    println!("[generator]");
    println!("  seed = {}", cfg.generator.seed);
    println!("  artifacts = {}", cfg.generator.artifacts);
    println!();
    let eval = &cfg.evaluation.eval;
    println!("[evaluation]");
    println!("  k = {}", eval.k);
    println!("  bootstrap_resamples = {}", eval.bootstrap_resamples);
    println!("  confidence = {}", eval.confidence);
    println!("  max_iterations = {}", eval.max_iterations);
    println!("  root_cause_min_matches = {}", eval.root_cause_min_matches);
    println!(
        "  workers = {}",
        if eval.workers == 0 {
            "auto".to_string()
        } else {
            eval.workers.to_string()
        }
    );
    println!("  seed = {}", eval.seed);
    if let Some(n) = cfg.evaluation.sample_size {
        println!("  sample_size = {n}");
    }
    println!();
    println!("[ledger]");
    println!(
        "  path = {}",
        cfg.ledger
            .path
            .clone()
            .unwrap_or_else(|| format!("{} (default)", default_db_path().display()))
    );
    for (name, baseline) in &cfg.baselines.models {
        println!();
        println!("[baselines.{name}]");
        println!("  success_rate = {}", baseline.success_rate);
        println!("  precision = {}", baseline.precision);
        println!("  recall = {}", baseline.recall);
        println!("  mean_iterations = {}", baseline.mean_iterations);
        for (category, rate) in &baseline.categories {
            println!("  categories.{category} = {rate}");
        }
    }
    Ok(())
}
