//! Deterministic scenario and artifact generation.
//!
//! Scenario `i` of category `c` is drawn from its own ChaCha8 stream seeded
//! with `derive_seed(seed, c, i)`, and artifact `j` from
//! `derive_seed(seed, "artifacts", j)`. The same seed therefore reproduces
//! byte-identical files regardless of thread count or write order.

use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::catalog::{self, BugPattern};
use crate::error::{MrrError, MrrResult};
use crate::scenario::*;
use crate::seed::{index_below, stream_rng, uniform_usize, DEFAULT_SEED};
use crate::store::ScenarioStore;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub seed: u64,
    pub quotas: Quotas,
    pub artifact_count: usize,
    /// Latest point of every simulated history window.
    pub reference_time: DateTime<Utc>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            quotas: standard_quotas(),
            artifact_count: 300,
            reference_time: Utc
                .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Code,
    Doc,
    Log,
}

impl ArtifactKind {
    pub fn dir(self) -> &'static str {
        match self {
            Self::Code => "artifacts/code",
            Self::Doc => "artifacts/docs",
            Self::Log => "artifacts/logs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Store-relative path.
    pub path: String,
    pub kind: ArtifactKind,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    pub scenarios: usize,
    pub artifacts: usize,
    pub metadata: BenchmarkMetadata,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct ScenarioGenerator {
    config: GeneratorConfig,
}

impl ScenarioGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        (0..self.config.artifact_count)
            .map(|i| generate_artifact(self.config.seed, i))
            .collect()
    }

    /// Scenario `index` (1-based) of `category`.
    pub fn scenario(&self, category: Category, index: usize, artifact_paths: &[String]) -> Scenario {
        let mut rng = stream_rng(self.config.seed, category.as_str(), index as u64);
        build_scenario(
            &mut rng,
            category,
            index,
            artifact_paths,
            self.config.reference_time,
        )
    }

    pub fn category(&self, category: Category, artifact_paths: &[String]) -> Vec<Scenario> {
        let quota = self.config.quotas.get(&category).copied().unwrap_or(0);
        (1..=quota)
            .map(|i| self.scenario(category, i, artifact_paths))
            .collect()
    }

    pub fn metadata(&self) -> BenchmarkMetadata {
        BenchmarkMetadata {
            name: "Multi Random Retrieval".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            seed: self.config.seed,
            total_scenarios: self.config.quotas.values().sum(),
            quotas: self.config.quotas.clone(),
            artifact_count: self.config.artifact_count,
            languages: Language::ALL.to_vec(),
            fingerprint: None,
        }
    }

    /// Write artifacts, every scenario, and finally the metadata (with the
    /// store fingerprint) into `store`. Categories are generated in parallel.
    pub fn generate_into<S: ScenarioStore + Sync>(&self, store: &S) -> MrrResult<GenerationSummary> {
        let artifacts = self.artifacts();
        for artifact in &artifacts {
            store.write_artifact(&artifact.path, &artifact.content)?;
        }
        let paths: Vec<String> = artifacts.into_iter().map(|a| a.path).collect();
        tracing::info!(count = paths.len(), "artifacts written");

        let counts: Vec<MrrResult<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .config
                .quotas
                .keys()
                .map(|&category| {
                    let paths = &paths;
                    scope.spawn(move || -> MrrResult<usize> {
                        let scenarios = self.category(category, paths);
                        for scenario in &scenarios {
                            store.write_scenario(scenario)?;
                        }
                        tracing::debug!(%category, count = scenarios.len(), "category written");
                        Ok(scenarios.len())
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(MrrError::InvalidInput("generator worker panicked".into())))
                })
                .collect()
        });
        let scenarios = counts.into_iter().sum::<MrrResult<usize>>()?;

        let mut metadata = self.metadata();
        metadata.fingerprint = Some(store.fingerprint()?);
        store.write_metadata(&metadata)?;
        tracing::info!(scenarios, "scenario set generated");

        Ok(GenerationSummary {
            scenarios,
            artifacts: paths.len(),
            metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Scenario construction
// ---------------------------------------------------------------------------

fn pick<'a, T>(rng: &mut ChaCha8Rng, items: &'a [T]) -> &'a T {
    &items[index_below(rng, items.len())]
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

/// Yields context paths that are unique within one scenario.
struct PathFactory {
    language: Language,
    used: HashSet<String>,
}

impl PathFactory {
    fn new(language: Language) -> Self {
        Self {
            language,
            used: HashSet::new(),
        }
    }

    fn claim(&mut self, candidate: String) -> String {
        if self.used.insert(candidate.clone()) {
            return candidate;
        }
        let (stem, ext) = candidate.rsplit_once('.').unwrap_or((candidate.as_str(), ""));
        let mut n = 2;
        loop {
            let next = if ext.is_empty() {
                format!("{stem}_{n}")
            } else {
                format!("{stem}_{n}.{ext}")
            };
            if self.used.insert(next.clone()) {
                return next;
            }
            n += 1;
        }
    }

    fn path(&mut self, rng: &mut ChaCha8Rng, kind: ContextKind, module: &str) -> String {
        let ext = self.language.extension();
        let component = *pick(rng, catalog::COMPONENTS);
        let candidate = match kind {
            ContextKind::Code => format!(
                "{}/{module}/{component}.{ext}",
                catalog::source_root(self.language)
            ),
            ContextKind::Test => match self.language {
                Language::Go => format!("internal/{module}/{component}_test.go"),
                Language::Javascript => format!("test/{module}/{component}.test.js"),
                _ => format!(
                    "{}/{module}/test_{component}.{ext}",
                    catalog::test_root(self.language)
                ),
            },
            ContextKind::Config => (*pick(rng, catalog::CONFIG_FILES)).to_string(),
            ContextKind::Doc => format!("docs/{}/{module}.md", pick(rng, catalog::DOC_TOPICS)),
            ContextKind::Log => format!(
                "logs/{}/{module}-{:03}.log",
                pick(rng, catalog::LOG_SOURCES),
                rng.gen_range(1..=365u32)
            ),
            ContextKind::Commit => format!("history/{:012x}.patch", rng.gen::<u64>() >> 16),
        };
        self.claim(candidate)
    }
}

fn kind_for(rng: &mut ChaCha8Rng, relevance: Relevance) -> ContextKind {
    use ContextKind::*;
    match relevance {
        Relevance::Critical => *pick(rng, &[Code, Code, Code, Test]),
        Relevance::High => *pick(rng, &[Code, Code, Test, Config, Doc]),
        Relevance::Medium => *pick(rng, &[Code, Test, Config, Doc, Log, Commit]),
        Relevance::Low => *pick(rng, &[Code, Doc, Log, Log, Commit, Config]),
    }
}

fn context_summary(kind: ContextKind, relevance: Relevance, module: &str, pattern: &BugPattern) -> String {
    match (kind, relevance) {
        (ContextKind::Code, Relevance::Critical) => {
            format!("Core {module} logic touched by: {}", pattern.fix.to_lowercase())
        }
        (ContextKind::Code, _) => format!("Supporting {module} code path"),
        (ContextKind::Test, _) => format!("Tests covering the {module} behaviour"),
        (ContextKind::Config, _) => format!("Configuration consumed by {module}"),
        (ContextKind::Doc, _) => format!("Documentation describing {module}"),
        (ContextKind::Log, Relevance::Critical | Relevance::High) => {
            format!("Logs showing: {}", pattern.symptoms[0])
        }
        (ContextKind::Log, _) => format!("Routine {module} logs"),
        (ContextKind::Commit, _) => format!("Historical change to {module}"),
    }
}

fn random_time_between(rng: &mut ChaCha8Rng, start: DateTime<Utc>, end: DateTime<Utc>) -> DateTime<Utc> {
    let span = (end - start).num_seconds().max(0);
    start + Duration::seconds(rng.gen_range(0..=span))
}

fn build_scenario(
    rng: &mut ChaCha8Rng,
    category: Category,
    index: usize,
    artifact_paths: &[String],
    reference_time: DateTime<Utc>,
) -> Scenario {
    let pattern = pick(rng, catalog::patterns(category));
    let language = *pick(rng, &Language::ALL);
    let obfuscation = *pick(rng, &[Obfuscation::Low, Obfuscation::Medium, Obfuscation::High]);
    let spatial_files = uniform_usize(rng, MIN_SPATIAL_FILES, MAX_SPATIAL_FILES);
    let temporal_months = rng.gen_range(0..=MAX_TEMPORAL_MONTHS);

    // History window: ends up to half a year before the reference time and
    // spans `temporal_months` months plus up to four weeks.
    let end = reference_time - Duration::days(rng.gen_range(0..=180));
    let span_days = i64::from(temporal_months) * 30 + rng.gen_range(1..=28);
    let start = end - Duration::days(span_days);
    let bug_introduced = random_time_between(rng, start, end);

    let primary_module = *pick(rng, catalog::MODULES);
    let critical = uniform_usize(rng, 1, 3);
    let high = uniform_usize(rng, 2, 5);
    let medium = (spatial_files - critical - high) / 3;

    let mut paths = PathFactory::new(language);
    let mut context = Vec::with_capacity(spatial_files);
    for slot in 0..spatial_files {
        let relevance = if slot < critical {
            Relevance::Critical
        } else if slot < critical + high {
            Relevance::High
        } else if slot < critical + high + medium {
            Relevance::Medium
        } else {
            Relevance::Low
        };
        // The fix lands in the first critical file, which is always code.
        let kind = if slot == 0 {
            ContextKind::Code
        } else {
            kind_for(rng, relevance)
        };
        let module = if relevance <= Relevance::High && rng.gen_bool(0.7) {
            primary_module
        } else {
            *pick(rng, catalog::MODULES)
        };
        let file_path = paths.path(rng, kind, module);
        let modified_at = if slot == 0 {
            bug_introduced
        } else {
            random_time_between(rng, start, end)
        };
        context.push(ContextFile {
            file_path,
            relevance,
            kind,
            modified_at,
            summary: context_summary(kind, relevance, module, pattern),
        });
    }

    let must_find_files: Vec<String> = context
        .iter()
        .filter(|c| c.relevance == Relevance::Critical)
        .map(|c| c.file_path.clone())
        .collect();
    let should_find_files: Vec<String> = context
        .iter()
        .filter(|c| c.relevance == Relevance::High)
        .map(|c| c.file_path.clone())
        .collect();
    let fix_file = context[0].file_path.clone();

    // Scatter: relevant files must not sit at the top of the list.
    context.shuffle(rng);

    let line_start = rng.gen_range(12..=480);
    let line_end = line_start + rng.gen_range(0..=8);

    let symptom = pattern.symptoms[index_below(rng, pattern.symptoms.len())];
    let description = match obfuscation {
        Obfuscation::Low => format!(
            "{} in the {primary_module} module. Users report: {symptom}.",
            pattern.title
        ),
        Obfuscation::Medium => format!("Users report: {symptom}. Started some time after recent {primary_module} changes."),
        Obfuscation::High => {
            // Points at the wrong module on purpose.
            let decoys: Vec<&str> = catalog::MODULES
                .iter()
                .copied()
                .filter(|m| *m != primary_module)
                .collect();
            format!(
                "Intermittent failures reported by {} users; suspected to be infrastructure related.",
                pick(rng, &decoys)
            )
        }
    };

    let mut artifacts: Vec<String> = if artifact_paths.is_empty() {
        Vec::new()
    } else {
        let wanted = uniform_usize(rng, 1, 3).min(artifact_paths.len());
        artifact_paths
            .choose_multiple(rng, wanted)
            .cloned()
            .collect()
    };
    artifacts.sort();

    Scenario {
        bug_id: bug_id(category, index),
        category,
        language,
        title: pattern.title.to_string(),
        description,
        symptoms: pattern.symptoms.iter().map(|s| s.to_string()).collect(),
        complexity: Complexity {
            spatial_files,
            temporal_months,
            obfuscation,
        },
        scattered_context: context,
        temporal_info: TemporalInfo {
            start,
            end,
            bug_introduced,
            commit_count: rng.gen_range(5..=40) + temporal_months * 3,
        },
        ground_truth: GroundTruth {
            root_cause: pattern.root_cause.to_string(),
            root_cause_keywords: pattern.keywords.iter().map(|s| s.to_string()).collect(),
            fix_location: FixLocation {
                file: fix_file,
                line_start,
                line_end,
            },
            fix_description: pattern.fix.to_string(),
            must_find_files,
            should_find_files,
            test_name: format!("test_{primary_module}_{}", slug(pattern.title)),
        },
        artifacts,
    }
}

// ---------------------------------------------------------------------------
// Artifact construction
// ---------------------------------------------------------------------------

fn generate_artifact(seed: u64, index: usize) -> Artifact {
    let mut rng = stream_rng(seed, "artifacts", index as u64);
    let module = *pick(&mut rng, catalog::MODULES);
    let kind = match index % 3 {
        0 => ArtifactKind::Code,
        1 => ArtifactKind::Doc,
        _ => ArtifactKind::Log,
    };

    let (name, content) = match kind {
        ArtifactKind::Code => {
            let language = *pick(&mut rng, &Language::ALL);
            let component = *pick(&mut rng, catalog::COMPONENTS);
            let body = (0..rng.gen_range(6..=18u32))
                .map(|i| format!("    step_{i}({module}_{component})"))
                .collect::<Vec<_>>()
                .join("\n");
            (
                format!("{module}_{component}_{index:04}.{}", language.extension()),
                format!("// {language} snippet: {module} {component}\nfn {module}_{component}() {{\n{body}\n}}\n"),
            )
        }
        ArtifactKind::Doc => {
            let topic = *pick(&mut rng, catalog::DOC_TOPICS);
            let author = *pick(&mut rng, catalog::AUTHORS);
            let bullets = (0..rng.gen_range(3..=7u32))
                .map(|i| format!("- {module} note {i}: {}", pick(&mut rng, catalog::COMPONENTS)))
                .collect::<Vec<_>>()
                .join("\n");
            (
                format!("{topic}_{module}_{index:04}.md"),
                format!("# {module} {topic}\n\nMaintainer: {author}\n\n{bullets}\n"),
            )
        }
        ArtifactKind::Log => {
            let source = *pick(&mut rng, catalog::LOG_SOURCES);
            let lines = (0..rng.gen_range(5..=20u32))
                .map(|i| {
                    let level = *pick(&mut rng, &["INFO", "INFO", "WARN", "ERROR", "DEBUG"]);
                    format!("{i:05} {level} {source}.{module}: event={}", rng.gen_range(1000..9999))
                })
                .collect::<Vec<_>>()
                .join("\n");
            (format!("{source}_{module}_{index:04}.log"), format!("{lines}\n"))
        }
    };

    Artifact {
        path: format!("{}/{name}", kind.dir()),
        kind,
        content,
    }
}
