//! Configuration loading from TOML files.
//!
//! Lookup order:
//! 1. `$MRR_CONFIG` environment variable
//! 2. `~/.config/mrr/config.toml`
//! 3. Built-in defaults (everything is optional)

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use mrr_core::seed::DEFAULT_SEED;
use mrr_core::{BaselineTable, EvalConfig};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub generator: GeneratorSection,
    pub evaluation: EvaluationSection,
    pub ledger: LedgerSection,
    /// Expected performance per model, keyed by model name.
    pub baselines: BaselineTable,
}

/// Scenario generation defaults.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    pub seed: u64,
    /// Size of the shared artifact pool.
    pub artifacts: usize,
}

/// Scoring and statistics settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    #[serde(flatten)]
    pub eval: EvalConfig,
    /// Scenarios sampled per run when `--count` is not given. All when unset.
    pub sample_size: Option<usize>,
}

/// Run ledger settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    /// SQLite database path. Default: platform-specific data dir.
    pub path: Option<String>,
}

// --- Defaults ---

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            artifacts: 300,
        }
    }
}

/// Load config from disk. Returns defaults if no config file exists.
pub fn load_config() -> Result<Config> {
    let path = config_path();

    if let Some(p) = &path {
        if p.exists() {
            let content =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            let config = parse_config(&content).with_context(|| format!("parsing {}", p.display()))?;
            return Ok(config);
        }
    }

    Ok(Config::default())
}

fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    for (model, baseline) in &config.baselines.models {
        for name in baseline.unknown_categories() {
            tracing::warn!(model, category = name, "unknown category in baselines, ignored");
        }
    }
    Ok(config)
}

/// Resolve the config file path.
fn config_path() -> Option<PathBuf> {
    // 1. Environment variable
    if let Ok(p) = std::env::var("MRR_CONFIG") {
        return Some(PathBuf::from(p));
    }

    // 2. ~/.config/mrr/config.toml
    if let Some(home) = dirs_home() {
        let p = home.join(".config").join("mrr").join("config.toml");
        return Some(p);
    }

    None
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

/// Show the active config path (for `mrr config`).
pub fn show_config_path() -> String {
    match config_path() {
        Some(p) if p.exists() => format!("{} (loaded)", p.display()),
        Some(p) => format!("{} (not found, using defaults)", p.display()),
        None => "no config path resolved (using defaults)".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrr_core::Category;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.generator.seed, DEFAULT_SEED);
        assert_eq!(config.evaluation.eval.k, 10);
        assert_eq!(config.evaluation.eval.bootstrap_resamples, 1000);
        assert!(config.evaluation.sample_size.is_none());
        assert!(config.baselines.models.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[evaluation]
k = 5
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.evaluation.eval.k, 5);
        // Other fields should be defaults
        assert_eq!(config.evaluation.eval.confidence, 0.95);
        assert_eq!(config.generator.artifacts, 300);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[generator]
seed = 42
artifacts = 50

[evaluation]
k = 20
bootstrap_resamples = 500
confidence = 0.9
max_iterations = 8
root_cause_min_matches = 1
workers = 4
seed = 7
sample_size = 1000

[ledger]
path = "/tmp/runs.db"

[baselines.chronos]
success_rate = 0.65
precision = 0.9
recall = 0.85
mean_iterations = 7.8

[baselines.chronos.categories]
logic_errors = 0.7
cross_category = 0.4

[baselines.gpt-4]
success_rate = 0.14
"#;
        let config = parse_config(toml_str).unwrap();
        assert_eq!(config.generator.seed, 42);
        assert_eq!(config.evaluation.eval.workers, 4);
        assert_eq!(config.evaluation.eval.seed, 7);
        assert_eq!(config.evaluation.sample_size, Some(1000));
        assert_eq!(config.ledger.path.as_deref(), Some("/tmp/runs.db"));

        let chronos = config.baselines.get("chronos").unwrap();
        assert_eq!(chronos.success_for(Category::LogicErrors), 0.7);
        assert_eq!(chronos.success_for(Category::MemoryIssues), 0.65);
        let gpt = config.baselines.get("GPT-4").unwrap();
        assert_eq!(gpt.precision, 0.0);
        assert_eq!(config.baselines.names().count(), 2);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(parse_config("[evaluation]\nk = \"ten\"\n").is_err());
    }
}
