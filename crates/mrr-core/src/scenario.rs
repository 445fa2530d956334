use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    SyntaxErrors,
    LogicErrors,
    ConcurrencyIssues,
    MemoryIssues,
    ApiMisuse,
    PerformanceBugs,
    CrossCategory,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Self::SyntaxErrors,
        Self::LogicErrors,
        Self::ConcurrencyIssues,
        Self::MemoryIssues,
        Self::ApiMisuse,
        Self::PerformanceBugs,
        Self::CrossCategory,
    ];

    /// Scenario count for this category in the standard 5,000-scenario set.
    pub fn standard_quota(self) -> usize {
        match self {
            Self::SyntaxErrors => 500,
            Self::LogicErrors => 1200,
            Self::ConcurrencyIssues => 800,
            Self::MemoryIssues => 600,
            Self::ApiMisuse => 900,
            Self::PerformanceBugs => 400,
            Self::CrossCategory => 600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyntaxErrors => "syntax_errors",
            Self::LogicErrors => "logic_errors",
            Self::ConcurrencyIssues => "concurrency_issues",
            Self::MemoryIssues => "memory_issues",
            Self::ApiMisuse => "api_misuse",
            Self::PerformanceBugs => "performance_bugs",
            Self::CrossCategory => "cross_category",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("invalid category: {s}"))
    }
}

/// Category quotas keyed in canonical category order.
pub type Quotas = BTreeMap<Category, usize>;

/// The standard distribution: 500/1200/800/600/900/400/600, 5,000 in total.
pub fn standard_quotas() -> Quotas {
    Category::ALL
        .into_iter()
        .map(|c| (c, c.standard_quota()))
        .collect()
}

pub const STANDARD_TOTAL: usize = 5000;

/// `mrr_<category>_<index>` with a 1-based, zero-padded index.
pub fn bug_id(category: Category, index: usize) -> String {
    format!("mrr_{category}_{index:04}")
}

/// Split a bug id back into its category and index.
pub fn parse_bug_id(id: &str) -> Option<(Category, usize)> {
    let rest = id.strip_prefix("mrr_")?;
    let (category, index) = rest.rsplit_once('_')?;
    if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((category.parse().ok()?, index.parse().ok()?))
}

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    Java,
    Go,
    Rust,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Self::Python,
        Self::Javascript,
        Self::Java,
        Self::Go,
        Self::Rust,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Python => "py",
            Self::Javascript => "js",
            Self::Java => "java",
            Self::Go => "go",
            Self::Rust => "rs",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Javascript => write!(f, "javascript"),
            Self::Java => write!(f, "java"),
            Self::Go => write!(f, "go"),
            Self::Rust => write!(f, "rust"),
        }
    }
}

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Obfuscation {
    Low,
    Medium,
    High,
}

impl fmt::Display for Obfuscation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

pub const MIN_SPATIAL_FILES: usize = 10;
pub const MAX_SPATIAL_FILES: usize = 50;
pub const MAX_TEMPORAL_MONTHS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    /// Number of files the relevant context is scattered across.
    pub spatial_files: usize,
    /// Months between the oldest relevant change and the bug report.
    pub temporal_months: u32,
    pub obfuscation: Obfuscation,
}

// ---------------------------------------------------------------------------
// Scattered context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    Critical,
    High,
    Medium,
    Low,
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critical => write!(f, "critical"),
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    Code,
    Test,
    Config,
    Doc,
    Log,
    Commit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub file_path: String,
    pub relevance: Relevance,
    pub kind: ContextKind,
    pub modified_at: DateTime<Utc>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalInfo {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bug_introduced: DateTime<Utc>,
    pub commit_count: u32,
}

// ---------------------------------------------------------------------------
// Ground truth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixLocation {
    pub file: String,
    pub line_start: u32,
    pub line_end: u32,
}

impl FixLocation {
    pub fn contains_line(&self, line: u32) -> bool {
        (self.line_start..=self.line_end).contains(&line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub root_cause: String,
    /// Terms a correct root-cause explanation must mention.
    pub root_cause_keywords: Vec<String>,
    pub fix_location: FixLocation,
    pub fix_description: String,
    pub must_find_files: Vec<String>,
    pub should_find_files: Vec<String>,
    pub test_name: String,
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub bug_id: String,
    pub category: Category,
    pub language: Language,
    pub title: String,
    pub description: String,
    pub symptoms: Vec<String>,
    pub complexity: Complexity,
    pub scattered_context: Vec<ContextFile>,
    pub temporal_info: TemporalInfo,
    pub ground_truth: GroundTruth,
    #[serde(default)]
    pub artifacts: Vec<String>,
}

impl Scenario {
    pub fn context_paths(&self) -> impl Iterator<Item = &str> {
        self.scattered_context.iter().map(|c| c.file_path.as_str())
    }

    /// Files that count as relevant hits: must-find first, then should-find.
    pub fn relevant_files(&self) -> impl Iterator<Item = &str> {
        self.ground_truth
            .must_find_files
            .iter()
            .chain(&self.ground_truth.should_find_files)
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Benchmark metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkMetadata {
    pub name: String,
    pub version: String,
    pub seed: u64,
    pub total_scenarios: usize,
    pub quotas: Quotas,
    pub artifact_count: usize,
    pub languages: Vec<Language>,
    /// SHA-256 over every scenario and artifact file, in sorted path order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl BenchmarkMetadata {
    pub fn is_standard(&self) -> bool {
        self.quotas == standard_quotas() && self.total_scenarios == STANDARD_TOTAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_quotas_sum() {
        let quotas = standard_quotas();
        assert_eq!(quotas.len(), 7);
        assert_eq!(quotas.values().sum::<usize>(), STANDARD_TOTAL);
        assert_eq!(quotas[&Category::LogicErrors], 1200);
        assert_eq!(quotas[&Category::PerformanceBugs], 400);
    }

    #[test]
    fn test_bug_id_roundtrip() {
        let id = bug_id(Category::LogicErrors, 1060);
        assert_eq!(id, "mrr_logic_errors_1060");
        assert_eq!(parse_bug_id(&id), Some((Category::LogicErrors, 1060)));
        assert_eq!(bug_id(Category::ApiMisuse, 7), "mrr_api_misuse_0007");
    }

    #[test]
    fn test_parse_bug_id_rejects_garbage() {
        assert_eq!(parse_bug_id("logic_errors_1"), None);
        assert_eq!(parse_bug_id("mrr_unknown_0001"), None);
        assert_eq!(parse_bug_id("mrr_logic_errors_"), None);
        assert_eq!(parse_bug_id("mrr_logic_errors_12a"), None);
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("cross-category".parse::<Category>(), Ok(Category::CrossCategory));
        assert_eq!(" API_MISUSE ".parse::<Category>(), Ok(Category::ApiMisuse));
        assert!("nope".parse::<Category>().is_err());
    }

    #[test]
    fn test_category_serde_is_snake_case() {
        let json = serde_json::to_string(&Category::ConcurrencyIssues).unwrap();
        assert_eq!(json, "\"concurrency_issues\"");
        let quotas: Quotas = serde_json::from_str(r#"{"memory_issues": 3}"#).unwrap();
        assert_eq!(quotas[&Category::MemoryIssues], 3);
    }

    #[test]
    fn test_fix_location_contains_line() {
        let loc = FixLocation {
            file: "a.py".into(),
            line_start: 10,
            line_end: 12,
        };
        assert!(loc.contains_line(10));
        assert!(loc.contains_line(12));
        assert!(!loc.contains_line(13));
    }
}
