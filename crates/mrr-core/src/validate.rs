//! Structural validation of a scenario store.
//!
//! Problems are collected into a [`ValidationReport`] instead of being
//! returned as errors. Only an unreadable store fails the call itself.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MrrResult;
use crate::scenario::*;
use crate::store::ScenarioStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Error => "error",
            Self::Warning => "warning",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingMetadata,
    MetadataMismatch,
    NonStandardQuotas,
    CountMismatch,
    MalformedFile,
    CategoryMismatch,
    FileNameMismatch,
    InvalidBugId,
    DuplicateId,
    InvalidScenario,
    MissingArtifact,
    FingerprintMismatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingMetadata => "missing_metadata",
            Self::MetadataMismatch => "metadata_mismatch",
            Self::NonStandardQuotas => "non_standard_quotas",
            Self::CountMismatch => "count_mismatch",
            Self::MalformedFile => "malformed_file",
            Self::CategoryMismatch => "category_mismatch",
            Self::FileNameMismatch => "file_name_mismatch",
            Self::InvalidBugId => "invalid_bug_id",
            Self::DuplicateId => "duplicate_id",
            Self::InvalidScenario => "invalid_scenario",
            Self::MissingArtifact => "missing_artifact",
            Self::FingerprintMismatch => "fingerprint_mismatch",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub kind: IssueKind,
    /// Store-relative file, or `metadata.json` for store-level issues.
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Scenario files that parsed.
    pub scenarios: usize,
    pub counts: BTreeMap<Category, usize>,
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    fn push(&mut self, severity: Severity, kind: IssueKind, location: &str, message: String) {
        self.issues.push(Issue {
            severity,
            kind,
            location: location.to_string(),
            message,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    pub fn is_publishable(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

const METADATA: &str = "metadata.json";

/// Invariant violations of a single scenario, independent of the store.
pub fn scenario_violations(scenario: &Scenario) -> Vec<String> {
    let mut out = Vec::new();
    let complexity = &scenario.complexity;
    let truth = &scenario.ground_truth;

    if !(MIN_SPATIAL_FILES..=MAX_SPATIAL_FILES).contains(&complexity.spatial_files) {
        out.push(format!(
            "spatial_files {} outside {MIN_SPATIAL_FILES}..={MAX_SPATIAL_FILES}",
            complexity.spatial_files
        ));
    }
    if complexity.temporal_months > MAX_TEMPORAL_MONTHS {
        out.push(format!(
            "temporal_months {} exceeds {MAX_TEMPORAL_MONTHS}",
            complexity.temporal_months
        ));
    }
    if scenario.scattered_context.len() != complexity.spatial_files {
        out.push(format!(
            "scattered_context has {} entries, spatial_files is {}",
            scenario.scattered_context.len(),
            complexity.spatial_files
        ));
    }

    let mut context = HashSet::new();
    for path in scenario.context_paths() {
        if !context.insert(path) {
            out.push(format!("duplicate context path {path}"));
        }
    }

    for (name, files) in [
        ("must_find_files", &truth.must_find_files),
        ("should_find_files", &truth.should_find_files),
    ] {
        for f in files {
            if !context.contains(f.as_str()) {
                out.push(format!("{name} entry {f} is not in scattered_context"));
            }
        }
    }
    let must: HashSet<&str> = truth.must_find_files.iter().map(String::as_str).collect();
    if truth.must_find_files.is_empty() {
        out.push("must_find_files is empty".into());
    }
    for f in &truth.should_find_files {
        if must.contains(f.as_str()) {
            out.push(format!("{f} is in both must_find_files and should_find_files"));
        }
    }

    let fix = &truth.fix_location;
    if !must.contains(fix.file.as_str()) {
        out.push(format!("fix_location file {} is not in must_find_files", fix.file));
    }
    if fix.line_start == 0 || fix.line_start > fix.line_end {
        out.push(format!(
            "fix_location lines {}..={} are not a valid range",
            fix.line_start, fix.line_end
        ));
    }
    if truth.root_cause_keywords.is_empty() {
        out.push("root_cause_keywords is empty".into());
    }

    let t = &scenario.temporal_info;
    if !(t.start <= t.bug_introduced && t.bug_introduced <= t.end) {
        out.push("bug_introduced lies outside start..=end".into());
    }
    let days = (t.end - t.start).num_days();
    let months = i64::from(complexity.temporal_months);
    if !(months * 28..=(months + 1) * 31).contains(&days) {
        out.push(format!(
            "temporal window of {days} days does not match temporal_months {months}"
        ));
    }
    for c in &scenario.scattered_context {
        if c.modified_at < t.start || c.modified_at > t.end {
            out.push(format!("{} modified outside the temporal window", c.file_path));
        }
    }

    out
}

/// Validate every scenario in `store`. With `check_fingerprint` the store
/// digest is recomputed and compared against the one in the metadata.
pub fn validate<S: ScenarioStore + ?Sized>(store: &S, check_fingerprint: bool) -> MrrResult<ValidationReport> {
    let mut report = ValidationReport::default();
    let metadata = store.metadata()?;
    let scan = store.scan()?;

    let mut seen: HashMap<String, String> = HashMap::new();
    for entry in &scan.entries {
        let location = entry.location.as_str();
        let scenario = match &entry.parsed {
            Ok(s) => s,
            Err(reason) => {
                report.push(Severity::Error, IssueKind::MalformedFile, location, reason.clone());
                continue;
            }
        };
        report.scenarios += 1;
        *report.counts.entry(scenario.category).or_default() += 1;

        if entry.category_dir != scenario.category.as_str() {
            report.push(
                Severity::Error,
                IssueKind::CategoryMismatch,
                location,
                format!(
                    "category {} stored under directory {}",
                    scenario.category, entry.category_dir
                ),
            );
        }
        match parse_bug_id(&scenario.bug_id) {
            Some((category, index)) if category == scenario.category && index >= 1 => {}
            _ => report.push(
                Severity::Error,
                IssueKind::InvalidBugId,
                location,
                format!(
                    "bug_id {} does not match mrr_{}_NNNN",
                    scenario.bug_id, scenario.category
                ),
            ),
        }
        let file_name = location.rsplit('/').next().unwrap_or(location);
        if file_name != format!("{}.json", scenario.bug_id) {
            report.push(
                Severity::Warning,
                IssueKind::FileNameMismatch,
                location,
                format!("file name does not match bug_id {}", scenario.bug_id),
            );
        }
        if let Some(first) = seen.insert(scenario.bug_id.clone(), location.to_string()) {
            report.push(
                Severity::Error,
                IssueKind::DuplicateId,
                location,
                format!("bug_id {} already defined in {first}", scenario.bug_id),
            );
        }
        for violation in scenario_violations(scenario) {
            report.push(Severity::Error, IssueKind::InvalidScenario, location, violation);
        }
        for artifact in &scenario.artifacts {
            if !store.artifact_exists(artifact) {
                report.push(
                    Severity::Error,
                    IssueKind::MissingArtifact,
                    location,
                    format!("artifact {artifact} does not exist"),
                );
            }
        }
    }

    let Some(metadata) = metadata else {
        report.push(
            Severity::Error,
            IssueKind::MissingMetadata,
            METADATA,
            "metadata.json is missing".into(),
        );
        tracing::debug!(issues = report.issues.len(), "validation finished");
        return Ok(report);
    };

    let quota_total: usize = metadata.quotas.values().sum();
    if quota_total != metadata.total_scenarios {
        report.push(
            Severity::Error,
            IssueKind::MetadataMismatch,
            METADATA,
            format!(
                "total_scenarios is {} but quotas sum to {quota_total}",
                metadata.total_scenarios
            ),
        );
    }
    if scan.entries.len() != metadata.total_scenarios {
        report.push(
            Severity::Error,
            IssueKind::CountMismatch,
            METADATA,
            format!(
                "store holds {} scenario files, metadata declares {}",
                scan.entries.len(),
                metadata.total_scenarios
            ),
        );
    }
    for category in Category::ALL {
        let expected = metadata.quotas.get(&category).copied().unwrap_or(0);
        let actual = report.counts.get(&category).copied().unwrap_or(0);
        if expected != actual {
            report.push(
                Severity::Error,
                IssueKind::CountMismatch,
                METADATA,
                format!("{category}: {actual} scenarios, quota is {expected}"),
            );
        }
    }
    if !metadata.is_standard() {
        report.push(
            Severity::Warning,
            IssueKind::NonStandardQuotas,
            METADATA,
            format!(
                "quotas differ from the standard {STANDARD_TOTAL}-scenario distribution"
            ),
        );
    }

    if check_fingerprint {
        match &metadata.fingerprint {
            Some(expected) => {
                let actual = store.fingerprint()?;
                if &actual != expected {
                    report.push(
                        Severity::Error,
                        IssueKind::FingerprintMismatch,
                        METADATA,
                        format!("fingerprint {actual} does not match recorded {expected}"),
                    );
                }
            }
            None => report.push(
                Severity::Warning,
                IssueKind::FingerprintMismatch,
                METADATA,
                "metadata has no fingerprint to check".into(),
            ),
        }
    }

    tracing::debug!(
        scenarios = report.scenarios,
        issues = report.issues.len(),
        "validation finished"
    );
    Ok(report)
}
