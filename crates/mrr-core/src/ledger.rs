use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::MrrResult;
use crate::evaluator::Report;
use crate::outcome::ScenarioOutcome;

/// One recorded evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub model: String,
    pub created_at: DateTime<Utc>,
    /// Scenario store the run was evaluated against.
    pub dataset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_fingerprint: Option<String>,
    pub seed: u64,
    pub k: usize,
    pub sample_size: usize,
    pub report: Report,
}

impl RunRecord {
    pub fn new(report: Report, dataset: impl Into<String>, fingerprint: Option<String>, seed: u64) -> Self {
        Self {
            id: Ulid::new().to_string(),
            model: report.model.clone(),
            created_at: Utc::now(),
            dataset: dataset.into(),
            dataset_fingerprint: fingerprint,
            seed,
            k: report.k,
            sample_size: report.sample_size,
            report,
        }
    }
}

pub trait RunLedger {
    // CRUD
    fn record_run(&self, run: &RunRecord, outcomes: &[ScenarioOutcome]) -> MrrResult<String>;
    fn get_run(&self, id: &str) -> MrrResult<Option<RunRecord>>;
    /// Newest first, optionally for one model only.
    fn list_runs(&self, model: Option<&str>) -> MrrResult<Vec<RunRecord>>;
    /// Outcomes of a run, sorted by bug id.
    fn outcomes(&self, run_id: &str) -> MrrResult<Vec<ScenarioOutcome>>;
    fn delete_run(&self, id: &str) -> MrrResult<()>;

    // Stats
    fn count_runs(&self) -> MrrResult<usize>;
}
