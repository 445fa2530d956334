pub mod baseline;
pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod ledger;
pub mod metrics;
pub mod outcome;
pub mod scenario;
pub mod seed;
pub mod simulate;
pub mod stats;
pub mod store;
pub mod validate;

#[cfg(test)]
mod test_fixtures;

pub use baseline::{BaselineTable, ModelBaseline};
pub use error::{MrrError, MrrResult};
pub use evaluator::{compare, sample_scenarios, Comparison, EvalConfig, Evaluator, GroupStats, Report, Tally};
pub use generator::{Artifact, ArtifactKind, GenerationSummary, GeneratorConfig, ScenarioGenerator};
pub use ledger::{RunLedger, RunRecord};
pub use outcome::{
    insert_output, ModelOutput, OutcomeStatus, OutputSlot, ProposedFix, ScenarioOutcome,
};
pub use scenario::{BenchmarkMetadata, Category, Language, Quotas, Scenario};
pub use simulate::simulate_outputs;
pub use stats::EffectMagnitude;
pub use store::{ScanEntry, ScenarioStore, StoreScan};
pub use validate::{validate, Issue, IssueKind, Severity, ValidationReport};
