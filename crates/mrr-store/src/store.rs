use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use mrr_core::{
    Category, MrrError, MrrResult, OutcomeStatus, Report, RunLedger, RunRecord, ScenarioOutcome,
};

use crate::schema::init_db;

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn new(path: &Path) -> MrrResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MrrError::Database(format!("cannot create db directory: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MrrError::Database(format!("cannot open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| MrrError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn in_memory() -> MrrResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MrrError::Database(format!("cannot open in-memory db: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| MrrError::Database(e.to_string()))?;
        init_db(&conn)?;
        Ok(Self { conn })
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_default()
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

const RUN_COLS: &str = "id, model, created_at, dataset, dataset_fingerprint, seed, k, sample_size, report";

fn row_to_run(row: &rusqlite::Row) -> rusqlite::Result<RunRecord> {
    let report_json: String = row.get(8)?;
    let report: Report =
        serde_json::from_str(&report_json).map_err(|e| conversion_error(8, e.to_string()))?;

    Ok(RunRecord {
        id: row.get(0)?,
        model: row.get(1)?,
        created_at: parse_dt(&row.get::<_, String>(2)?),
        dataset: row.get(3)?,
        dataset_fingerprint: row.get(4)?,
        // Stored bit-for-bit in a signed column.
        seed: row.get::<_, i64>(5)? as u64,
        k: row.get::<_, usize>(6)?,
        sample_size: row.get::<_, usize>(7)?,
        report,
    })
}

const OUTCOME_COLS: &str = "bug_id, category, status, fix_success, root_cause_match, location_match, \
                            precision_at_k, recall_at_k, should_recall_at_k, retrieved, iterations";

fn row_to_outcome(row: &rusqlite::Row) -> rusqlite::Result<ScenarioOutcome> {
    let category: Category = row
        .get::<_, String>(1)?
        .parse()
        .map_err(|e: String| conversion_error(1, e))?;
    let status: OutcomeStatus = row
        .get::<_, String>(2)?
        .parse()
        .map_err(|e: String| conversion_error(2, e))?;

    Ok(ScenarioOutcome {
        bug_id: row.get(0)?,
        category,
        status,
        fix_success: row.get(3)?,
        root_cause_match: row.get(4)?,
        location_match: row.get(5)?,
        precision_at_k: row.get(6)?,
        recall_at_k: row.get(7)?,
        should_recall_at_k: row.get(8)?,
        retrieved: row.get::<_, usize>(9)?,
        iterations: row.get::<_, u32>(10)?,
    })
}

// ---------------------------------------------------------------------------
// RunLedger impl
// ---------------------------------------------------------------------------

impl RunLedger for SqliteLedger {
    fn record_run(&self, run: &RunRecord, outcomes: &[ScenarioOutcome]) -> MrrResult<String> {
        let report_json = serde_json::to_string(&run.report)?;

        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| MrrError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO runs (id, model, created_at, dataset, dataset_fingerprint,
             seed, k, sample_size, success_rate, report)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.id,
                run.model,
                run.created_at.to_rfc3339(),
                run.dataset,
                run.dataset_fingerprint,
                run.seed as i64,
                run.k,
                run.sample_size,
                run.report.overall.success_rate.mean,
                report_json,
            ],
        )
        .map_err(|e| MrrError::Database(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO outcomes (run_id, {OUTCOME_COLS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ))
                .map_err(|e| MrrError::Database(e.to_string()))?;
            for o in outcomes {
                stmt.execute(params![
                    run.id,
                    o.bug_id,
                    o.category.as_str(),
                    o.status.to_string(),
                    o.fix_success,
                    o.root_cause_match,
                    o.location_match,
                    o.precision_at_k,
                    o.recall_at_k,
                    o.should_recall_at_k,
                    o.retrieved,
                    o.iterations,
                ])
                .map_err(|e| MrrError::Database(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| MrrError::Database(e.to_string()))?;
        tracing::debug!(run_id = %run.id, outcomes = outcomes.len(), "run recorded");
        Ok(run.id.clone())
    }

    fn get_run(&self, id: &str) -> MrrResult<Option<RunRecord>> {
        self.conn
            .prepare(&format!("SELECT {RUN_COLS} FROM runs WHERE id = ?1"))
            .map_err(|e| MrrError::Database(e.to_string()))?
            .query_row(params![id], row_to_run)
            .optional()
            .map_err(|e| MrrError::Database(e.to_string()))
    }

    fn list_runs(&self, model: Option<&str>) -> MrrResult<Vec<RunRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {RUN_COLS} FROM runs
                 WHERE ?1 IS NULL OR model = ?1
                 ORDER BY created_at DESC, id DESC"
            ))
            .map_err(|e| MrrError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![model], row_to_run)
            .map_err(|e| MrrError::Database(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| MrrError::Database(e.to_string()))?);
        }
        Ok(result)
    }

    fn outcomes(&self, run_id: &str) -> MrrResult<Vec<ScenarioOutcome>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {OUTCOME_COLS} FROM outcomes WHERE run_id = ?1 ORDER BY bug_id"
            ))
            .map_err(|e| MrrError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![run_id], row_to_outcome)
            .map_err(|e| MrrError::Database(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| MrrError::Database(e.to_string()))?);
        }
        Ok(result)
    }

    fn delete_run(&self, id: &str) -> MrrResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM runs WHERE id = ?1", params![id])
            .map_err(|e| MrrError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(MrrError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn count_runs(&self) -> MrrResult<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM runs", [], |row| row.get::<_, usize>(0))
            .map_err(|e| MrrError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mrr_core::{insert_output, EvalConfig, Evaluator, ModelBaseline, ScenarioGenerator};
    use mrr_core::{GeneratorConfig, ModelOutput, OutputSlot, Scenario};
    use std::collections::HashMap;

    fn slots(outputs: Vec<ModelOutput>) -> HashMap<String, OutputSlot> {
        let mut slots = HashMap::new();
        for o in outputs {
            insert_output(&mut slots, o.bug_id.clone(), OutputSlot::Parsed(o));
        }
        slots
    }

    fn test_ledger() -> SqliteLedger {
        SqliteLedger::in_memory().unwrap()
    }

    fn scenarios() -> Vec<Scenario> {
        let generator = ScenarioGenerator::new(GeneratorConfig {
            seed: 21,
            quotas: Category::ALL.into_iter().map(|c| (c, 2)).collect(),
            artifact_count: 0,
            ..GeneratorConfig::default()
        });
        Category::ALL
            .into_iter()
            .flat_map(|c| generator.category(c, &[]))
            .collect()
    }

    fn make_run(model: &str) -> (RunRecord, Vec<ScenarioOutcome>) {
        let scenarios = scenarios();
        let profile = ModelBaseline {
            success_rate: 0.5,
            precision: 0.6,
            recall: 0.8,
            mean_iterations: 4.0,
            ..ModelBaseline::default()
        };
        let outputs = slots(mrr_core::simulate_outputs(&scenarios[1..], &profile, 3));
        let evaluator = Evaluator::new(EvalConfig {
            bootstrap_resamples: 20,
            ..EvalConfig::default()
        });
        let (outcomes, report) = evaluator.run(model, &scenarios, &outputs, Some(&profile));
        (RunRecord::new(report, "/tmp/mrr", Some("abc".into()), 3), outcomes)
    }

    #[test]
    fn test_record_and_get() {
        let ledger = test_ledger();
        let (run, outcomes) = make_run("chronos");
        let id = ledger.record_run(&run, &outcomes).unwrap();

        let loaded = ledger.get_run(&id).unwrap().unwrap();
        assert_eq!(loaded.model, "chronos");
        assert_eq!(loaded.report.sample_size, run.report.sample_size);
        assert_eq!(loaded.report.categories.len(), run.report.categories.len());
        assert_eq!(loaded.seed, 3);
        assert_eq!(loaded.dataset_fingerprint.as_deref(), Some("abc"));

        let mut expected = outcomes.clone();
        expected.sort_by(|a, b| a.bug_id.cmp(&b.bug_id));
        assert_eq!(ledger.outcomes(&id).unwrap(), expected);
    }

    #[test]
    fn test_missing_status_survives_roundtrip() {
        let ledger = test_ledger();
        let (run, outcomes) = make_run("chronos");
        ledger.record_run(&run, &outcomes).unwrap();
        let stored = ledger.outcomes(&run.id).unwrap();
        assert!(stored.iter().any(|o| o.status == OutcomeStatus::MissingOutput));
    }

    #[test]
    fn test_get_not_found() {
        let ledger = test_ledger();
        assert!(ledger.get_run("nonexistent").unwrap().is_none());
        assert!(ledger.outcomes("nonexistent").unwrap().is_empty());
    }

    #[test]
    fn test_list_runs_filters_by_model() {
        let ledger = test_ledger();
        for model in ["chronos", "gpt", "chronos"] {
            let (run, outcomes) = make_run(model);
            ledger.record_run(&run, &outcomes).unwrap();
        }
        assert_eq!(ledger.list_runs(None).unwrap().len(), 3);
        assert_eq!(ledger.list_runs(Some("chronos")).unwrap().len(), 2);
        assert!(ledger.list_runs(Some("gemini")).unwrap().is_empty());
        assert_eq!(ledger.count_runs().unwrap(), 3);
    }

    #[test]
    fn test_delete_cascades_to_outcomes() {
        let ledger = test_ledger();
        let (run, outcomes) = make_run("chronos");
        ledger.record_run(&run, &outcomes).unwrap();

        ledger.delete_run(&run.id).unwrap();
        assert!(ledger.get_run(&run.id).unwrap().is_none());
        assert!(ledger.outcomes(&run.id).unwrap().is_empty());
        let orphans: usize = ledger
            .conn
            .query_row("SELECT COUNT(*) FROM outcomes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_delete_not_found() {
        let ledger = test_ledger();
        let result = ledger.delete_run("nonexistent");
        assert!(matches!(result, Err(MrrError::NotFound(_))));
    }

    #[test]
    fn test_large_seed_roundtrip() {
        let ledger = test_ledger();
        let (mut run, outcomes) = make_run("chronos");
        run.seed = u64::MAX - 5;
        ledger.record_run(&run, &outcomes).unwrap();
        assert_eq!(ledger.get_run(&run.id).unwrap().unwrap().seed, u64::MAX - 5);
    }

    #[test]
    fn test_file_backed_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("runs.db");
        {
            let ledger = SqliteLedger::new(&path).unwrap();
            let (run, outcomes) = make_run("chronos");
            ledger.record_run(&run, &outcomes).unwrap();
        }
        let reopened = SqliteLedger::new(&path).unwrap();
        assert_eq!(reopened.count_runs().unwrap(), 1);
    }
}
