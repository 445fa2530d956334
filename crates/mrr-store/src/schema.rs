use rusqlite::Connection;

use mrr_core::MrrError;

pub fn init_db(conn: &Connection) -> Result<(), MrrError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            created_at TEXT NOT NULL,
            dataset TEXT NOT NULL,
            dataset_fingerprint TEXT,
            seed INTEGER NOT NULL,
            k INTEGER NOT NULL,
            sample_size INTEGER NOT NULL,
            success_rate REAL NOT NULL,
            report TEXT NOT NULL -- JSON
        );

        CREATE INDEX IF NOT EXISTS idx_runs_model ON runs(model);
        CREATE INDEX IF NOT EXISTS idx_runs_created ON runs(created_at);

        CREATE TABLE IF NOT EXISTS outcomes (
            run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            bug_id TEXT NOT NULL,
            category TEXT NOT NULL,
            status TEXT NOT NULL,
            fix_success INTEGER NOT NULL,
            root_cause_match INTEGER NOT NULL,
            location_match INTEGER NOT NULL,
            precision_at_k REAL NOT NULL,
            recall_at_k REAL NOT NULL,
            should_recall_at_k REAL NOT NULL,
            retrieved INTEGER NOT NULL,
            iterations INTEGER NOT NULL,
            PRIMARY KEY (run_id, bug_id)
        );

        CREATE INDEX IF NOT EXISTS idx_outcomes_category ON outcomes(run_id, category);
        ",
    )
    .map_err(|e| MrrError::Database(e.to_string()))?;

    Ok(())
}
