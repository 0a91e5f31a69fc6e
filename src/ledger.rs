use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::domain::{BatchRun, Layer, RunStatus, TableRun};
use crate::error::{PipelineError, Result};
use crate::pipeline::processing::quality_gate::CheckOutcome;
use crate::storage::open_connection;

/// A persisted quality-gate outcome
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFinding {
    pub finding_id: i64,
    pub batch_id: i64,
    pub entity: String,
    pub gate_stage: String,
    pub check_name: String,
    pub expectation: String,
    pub observed: i64,
    pub passed: bool,
    pub samples: Vec<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only audit trail of batch and table executions.
///
/// Rows are only ever inserted or moved once from RUNNING to a terminal
/// status; closing a run twice is rejected rather than overwritten.
pub trait RunLedger: Send + Sync {
    fn open_batch(&self, stage: Layer) -> Result<i64>;
    fn close_batch(&self, batch_id: i64, status: RunStatus, error: Option<&str>) -> Result<()>;
    fn open_table_run(&self, batch_id: i64, table_name: &str) -> Result<i64>;
    fn close_table_run(
        &self,
        run_id: i64,
        status: RunStatus,
        row_count: Option<u64>,
        error: Option<&str>,
    ) -> Result<()>;

    /// Advisory channel for quality-gate results
    fn record_finding(&self, batch_id: i64, outcome: &CheckOutcome) -> Result<()>;

    fn batch(&self, batch_id: i64) -> Result<Option<BatchRun>>;
    fn table_runs(&self, batch_id: i64) -> Result<Vec<TableRun>>;
    fn recent_batches(&self, limit: usize) -> Result<Vec<BatchRun>>;
    fn findings(&self, batch_id: i64) -> Result<Vec<QualityFinding>>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS batch_runs (
    batch_id       INTEGER PRIMARY KEY AUTOINCREMENT,
    stage          TEXT NOT NULL,
    start_time     TEXT NOT NULL,
    end_time       TEXT,
    duration_secs  INTEGER,
    status         TEXT NOT NULL,
    error_message  TEXT
);
CREATE TABLE IF NOT EXISTS table_runs (
    run_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id       INTEGER NOT NULL REFERENCES batch_runs(batch_id),
    table_name     TEXT NOT NULL,
    start_time     TEXT NOT NULL,
    end_time       TEXT,
    duration_secs  INTEGER,
    row_count      INTEGER,
    status         TEXT NOT NULL,
    error_message  TEXT
);
CREATE TABLE IF NOT EXISTS quality_findings (
    finding_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    batch_id       INTEGER NOT NULL REFERENCES batch_runs(batch_id),
    entity         TEXT NOT NULL,
    gate_stage     TEXT NOT NULL,
    check_name     TEXT NOT NULL,
    expectation    TEXT NOT NULL,
    observed       INTEGER NOT NULL,
    passed         INTEGER NOT NULL,
    samples        TEXT NOT NULL,
    recorded_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_table_runs_batch ON table_runs(batch_id);
CREATE INDEX IF NOT EXISTS idx_quality_findings_batch ON quality_findings(batch_id);
"#;

/// SQLite-backed ledger. The connection mutex is the single "ledger append"
/// lock: every write goes through it, so no two writes ever interleave.
pub struct SqliteRunLedger {
    conn: Mutex<Connection>,
}

impl SqliteRunLedger {
    pub fn open(path: &Path) -> Result<Self> {
        Self::init(open_connection(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::Ledger("ledger lock poisoned".to_string()))
    }
}

fn parse_ts(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_opt_ts(s: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_status(s: &str) -> rusqlite::Result<RunStatus> {
    RunStatus::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown run status '{}'", s).into(),
        )
    })
}

fn parse_stage(s: &str) -> rusqlite::Result<Layer> {
    Layer::parse(s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown batch stage '{}'", s).into(),
        )
    })
}

fn parse_samples(s: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<BatchRun> {
    let stage: String = row.get("stage")?;
    let start: String = row.get("start_time")?;
    let status: String = row.get("status")?;
    Ok(BatchRun {
        batch_id: row.get("batch_id")?,
        stage: parse_stage(&stage)?,
        start_time: parse_ts(&start)?,
        end_time: parse_opt_ts(row.get("end_time")?)?,
        duration_secs: row.get("duration_secs")?,
        status: parse_status(&status)?,
        error_message: row.get("error_message")?,
    })
}

fn table_run_from_row(row: &Row<'_>) -> rusqlite::Result<TableRun> {
    let start: String = row.get("start_time")?;
    let status: String = row.get("status")?;
    let row_count: Option<i64> = row.get("row_count")?;
    Ok(TableRun {
        run_id: row.get("run_id")?,
        batch_id: row.get("batch_id")?,
        table_name: row.get("table_name")?,
        start_time: parse_ts(&start)?,
        end_time: parse_opt_ts(row.get("end_time")?)?,
        duration_secs: row.get("duration_secs")?,
        row_count: row_count.map(|c| c.max(0) as u64),
        status: parse_status(&status)?,
        error_message: row.get("error_message")?,
    })
}

/// Validates that a run can move to `status` and returns its end time and
/// duration in whole seconds.
fn finish_times(
    conn: &Connection,
    kind: &'static str,
    select_sql: &str,
    id: i64,
    status: RunStatus,
) -> Result<(DateTime<Utc>, i64)> {
    if !status.is_terminal() {
        return Err(PipelineError::Ledger(format!(
            "{} {} cannot be closed with status {}",
            kind, id, status
        )));
    }

    let current: Option<(String, String)> = conn
        .query_row(select_sql, params![id], |row| Ok((row.get(0)?, row.get(1)?)))
        .optional()?;
    let (start, current_status) = current.ok_or(PipelineError::UnknownRun { kind, id })?;
    if parse_status(&current_status)?.is_terminal() {
        return Err(PipelineError::AlreadyClosed { kind, id });
    }

    let start = parse_ts(&start)?;
    let end = Utc::now();
    Ok((end, (end - start).num_seconds().max(0)))
}

impl RunLedger for SqliteRunLedger {
    fn open_batch(&self, stage: Layer) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO batch_runs (stage, start_time, status) VALUES (?1, ?2, ?3)",
            params![stage.as_str(), Utc::now().to_rfc3339(), RunStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn close_batch(&self, batch_id: i64, status: RunStatus, error: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let (end, duration) = finish_times(
            &conn,
            "batch",
            "SELECT start_time, status FROM batch_runs WHERE batch_id = ?1",
            batch_id,
            status,
        )?;
        let changed = conn.execute(
            "UPDATE batch_runs SET end_time = ?1, duration_secs = ?2, status = ?3, error_message = ?4
             WHERE batch_id = ?5 AND status = 'RUNNING'",
            params![end.to_rfc3339(), duration, status.as_str(), error, batch_id],
        )?;
        if changed == 0 {
            return Err(PipelineError::AlreadyClosed {
                kind: "batch",
                id: batch_id,
            });
        }
        Ok(())
    }

    fn open_table_run(&self, batch_id: i64, table_name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT batch_id FROM batch_runs WHERE batch_id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(PipelineError::UnknownRun {
                kind: "batch",
                id: batch_id,
            });
        }
        conn.execute(
            "INSERT INTO table_runs (batch_id, table_name, start_time, status) VALUES (?1, ?2, ?3, ?4)",
            params![batch_id, table_name, Utc::now().to_rfc3339(), RunStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn close_table_run(
        &self,
        run_id: i64,
        status: RunStatus,
        row_count: Option<u64>,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let (end, duration) = finish_times(
            &conn,
            "table run",
            "SELECT start_time, status FROM table_runs WHERE run_id = ?1",
            run_id,
            status,
        )?;
        let changed = conn.execute(
            "UPDATE table_runs
             SET end_time = ?1, duration_secs = ?2, status = ?3, row_count = ?4, error_message = ?5
             WHERE run_id = ?6 AND status = 'RUNNING'",
            params![
                end.to_rfc3339(),
                duration,
                status.as_str(),
                row_count.map(|c| c as i64),
                error,
                run_id
            ],
        )?;
        if changed == 0 {
            return Err(PipelineError::AlreadyClosed {
                kind: "table run",
                id: run_id,
            });
        }
        Ok(())
    }

    fn record_finding(&self, batch_id: i64, outcome: &CheckOutcome) -> Result<()> {
        let samples = serde_json::to_string(&outcome.samples)?;
        self.conn()?.execute(
            "INSERT INTO quality_findings
                (batch_id, entity, gate_stage, check_name, expectation, observed, passed, samples, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                batch_id,
                outcome.entity.table_name(),
                outcome.stage.as_str(),
                outcome.name,
                outcome.expectation.to_string(),
                outcome.observed as i64,
                outcome.passed,
                samples,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn batch(&self, batch_id: i64) -> Result<Option<BatchRun>> {
        let conn = self.conn()?;
        let batch = conn
            .query_row(
                "SELECT * FROM batch_runs WHERE batch_id = ?1",
                params![batch_id],
                batch_from_row,
            )
            .optional()?;
        Ok(batch)
    }

    fn table_runs(&self, batch_id: i64) -> Result<Vec<TableRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM table_runs WHERE batch_id = ?1 ORDER BY run_id")?;
        let runs = stmt
            .query_map(params![batch_id], table_run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn recent_batches(&self, limit: usize) -> Result<Vec<BatchRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT * FROM batch_runs ORDER BY batch_id DESC LIMIT ?1")?;
        let batches = stmt
            .query_map(params![limit as i64], batch_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(batches)
    }

    fn findings(&self, batch_id: i64) -> Result<Vec<QualityFinding>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT * FROM quality_findings WHERE batch_id = ?1 ORDER BY finding_id")?;
        let findings = stmt
            .query_map(params![batch_id], |row| {
                let samples: String = row.get("samples")?;
                let recorded: String = row.get("recorded_at")?;
                Ok(QualityFinding {
                    finding_id: row.get("finding_id")?,
                    batch_id: row.get("batch_id")?,
                    entity: row.get("entity")?,
                    gate_stage: row.get("gate_stage")?,
                    check_name: row.get("check_name")?,
                    expectation: row.get("expectation")?,
                    observed: row.get("observed")?,
                    passed: row.get("passed")?,
                    samples: parse_samples(&samples)?,
                    recorded_at: parse_ts(&recorded)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityKind;
    use crate::pipeline::processing::quality_gate::{Expectation, GateStage};

    #[test]
    fn test_batch_lifecycle() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Bronze).unwrap();

        let open = ledger.batch(batch_id).unwrap().unwrap();
        assert_eq!(open.status, RunStatus::Running);
        assert!(open.end_time.is_none());

        ledger.close_batch(batch_id, RunStatus::Success, None).unwrap();
        let closed = ledger.batch(batch_id).unwrap().unwrap();
        assert_eq!(closed.status, RunStatus::Success);
        let end = closed.end_time.unwrap();
        assert_eq!(closed.duration_secs, Some((end - closed.start_time).num_seconds()));
        assert!(closed.duration_secs.unwrap() >= 0);
    }

    #[test]
    fn test_batch_ids_increase() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let first = ledger.open_batch(Layer::Bronze).unwrap();
        let second = ledger.open_batch(Layer::Silver).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_second_close_is_rejected_and_does_not_overwrite() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Bronze).unwrap();
        ledger.close_batch(batch_id, RunStatus::Success, None).unwrap();

        let err = ledger
            .close_batch(batch_id, RunStatus::Failed, Some("late failure"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyClosed { .. }));

        let batch = ledger.batch(batch_id).unwrap().unwrap();
        assert_eq!(batch.status, RunStatus::Success);
        assert!(batch.error_message.is_none());
    }

    #[test]
    fn test_close_unknown_batch() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let err = ledger.close_batch(42, RunStatus::Success, None).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownRun { id: 42, .. }));
    }

    #[test]
    fn test_table_run_success_and_failure() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Bronze).unwrap();
        let ok = ledger.open_table_run(batch_id, "bronze.crm_cust_info").unwrap();
        let bad = ledger.open_table_run(batch_id, "bronze.crm_prd_info").unwrap();

        ledger.close_table_run(ok, RunStatus::Success, Some(18494), None).unwrap();
        ledger
            .close_table_run(bad, RunStatus::Failed, None, Some("file not found"))
            .unwrap();

        let runs = ledger.table_runs(batch_id).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].row_count, Some(18494));
        assert_eq!(runs[0].status, RunStatus::Success);
        assert_eq!(runs[1].row_count, None);
        assert_eq!(runs[1].error_message.as_deref(), Some("file not found"));
        for run in runs {
            let end = run.end_time.unwrap();
            assert_eq!(run.duration_secs, Some((end - run.start_time).num_seconds()));
        }
    }

    #[test]
    fn test_table_run_requires_known_batch() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        assert!(ledger.open_table_run(7, "bronze.crm_cust_info").is_err());
    }

    #[test]
    fn test_closing_with_running_status_is_rejected() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Bronze).unwrap();
        assert!(ledger.close_batch(batch_id, RunStatus::Running, None).is_err());
    }

    #[test]
    fn test_findings_are_appended() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Silver).unwrap();
        let outcome = CheckOutcome {
            entity: EntityKind::Customer,
            stage: GateStage::After,
            name: "duplicate_natural_key".to_string(),
            expectation: Expectation::EmptySet,
            observed: 1,
            passed: false,
            samples: vec!["29466".to_string()],
        };
        ledger.record_finding(batch_id, &outcome).unwrap();

        let findings = ledger.findings(batch_id).unwrap();
        assert_eq!(findings.len(), 1);
        assert!(!findings[0].passed);
        assert_eq!(findings[0].entity, "crm_cust_info");
        assert_eq!(findings[0].samples, vec!["29466"]);
    }

    #[test]
    fn test_corrupt_stage_and_samples_are_reported() {
        let ledger = SqliteRunLedger::open_in_memory().unwrap();
        let batch_id = ledger.open_batch(Layer::Silver).unwrap();
        let outcome = CheckOutcome {
            entity: EntityKind::ErpLocation,
            stage: GateStage::Before,
            name: "null_or_duplicate_cid".to_string(),
            expectation: Expectation::EmptySet,
            observed: 0,
            passed: true,
            samples: Vec::new(),
        };
        ledger.record_finding(batch_id, &outcome).unwrap();
        {
            let conn = ledger.conn().unwrap();
            conn.execute("UPDATE batch_runs SET stage = 'gold' WHERE batch_id = ?1", params![batch_id])
                .unwrap();
            conn.execute("UPDATE quality_findings SET samples = 'not json'", [])
                .unwrap();
        }

        assert!(matches!(ledger.batch(batch_id), Err(PipelineError::Database(_))));
        assert!(matches!(ledger.findings(batch_id), Err(PipelineError::Database(_))));
    }
}
