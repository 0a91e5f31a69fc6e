use metrics::{counter, histogram};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, instrument};

use super::extract::read_delimited;
use crate::domain::{Layer, RunStatus, SourceTableSpec};
use crate::error::Result;
use crate::ledger::RunLedger;
use crate::storage::Warehouse;

/// Per-table result, recorded in the ledger instead of being raised
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    Success { row_count: u64 },
    Failure { message: String },
}

impl LoadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadOutcome::Success { .. })
    }

    pub fn row_count(&self) -> Option<u64> {
        match self {
            LoadOutcome::Success { row_count } => Some(*row_count),
            LoadOutcome::Failure { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableLoadReport {
    pub table_name: String,
    pub run_id: i64,
    pub outcome: LoadOutcome,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Runs `work` inside one table's failure-isolation boundary.
///
/// Opens a TableRun, converts any error from `work` into a FAILED run with the
/// error text and no row count, and closes the run. Only ledger failures
/// (opening or closing the run) are returned as errors; they belong to the
/// orchestration, not the table.
pub fn run_isolated<F>(
    ledger: &dyn RunLedger,
    batch_id: i64,
    table_name: &str,
    work: F,
) -> Result<TableLoadReport>
where
    F: FnOnce() -> Result<u64>,
{
    let run_id = ledger.open_table_run(batch_id, table_name)?;
    let span = info_span!("table_run", batch_id, run_id, table = %table_name);
    let _enter = span.enter();
    info!("Loading table");

    let started = Instant::now();
    let outcome = match work() {
        Ok(row_count) => LoadOutcome::Success { row_count },
        Err(e) => LoadOutcome::Failure {
            message: e.to_string(),
        },
    };
    let elapsed = started.elapsed();

    match &outcome {
        LoadOutcome::Success { row_count } => {
            ledger.close_table_run(run_id, RunStatus::Success, Some(*row_count), None)?;
            counter!("medallion_rows_loaded_total", "table" => table_name.to_string())
                .increment(*row_count);
            info!(row_count, elapsed_ms = elapsed.as_millis() as u64, "Table loaded");
        }
        LoadOutcome::Failure { message } => {
            ledger.close_table_run(run_id, RunStatus::Failed, None, Some(message))?;
            error!(error = %message, "Table load failed");
        }
    }

    let status = if outcome.is_success() { "success" } else { "failed" };
    counter!("medallion_table_loads_total", "table" => table_name.to_string(), "status" => status)
        .increment(1);
    histogram!("medallion_table_load_duration_seconds", "table" => table_name.to_string())
        .record(elapsed.as_secs_f64());

    Ok(TableLoadReport {
        table_name: table_name.to_string(),
        run_id,
        outcome,
        elapsed,
    })
}

/// Loads raw extracts into their bronze relations
pub struct TableLoader {
    ledger: Arc<dyn RunLedger>,
    warehouse: Arc<dyn Warehouse>,
    base_path: PathBuf,
}

impl TableLoader {
    pub fn new(ledger: Arc<dyn RunLedger>, warehouse: Arc<dyn Warehouse>, base_path: PathBuf) -> Self {
        Self {
            ledger,
            warehouse,
            base_path,
        }
    }

    /// Full-refresh load of one source table into bronze
    pub fn load(&self, spec: &SourceTableSpec, batch_id: i64) -> Result<TableLoadReport> {
        let table_name = Layer::Bronze.qualified(&spec.table_name);
        run_isolated(self.ledger.as_ref(), batch_id, &table_name, || self.transfer(spec))
    }

    #[instrument(skip(self, spec), fields(table = %spec.table_name))]
    fn transfer(&self, spec: &SourceTableSpec) -> Result<u64> {
        self.warehouse.ensure_bronze(spec)?;
        self.warehouse.truncate(Layer::Bronze, &spec.table_name)?;

        let path = spec.resolve(&self.base_path);
        debug!(path = %path.display(), "Reading extract");
        let records = read_delimited(&path, spec.columns.len())?;
        self.warehouse.bulk_insert(spec, &records)?;

        self.warehouse.count_rows(Layer::Bronze, &spec.table_name)
    }
}
