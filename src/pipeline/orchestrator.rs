use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{EntityKind, Layer, RunStatus, SourceTableSpec};
use crate::error::{PipelineError, Result};
use crate::ledger::{RunLedger, SqliteRunLedger};
use crate::pipeline::ingestion::{TableLoadReport, TableLoader};
use crate::pipeline::processing::quality_gate::DefaultQualityGate;
use crate::pipeline::processing::silver_loader::SilverLoader;
use crate::pipeline::processing::transform::RuleEngine;
use crate::storage::{SqliteWarehouse, Warehouse};

/// Outcome of one batch: the batch row as closed plus every table it ran
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: i64,
    pub stage: Layer,
    pub status: RunStatus,
    /// Set only when orchestration itself failed
    pub error: Option<String>,
    pub tables: Vec<TableLoadReport>,
}

impl BatchReport {
    pub fn failed_tables(&self) -> impl Iterator<Item = &TableLoadReport> {
        self.tables.iter().filter(|t| !t.outcome.is_success())
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().filter_map(|t| t.outcome.row_count()).sum()
    }
}

/// Drives bronze and silver batches: opens the BatchRun, runs every unit
/// inside its own TableRun, and closes the batch.
///
/// A failed table never stops the batch. A ledger failure does: remaining
/// units are skipped and the batch is closed FAILED.
pub struct BatchOrchestrator {
    ledger: Arc<dyn RunLedger>,
    bronze: Arc<TableLoader>,
    silver: Arc<SilverLoader>,
    sources: Vec<SourceTableSpec>,
    parallel_loads: bool,
}

impl BatchOrchestrator {
    pub fn new(
        ledger: Arc<dyn RunLedger>,
        bronze: TableLoader,
        silver: SilverLoader,
        sources: Vec<SourceTableSpec>,
    ) -> Self {
        Self {
            ledger,
            bronze: Arc::new(bronze),
            silver: Arc::new(silver),
            sources,
            parallel_loads: false,
        }
    }

    /// Wires SQLite-backed ledger and warehouse from configuration
    pub fn from_config(config: &Config, today: NaiveDate) -> Result<Self> {
        let settings = &config.pipeline;
        let ledger: Arc<dyn RunLedger> = Arc::new(SqliteRunLedger::open(&settings.database_path)?);
        let warehouse = Arc::new(SqliteWarehouse::open(&settings.database_path)?);
        warehouse.ensure_silver_layout()?;
        let warehouse: Arc<dyn Warehouse> = warehouse;

        let bronze = TableLoader::new(ledger.clone(), warehouse.clone(), settings.base_path.clone());
        let silver = SilverLoader::new(
            ledger.clone(),
            warehouse,
            Arc::new(RuleEngine::new(today)),
            Arc::new(DefaultQualityGate::new(today)),
        );
        Ok(Self::new(ledger, bronze, silver, config.sources()).with_parallel_loads(settings.parallel_loads))
    }

    pub fn with_parallel_loads(mut self, parallel: bool) -> Self {
        self.parallel_loads = parallel;
        self
    }

    /// Loads every configured source table into bronze
    pub async fn run_bronze(&self) -> Result<BatchReport> {
        let loader = self.bronze.clone();
        self.run_batch(
            Layer::Bronze,
            self.sources.clone(),
            self.parallel_loads,
            move |spec: &SourceTableSpec, batch_id| loader.load(spec, batch_id),
        )
        .await
    }

    /// Rebuilds every silver entity from bronze. Always sequential: the
    /// sales checks read the customer and product relations built before it.
    pub async fn run_silver(&self) -> Result<BatchReport> {
        let loader = self.silver.clone();
        self.run_batch(
            Layer::Silver,
            EntityKind::ALL.to_vec(),
            false,
            move |entity: &EntityKind, batch_id| loader.load(*entity, batch_id),
        )
        .await
    }

    /// Bronze then silver. Silver is skipped when the bronze batch failed.
    pub async fn run_full(&self) -> Result<Vec<BatchReport>> {
        let bronze = self.run_bronze().await?;
        if bronze.status == RunStatus::Failed {
            warn!(batch_id = bronze.batch_id, "Bronze batch failed, skipping silver");
            return Ok(vec![bronze]);
        }
        let silver = self.run_silver().await?;
        Ok(vec![bronze, silver])
    }

    async fn run_batch<U, F>(&self, stage: Layer, units: Vec<U>, parallel: bool, load: F) -> Result<BatchReport>
    where
        U: Send + 'static,
        F: Fn(&U, i64) -> Result<TableLoadReport> + Send + Sync + 'static,
    {
        let batch_id = self.ledger.open_batch(stage)?;
        info!(batch_id, stage = %stage, units = units.len(), parallel, "Batch started");

        let load = Arc::new(load);
        let (tables, failure) = if parallel {
            run_parallel(units, batch_id, load).await
        } else {
            run_sequential(units, batch_id, load).await
        };

        let status = if failure.is_some() {
            RunStatus::Failed
        } else {
            RunStatus::Success
        };
        self.ledger.close_batch(batch_id, status, failure.as_deref())?;

        let report = BatchReport {
            batch_id,
            stage,
            status,
            error: failure,
            tables,
        };
        match &report.error {
            Some(message) => error!(batch_id, stage = %stage, error = %message, "Batch failed"),
            None => info!(
                batch_id,
                stage = %stage,
                tables = report.tables.len(),
                failed_tables = report.failed_tables().count(),
                rows = report.total_rows(),
                "Batch completed"
            ),
        }
        Ok(report)
    }
}

type Collected = (Vec<TableLoadReport>, Option<String>);

async fn run_sequential<U, F>(units: Vec<U>, batch_id: i64, load: Arc<F>) -> Collected
where
    U: Send + 'static,
    F: Fn(&U, i64) -> Result<TableLoadReport> + Send + Sync + 'static,
{
    let mut tables = Vec::with_capacity(units.len());
    for unit in units {
        let load = load.clone();
        let joined = tokio::task::spawn_blocking(move || load(&unit, batch_id)).await;
        match joined.map_err(PipelineError::from).and_then(|r| r) {
            Ok(report) => tables.push(report),
            Err(e) => return (tables, Some(e.to_string())),
        }
    }
    (tables, None)
}

/// Runs every unit on the blocking pool; reports keep input order. Units
/// already running when another fails are allowed to finish so their
/// TableRuns are closed before the batch is.
async fn run_parallel<U, F>(units: Vec<U>, batch_id: i64, load: Arc<F>) -> Collected
where
    U: Send + 'static,
    F: Fn(&U, i64) -> Result<TableLoadReport> + Send + Sync + 'static,
{
    let count = units.len();
    let mut set = JoinSet::new();
    for (index, unit) in units.into_iter().enumerate() {
        let load = load.clone();
        set.spawn_blocking(move || (index, load(&unit, batch_id)));
    }

    let mut slots: Vec<Option<TableLoadReport>> = (0..count).map(|_| None).collect();
    let mut failure = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, Ok(report))) => slots[index] = Some(report),
            Ok((_, Err(e))) => {
                failure.get_or_insert_with(|| e.to_string());
            }
            Err(e) => {
                failure.get_or_insert_with(|| PipelineError::from(e).to_string());
            }
        }
    }
    (slots.into_iter().flatten().collect(), failure)
}
