use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::quality_gate::{QualityGate, QualityReport, References};
use super::transform::RuleEngine;
use crate::domain::{CustomerRecord, EntityKind, Layer, ProductRecord};
use crate::error::Result;
use crate::ledger::RunLedger;
use crate::pipeline::ingestion::{run_isolated, TableLoadReport};
use crate::storage::Warehouse;

/// Rebuilds silver relations from bronze, one entity per TableRun
pub struct SilverLoader {
    ledger: Arc<dyn RunLedger>,
    warehouse: Arc<dyn Warehouse>,
    engine: Arc<RuleEngine>,
    gate: Arc<dyn QualityGate>,
}

fn decode<T: DeserializeOwned>(rows: Vec<serde_json::Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(Into::into))
        .collect()
}

impl SilverLoader {
    pub fn new(
        ledger: Arc<dyn RunLedger>,
        warehouse: Arc<dyn Warehouse>,
        engine: Arc<RuleEngine>,
        gate: Arc<dyn QualityGate>,
    ) -> Self {
        Self {
            ledger,
            warehouse,
            engine,
            gate,
        }
    }

    /// Full-refresh load of one silver entity
    pub fn load(&self, entity: EntityKind, batch_id: i64) -> Result<TableLoadReport> {
        let table_name = Layer::Silver.qualified(entity.table_name());
        run_isolated(self.ledger.as_ref(), batch_id, &table_name, || {
            self.rebuild(entity, batch_id)
        })
    }

    #[instrument(skip(self, entity), fields(entity = %entity))]
    fn rebuild(&self, entity: EntityKind, batch_id: i64) -> Result<u64> {
        let bronze = self.warehouse.read_bronze(entity.table_name())?;
        let before = self.gate.check_bronze(entity, &bronze);
        self.record(batch_id, &before);

        let silver = self.engine.transform(entity, &bronze)?;
        let written = self.warehouse.replace_silver(entity, &silver.to_rows()?)?;

        let references = match entity {
            EntityKind::SalesDetail => self.references()?,
            _ => References::default(),
        };
        let after = self.gate.check_silver(entity, &bronze, &silver, &references);

        self.record(batch_id, &after);
        debug!(bronze_rows = bronze.len(), silver_rows = written, "Entity rebuilt");
        Ok(written as u64)
    }

    /// Product keys and customer ids currently in silver
    fn references(&self) -> Result<References> {
        let products: Vec<ProductRecord> = decode(self.warehouse.read_silver(EntityKind::Product)?)?;
        let customers: Vec<CustomerRecord> = decode(self.warehouse.read_silver(EntityKind::Customer)?)?;
        Ok(References::from_dimensions(&products, &customers))
    }

    /// Findings are an audit side channel; losing one never fails the load
    fn record(&self, batch_id: i64, report: &QualityReport) {
        for outcome in &report.outcomes {
            if let Err(e) = self.ledger.record_finding(batch_id, outcome) {
                warn!(batch_id, check = %outcome.name, error = %e, "Failed to record quality finding");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunStatus, SourceTableSpec};
    use crate::ledger::SqliteRunLedger;
    use crate::pipeline::processing::quality_gate::DefaultQualityGate;
    use crate::storage::SqliteWarehouse;
    use crate::error::PipelineError;
    use chrono::NaiveDate;
    use serde_json::Value;

    /// Warehouse whose silver relations reject writes
    struct ReadOnlySilver(SqliteWarehouse);

    impl Warehouse for ReadOnlySilver {
        fn ensure_bronze(&self, spec: &SourceTableSpec) -> Result<()> {
            self.0.ensure_bronze(spec)
        }

        fn truncate(&self, layer: Layer, table: &str) -> Result<()> {
            self.0.truncate(layer, table)
        }

        fn bulk_insert(&self, spec: &SourceTableSpec, rows: &[Vec<Option<String>>]) -> Result<usize> {
            self.0.bulk_insert(spec, rows)
        }

        fn count_rows(&self, layer: Layer, table: &str) -> Result<u64> {
            self.0.count_rows(layer, table)
        }

        fn read_bronze(&self, table: &str) -> Result<Vec<crate::domain::BronzeRow>> {
            self.0.read_bronze(table)
        }

        fn replace_silver(&self, entity: EntityKind, _rows: &[Value]) -> Result<usize> {
            Err(PipelineError::Storage(format!("silver_{} is read-only", entity.table_name())))
        }

        fn read_silver(&self, entity: EntityKind) -> Result<Vec<Value>> {
            self.0.read_silver(entity)
        }
    }

    fn fixture() -> (Arc<SqliteRunLedger>, Arc<SqliteWarehouse>, SilverLoader) {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let ledger = Arc::new(SqliteRunLedger::open_in_memory().unwrap());
        let warehouse = Arc::new(SqliteWarehouse::open_in_memory().unwrap());
        let loader = SilverLoader::new(
            ledger.clone(),
            warehouse.clone(),
            Arc::new(RuleEngine::new(today)),
            Arc::new(DefaultQualityGate::new(today)),
        );
        (ledger, warehouse, loader)
    }

    fn seed_locations(warehouse: &SqliteWarehouse) {
        let spec = SourceTableSpec::new("erp_loc_a101", "source_erp/LOC_A101.csv", &["cid", "cntry"]);
        warehouse.ensure_bronze(&spec).unwrap();
        warehouse
            .bulk_insert(
                &spec,
                &[
                    vec![Some("AW-00011000".to_string()), Some("USA".to_string())],
                    vec![Some("AW-00011001".to_string()), None],
                ],
            )
            .unwrap();
    }

    #[test]
    fn test_silver_load_records_run_and_findings() {
        let (ledger, warehouse, loader) = fixture();
        seed_locations(&warehouse);
        let batch_id = ledger.open_batch(Layer::Silver).unwrap();

        let report = loader.load(EntityKind::ErpLocation, batch_id).unwrap();
        assert_eq!(report.table_name, "silver.erp_loc_a101");
        assert_eq!(report.outcome.row_count(), Some(2));

        let silver = warehouse.read_silver(EntityKind::ErpLocation).unwrap();
        assert_eq!(silver[0]["cid"], "AW00011000");
        assert_eq!(silver[0]["cntry"], "United States");
        assert_eq!(silver[1]["cntry"], "n/a");

        let runs = ledger.table_runs(batch_id).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Success);
        assert!(!ledger.findings(batch_id).unwrap().is_empty());
    }

    #[test]
    fn test_missing_bronze_table_fails_only_that_entity() {
        let (ledger, _warehouse, loader) = fixture();
        let batch_id = ledger.open_batch(Layer::Silver).unwrap();

        let report = loader.load(EntityKind::Customer, batch_id).unwrap();
        assert!(!report.outcome.is_success());

        let runs = ledger.table_runs(batch_id).unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].row_count, None);
        assert!(runs[0].error_message.is_some());
    }

    #[test]
    fn test_bronze_findings_survive_a_failed_rebuild() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 15).unwrap();
        let ledger = Arc::new(SqliteRunLedger::open_in_memory().unwrap());
        let warehouse = SqliteWarehouse::open_in_memory().unwrap();
        let spec = SourceTableSpec::new(
            "crm_cust_info",
            "source_crm/cust_info.csv",
            &["cst_id", "cst_firstname", "cst_lastname"],
        );
        warehouse.ensure_bronze(&spec).unwrap();
        warehouse
            .bulk_insert(
                &spec,
                &[
                    vec![Some("1".to_string()), Some(" Jon".to_string()), Some("Yang".to_string())],
                    vec![Some("1".to_string()), Some("Jon".to_string()), Some("Yang".to_string())],
                ],
            )
            .unwrap();
        let loader = SilverLoader::new(
            ledger.clone(),
            Arc::new(ReadOnlySilver(warehouse)),
            Arc::new(RuleEngine::new(today)),
            Arc::new(DefaultQualityGate::new(today)),
        );
        let batch_id = ledger.open_batch(Layer::Silver).unwrap();

        let report = loader.load(EntityKind::Customer, batch_id).unwrap();
        assert!(!report.outcome.is_success());

        let findings = ledger.findings(batch_id).unwrap();
        assert!(findings.iter().all(|f| f.gate_stage == "before"));
        let failed: Vec<&str> = findings
            .iter()
            .filter(|f| !f.passed)
            .map(|f| f.check_name.as_str())
            .collect();
        assert!(failed.contains(&"null_or_duplicate_cst_id"));
        assert!(failed.contains(&"unwanted_spaces_cst_firstname"));
    }
}
