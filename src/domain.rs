use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Lifecycle status shared by batch and table runs
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "SUCCESS" => Some(RunStatus::Success),
            "FAILED" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warehouse layer a relation belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Bronze,
    Silver,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Bronze => "bronze",
            Layer::Silver => "silver",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bronze" => Some(Layer::Bronze),
            "silver" => Some(Layer::Silver),
            _ => None,
        }
    }

    /// Name used in ledger rows and logs, e.g. `bronze.crm_cust_info`
    pub fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.as_str(), table)
    }

    /// Name of the physical SQLite relation, e.g. `bronze_crm_cust_info`
    pub fn physical(&self, table: &str) -> String {
        format!("{}_{}", self.as_str(), table)
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end execution of a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRun {
    pub batch_id: i64,
    pub stage: Layer,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// One table (or entity) load inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRun {
    pub run_id: i64,
    pub batch_id: i64,
    pub table_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub row_count: Option<u64>,
    pub status: RunStatus,
    pub error_message: Option<String>,
}

/// Static description of one source extract
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceTableSpec {
    pub table_name: String,
    /// Path of the flat file, relative to the configured base path
    pub source_location: PathBuf,
    pub columns: Vec<String>,
}

impl SourceTableSpec {
    pub fn new(table_name: &str, source_location: &str, columns: &[&str]) -> Self {
        Self {
            table_name: table_name.to_string(),
            source_location: PathBuf::from(source_location),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn resolve(&self, base_path: &Path) -> PathBuf {
        base_path.join(&self.source_location)
    }
}

/// Raw bronze record. Values are the extract's text verbatim; `None` is SQL NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BronzeRow {
    fields: BTreeMap<String, Option<String>>,
}

impl BronzeRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: Option<&str>) -> Self {
        self.set(column, value.map(str::to_string));
        self
    }

    pub fn set(&mut self, column: &str, value: Option<String>) {
        self.fields.insert(column.to_string(), value);
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(|v| v.as_deref())
    }
}

/// The six silver entities produced by the transformation engine
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Product,
    SalesDetail,
    ErpCustomerDemo,
    ErpLocation,
    ProductCategory,
}

impl EntityKind {
    /// Silver load order: dimensions before the sales facts that reference them
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Customer,
        EntityKind::Product,
        EntityKind::SalesDetail,
        EntityKind::ErpCustomerDemo,
        EntityKind::ErpLocation,
        EntityKind::ProductCategory,
    ];

    /// Source table (and silver table) name
    pub fn table_name(&self) -> &'static str {
        match self {
            EntityKind::Customer => "crm_cust_info",
            EntityKind::Product => "crm_prd_info",
            EntityKind::SalesDetail => "crm_sales_details",
            EntityKind::ErpCustomerDemo => "erp_cust_az12",
            EntityKind::ErpLocation => "erp_loc_a101",
            EntityKind::ProductCategory => "erp_px_cat_g1v2",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.table_name() == name)
    }

    /// Business key that must be non-null and unique in silver
    pub fn natural_key(&self) -> Option<&'static str> {
        match self {
            EntityKind::Customer => Some("cst_id"),
            EntityKind::Product => Some("prd_id"),
            EntityKind::SalesDetail => None,
            EntityKind::ErpCustomerDemo => Some("cid"),
            EntityKind::ErpLocation => Some("cid"),
            EntityKind::ProductCategory => Some("id"),
        }
    }

    /// Silver column layout as (name, SQLite type)
    pub fn silver_columns(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            EntityKind::Customer => &[
                ("cst_id", "INTEGER"),
                ("cst_key", "TEXT"),
                ("cst_firstname", "TEXT"),
                ("cst_lastname", "TEXT"),
                ("cst_marital_status", "TEXT"),
                ("cst_gndr", "TEXT"),
                ("cst_create_date", "TEXT"),
            ],
            EntityKind::Product => &[
                ("prd_id", "INTEGER"),
                ("cat_id", "TEXT"),
                ("prd_key", "TEXT"),
                ("prd_nm", "TEXT"),
                ("prd_cost", "INTEGER"),
                ("prd_line", "TEXT"),
                ("prd_start_dt", "TEXT"),
                ("prd_end_dt", "TEXT"),
            ],
            EntityKind::SalesDetail => &[
                ("sls_ord_num", "TEXT"),
                ("sls_prd_key", "TEXT"),
                ("sls_cust_id", "INTEGER"),
                ("sls_order_dt", "TEXT"),
                ("sls_ship_dt", "TEXT"),
                ("sls_due_dt", "TEXT"),
                ("sls_sales", "INTEGER"),
                ("sls_quantity", "INTEGER"),
                ("sls_price", "INTEGER"),
            ],
            EntityKind::ErpCustomerDemo => &[("cid", "TEXT"), ("bdate", "TEXT"), ("gen", "TEXT")],
            EntityKind::ErpLocation => &[("cid", "TEXT"), ("cntry", "TEXT")],
            EntityKind::ProductCategory => &[
                ("id", "TEXT"),
                ("cat", "TEXT"),
                ("subcat", "TEXT"),
                ("maintenance", "TEXT"),
            ],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub cst_id: i64,
    pub cst_key: Option<String>,
    pub cst_firstname: Option<String>,
    pub cst_lastname: Option<String>,
    pub cst_marital_status: String,
    pub cst_gndr: String,
    pub cst_create_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub prd_id: Option<i64>,
    pub cat_id: Option<String>,
    pub prd_key: Option<String>,
    pub prd_nm: Option<String>,
    pub prd_cost: i64,
    pub prd_line: String,
    pub prd_start_dt: Option<NaiveDate>,
    pub prd_end_dt: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesDetailRecord {
    pub sls_ord_num: Option<String>,
    pub sls_prd_key: Option<String>,
    pub sls_cust_id: Option<i64>,
    pub sls_order_dt: Option<NaiveDate>,
    pub sls_ship_dt: Option<NaiveDate>,
    pub sls_due_dt: Option<NaiveDate>,
    pub sls_sales: Option<i64>,
    pub sls_quantity: Option<i64>,
    pub sls_price: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpCustomerDemoRecord {
    pub cid: Option<String>,
    pub bdate: Option<NaiveDate>,
    pub gen: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErpLocationRecord {
    pub cid: Option<String>,
    pub cntry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductCategoryRecord {
    pub id: Option<String>,
    pub cat: Option<String>,
    pub subcat: Option<String>,
    pub maintenance: Option<String>,
}

/// The typed output of one entity transformation
#[derive(Debug, Clone, PartialEq)]
pub enum SilverBatch {
    Customers(Vec<CustomerRecord>),
    Products(Vec<ProductRecord>),
    SalesDetails(Vec<SalesDetailRecord>),
    ErpCustomerDemos(Vec<ErpCustomerDemoRecord>),
    ErpLocations(Vec<ErpLocationRecord>),
    ProductCategories(Vec<ProductCategoryRecord>),
}

impl SilverBatch {
    pub fn entity(&self) -> EntityKind {
        match self {
            SilverBatch::Customers(_) => EntityKind::Customer,
            SilverBatch::Products(_) => EntityKind::Product,
            SilverBatch::SalesDetails(_) => EntityKind::SalesDetail,
            SilverBatch::ErpCustomerDemos(_) => EntityKind::ErpCustomerDemo,
            SilverBatch::ErpLocations(_) => EntityKind::ErpLocation,
            SilverBatch::ProductCategories(_) => EntityKind::ProductCategory,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SilverBatch::Customers(r) => r.len(),
            SilverBatch::Products(r) => r.len(),
            SilverBatch::SalesDetails(r) => r.len(),
            SilverBatch::ErpCustomerDemos(r) => r.len(),
            SilverBatch::ErpLocations(r) => r.len(),
            SilverBatch::ProductCategories(r) => r.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializes every record to a JSON object keyed by silver column
    pub fn to_rows(&self) -> serde_json::Result<Vec<serde_json::Value>> {
        fn rows<T: Serialize>(records: &[T]) -> serde_json::Result<Vec<serde_json::Value>> {
            records.iter().map(serde_json::to_value).collect()
        }
        match self {
            SilverBatch::Customers(r) => rows(r),
            SilverBatch::Products(r) => rows(r),
            SilverBatch::SalesDetails(r) => rows(r),
            SilverBatch::ErpCustomerDemos(r) => rows(r),
            SilverBatch::ErpLocations(r) => rows(r),
            SilverBatch::ProductCategories(r) => rows(r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_names() {
        assert_eq!(Layer::Bronze.qualified("crm_cust_info"), "bronze.crm_cust_info");
        assert_eq!(Layer::Silver.physical("crm_cust_info"), "silver_crm_cust_info");
    }

    #[test]
    fn test_entity_lookup_by_table() {
        for entity in EntityKind::ALL {
            assert_eq!(EntityKind::from_table_name(entity.table_name()), Some(entity));
        }
        assert_eq!(EntityKind::from_table_name("gold_fact_sales"), None);
    }

    #[test]
    fn test_silver_rows_follow_column_layout() {
        let batch = SilverBatch::ErpLocations(vec![ErpLocationRecord {
            cid: Some("AW00011000".to_string()),
            cntry: "Germany".to_string(),
        }]);
        let rows = batch.to_rows().unwrap();
        let obj = rows[0].as_object().unwrap();
        for (column, _) in EntityKind::ErpLocation.silver_columns() {
            assert!(obj.contains_key(*column), "missing {}", column);
        }
    }

    #[test]
    fn test_run_status_round_trips_through_text() {
        for status in [RunStatus::Running, RunStatus::Success, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert!(!RunStatus::Running.is_terminal());
    }
}
