use chrono::{NaiveDate, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, warn};

use crate::domain::{
    BronzeRow, CustomerRecord, EntityKind, ErpCustomerDemoRecord, ErpLocationRecord,
    ProductCategoryRecord, ProductRecord, SalesDetailRecord, SilverBatch,
};
use crate::pipeline::processing::transform::rules;

/// Which side of the transformation a check looked at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateStage {
    /// Bronze rows, before transformation
    Before,
    /// Silver rows, after transformation
    After,
}

impl GateStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateStage::Before => "before",
            GateStage::After => "after",
        }
    }
}

/// What a passing check observes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Expectation {
    /// No offending rows
    EmptySet,
    /// Exactly this many rows
    RowCount(usize),
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::EmptySet => f.write_str("empty set"),
            Expectation::RowCount(n) => write!(f, "row count = {}", n),
        }
    }
}

/// Result of evaluating one check against a row set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckOutcome {
    pub entity: EntityKind,
    pub stage: GateStage,
    pub name: String,
    pub expectation: Expectation,
    /// Offending rows for `EmptySet`, total rows for `RowCount`
    pub observed: usize,
    pub passed: bool,
    /// A few offending values, for the audit trail
    pub samples: Vec<String>,
}

/// All outcomes of one gate pass over one entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub entity: EntityKind,
    pub stage: GateStage,
    pub outcomes: Vec<CheckOutcome>,
}

impl QualityReport {
    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.outcomes.iter().filter(|o| !o.passed)
    }

    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(|o| o.passed)
    }

    pub fn outcome(&self, name: &str) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }
}

/// Keys of already-loaded silver dimensions, for referential checks on sales
#[derive(Debug, Clone, Default)]
pub struct References {
    pub product_keys: HashSet<String>,
    pub customer_ids: HashSet<i64>,
}

impl References {
    pub fn from_dimensions(products: &[ProductRecord], customers: &[CustomerRecord]) -> Self {
        Self {
            product_keys: products.iter().filter_map(|p| p.prd_key.clone()).collect(),
            customer_ids: customers.iter().map(|c| c.cst_id).collect(),
        }
    }
}

/// Audits row sets around a transformation. Checks are advisory: they report,
/// they never reject rows.
pub trait QualityGate: Send + Sync {
    fn check_bronze(&self, entity: EntityKind, rows: &[BronzeRow]) -> QualityReport;

    fn check_silver(
        &self,
        entity: EntityKind,
        bronze: &[BronzeRow],
        silver: &SilverBatch,
        references: &References,
    ) -> QualityReport;
}

#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    /// Maximum offending values kept per outcome
    pub sample_limit: usize,
    /// Birthdates before this are implausible
    pub min_birthdate: NaiveDate,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self {
            sample_limit: 5,
            min_birthdate: NaiveDate::from_ymd_opt(1924, 1, 1).unwrap_or(NaiveDate::MIN),
        }
    }
}

/// The fixed battery of medallion checks
pub struct DefaultQualityGate {
    pub config: QualityGateConfig,
    today: NaiveDate,
}

const MARITAL_VALUES: &[&str] = &["Single", "Married", "n/a"];
const GENDER_VALUES: &[&str] = &["Female", "Male", "n/a"];
const LINE_VALUES: &[&str] = &["Mountain", "Road", "Other Sales", "Touring", "n/a"];
const NULL_LABEL: &str = "NULL";

fn label(value: Option<&str>) -> String {
    value.unwrap_or(NULL_LABEL).to_string()
}

fn has_unwanted_spaces(value: Option<&str>) -> bool {
    value.is_some_and(|v| v != v.trim())
}

/// Keys that are null or occur more than once, in key order
fn null_or_duplicate<'a, I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts: BTreeMap<Option<&str>, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(key, count)| key.is_none() || *count > 1)
        .map(|(key, _)| label(key))
        .collect()
}

/// Distinct values outside the allowed domain
fn outside_domain<'a, I>(values: I, allowed: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter(|v| !allowed.contains(v))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

impl DefaultQualityGate {
    pub fn new(today: NaiveDate) -> Self {
        Self::with_config(QualityGateConfig::default(), today)
    }

    pub fn with_config(config: QualityGateConfig, today: NaiveDate) -> Self {
        Self { config, today }
    }

    fn birthdate_out_of_range(&self, date: NaiveDate) -> bool {
        date < self.config.min_birthdate || date > self.today
    }

    fn empty_set(&self, entity: EntityKind, stage: GateStage, name: &str, offenders: Vec<String>) -> CheckOutcome {
        CheckOutcome {
            entity,
            stage,
            name: name.to_string(),
            expectation: Expectation::EmptySet,
            observed: offenders.len(),
            passed: offenders.is_empty(),
            samples: offenders.into_iter().take(self.config.sample_limit).collect(),
        }
    }

    fn row_count(&self, entity: EntityKind, name: &str, expected: usize, observed: usize) -> CheckOutcome {
        CheckOutcome {
            entity,
            stage: GateStage::After,
            name: name.to_string(),
            expectation: Expectation::RowCount(expected),
            observed,
            passed: expected == observed,
            samples: Vec::new(),
        }
    }

    fn report(&self, entity: EntityKind, stage: GateStage, outcomes: Vec<CheckOutcome>) -> QualityReport {
        let report = QualityReport {
            entity,
            stage,
            outcomes,
        };
        for failure in report.failures() {
            warn!(
                entity = %entity,
                stage = stage.as_str(),
                check = %failure.name,
                expectation = %failure.expectation,
                observed = failure.observed,
                samples = ?failure.samples,
                "Quality check failed"
            );
            counter!(
                "medallion_quality_checks_failed_total",
                "entity" => entity.table_name(),
                "check" => failure.name.clone()
            )
            .increment(1);
        }
        debug!(
            entity = %entity,
            stage = stage.as_str(),
            checks = report.outcomes.len(),
            passed = report.passed(),
            "Quality gate evaluated"
        );
        report
    }

    fn unwanted_spaces(&self, entity: EntityKind, stage: GateStage, rows: &[BronzeRow], column: &str) -> CheckOutcome {
        let offenders = rows
            .iter()
            .filter_map(|r| r.get(column))
            .filter(|v| has_unwanted_spaces(Some(*v)))
            .map(|v| format!("{:?}", v))
            .collect();
        self.empty_set(entity, stage, &format!("unwanted_spaces_{}", column), offenders)
    }

    fn bronze_checks(&self, entity: EntityKind, rows: &[BronzeRow]) -> Vec<CheckOutcome> {
        let stage = GateStage::Before;
        match entity {
            EntityKind::Customer => vec![
                self.empty_set(
                    entity,
                    stage,
                    "null_or_duplicate_cst_id",
                    null_or_duplicate(rows.iter().map(|r| r.get("cst_id"))),
                ),
                self.unwanted_spaces(entity, stage, rows, "cst_firstname"),
                self.unwanted_spaces(entity, stage, rows, "cst_lastname"),
            ],
            EntityKind::Product => {
                let bad_cost = rows
                    .iter()
                    .filter(|r| rules::parse_int(r.get("prd_cost")).map_or(true, |c| c < 0))
                    .map(|r| label(r.get("prd_id")))
                    .collect();
                vec![
                    self.empty_set(
                        entity,
                        stage,
                        "null_or_duplicate_prd_id",
                        null_or_duplicate(rows.iter().map(|r| r.get("prd_id"))),
                    ),
                    self.unwanted_spaces(entity, stage, rows, "prd_nm"),
                    self.empty_set(entity, stage, "null_or_negative_cost", bad_cost),
                ]
            }
            EntityKind::SalesDetail => ["sls_order_dt", "sls_ship_dt", "sls_due_dt"]
                .into_iter()
                .map(|column| {
                    let offenders = rows
                        .iter()
                        .filter_map(|r| r.get(column))
                        .filter(|raw| rules::date_from_yyyymmdd(rules::parse_int(Some(*raw))).is_none())
                        .map(str::to_string)
                        .collect();
                    self.empty_set(entity, stage, &format!("invalid_{}", column), offenders)
                })
                .collect(),
            EntityKind::ErpCustomerDemo => {
                let offenders = rows
                    .iter()
                    .filter(|r| {
                        rules::parse_date(r.get("bdate")).is_some_and(|d| self.birthdate_out_of_range(d))
                    })
                    .map(|r| label(r.get("bdate")))
                    .collect();
                vec![self.empty_set(entity, stage, "out_of_range_bdate", offenders)]
            }
            EntityKind::ErpLocation => Vec::new(),
            EntityKind::ProductCategory => ["cat", "subcat", "maintenance"]
                .into_iter()
                .map(|column| self.unwanted_spaces(entity, stage, rows, column))
                .collect(),
        }
    }

    fn natural_key_check(&self, entity: EntityKind, keys: Vec<Option<String>>) -> CheckOutcome {
        let name = format!("null_or_duplicate_{}", entity.natural_key().unwrap_or("key"));
        let offenders = null_or_duplicate(keys.iter().map(|k| k.as_deref()));
        self.empty_set(entity, GateStage::After, &name, offenders)
    }

    fn customer_checks(&self, records: &[CustomerRecord]) -> Vec<CheckOutcome> {
        let entity = EntityKind::Customer;
        let stage = GateStage::After;
        let spaced = records
            .iter()
            .filter(|c| {
                has_unwanted_spaces(c.cst_firstname.as_deref()) || has_unwanted_spaces(c.cst_lastname.as_deref())
            })
            .map(|c| c.cst_id.to_string())
            .collect();
        vec![
            self.natural_key_check(entity, records.iter().map(|c| Some(c.cst_id.to_string())).collect()),
            self.empty_set(entity, stage, "unwanted_spaces_names", spaced),
            self.empty_set(
                entity,
                stage,
                "domain_cst_marital_status",
                outside_domain(records.iter().map(|c| c.cst_marital_status.as_str()), MARITAL_VALUES),
            ),
            self.empty_set(
                entity,
                stage,
                "domain_cst_gndr",
                outside_domain(records.iter().map(|c| c.cst_gndr.as_str()), GENDER_VALUES),
            ),
        ]
    }

    fn product_checks(&self, records: &[ProductRecord]) -> Vec<CheckOutcome> {
        let entity = EntityKind::Product;
        let stage = GateStage::After;
        let id = |p: &ProductRecord| p.prd_id.map_or_else(|| NULL_LABEL.to_string(), |i| i.to_string());
        let negative = records.iter().filter(|p| p.prd_cost < 0).map(id).collect();
        let inverted = records
            .iter()
            .filter(|p| matches!((p.prd_start_dt, p.prd_end_dt), (Some(s), Some(e)) if e < s))
            .map(id)
            .collect();
        vec![
            self.natural_key_check(
                entity,
                records.iter().map(|p| p.prd_id.map(|i| i.to_string())).collect(),
            ),
            self.empty_set(entity, stage, "negative_cost", negative),
            self.empty_set(
                entity,
                stage,
                "domain_prd_line",
                outside_domain(records.iter().map(|p| p.prd_line.as_str()), LINE_VALUES),
            ),
            self.empty_set(entity, stage, "end_before_start", inverted),
        ]
    }

    fn sales_checks(&self, records: &[SalesDetailRecord], references: &References) -> Vec<CheckOutcome> {
        let entity = EntityKind::SalesDetail;
        let stage = GateStage::After;
        let order = |s: &SalesDetailRecord| label(s.sls_ord_num.as_deref());

        let out_of_order = records
            .iter()
            .filter(|s| match s.sls_order_dt {
                Some(o) => s.sls_ship_dt.is_some_and(|d| o > d) || s.sls_due_dt.is_some_and(|d| o > d),
                None => false,
            })
            .map(order)
            .collect();

        let inconsistent = records
            .iter()
            .filter(|s| match (s.sls_sales, s.sls_quantity, s.sls_price) {
                (Some(sales), Some(q), Some(p)) if sales > 0 && q > 0 && p > 0 => {
                    q.checked_mul(p) != Some(sales)
                }
                _ => true,
            })
            .map(order)
            .collect();

        let orphan_products = records
            .iter()
            .filter(|s| {
                s.sls_prd_key
                    .as_ref()
                    .map_or(true, |k| !references.product_keys.contains(k))
            })
            .map(|s| label(s.sls_prd_key.as_deref()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let orphan_customers = records
            .iter()
            .filter(|s| s.sls_cust_id.map_or(true, |c| !references.customer_ids.contains(&c)))
            .map(|s| s.sls_cust_id.map_or_else(|| NULL_LABEL.to_string(), |c| c.to_string()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        vec![
            self.empty_set(entity, stage, "order_after_ship_or_due", out_of_order),
            self.empty_set(entity, stage, "sales_quantity_price_mismatch", inconsistent),
            self.empty_set(entity, stage, "sales_product_not_in_products", orphan_products),
            self.empty_set(entity, stage, "sales_customer_not_in_customers", orphan_customers),
        ]
    }

    fn erp_customer_demo_checks(&self, records: &[ErpCustomerDemoRecord]) -> Vec<CheckOutcome> {
        let entity = EntityKind::ErpCustomerDemo;
        let stage = GateStage::After;
        let out_of_range = records
            .iter()
            .filter(|r| r.bdate.is_some_and(|d| self.birthdate_out_of_range(d)))
            .map(|r| label(r.cid.as_deref()))
            .collect();
        vec![
            self.natural_key_check(entity, records.iter().map(|r| r.cid.clone()).collect()),
            self.empty_set(entity, stage, "out_of_range_bdate", out_of_range),
            self.empty_set(
                entity,
                stage,
                "domain_gen",
                outside_domain(records.iter().map(|r| r.gen.as_str()), GENDER_VALUES),
            ),
        ]
    }

    fn erp_location_checks(&self, records: &[ErpLocationRecord]) -> Vec<CheckOutcome> {
        let entity = EntityKind::ErpLocation;
        let bad_country = records
            .iter()
            .map(|r| r.cntry.as_str())
            .filter(|c| c.is_empty() || *c != c.trim())
            .map(|c| format!("{:?}", c))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        vec![
            self.natural_key_check(entity, records.iter().map(|r| r.cid.clone()).collect()),
            self.empty_set(entity, GateStage::After, "domain_cntry", bad_country),
        ]
    }

    fn product_category_checks(&self, records: &[ProductCategoryRecord]) -> Vec<CheckOutcome> {
        let entity = EntityKind::ProductCategory;
        let spaced = records
            .iter()
            .filter(|r| {
                has_unwanted_spaces(r.cat.as_deref())
                    || has_unwanted_spaces(r.subcat.as_deref())
                    || has_unwanted_spaces(r.maintenance.as_deref())
            })
            .map(|r| label(r.id.as_deref()))
            .collect();
        vec![
            self.natural_key_check(entity, records.iter().map(|r| r.id.clone()).collect()),
            self.empty_set(entity, GateStage::After, "unwanted_spaces_categories", spaced),
        ]
    }
}

impl Default for DefaultQualityGate {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

/// Number of silver rows a faithful transformation should produce
fn expected_silver_rows(entity: EntityKind, bronze: &[BronzeRow]) -> usize {
    match entity {
        EntityKind::Customer => bronze
            .iter()
            .filter_map(|r| rules::parse_int(r.get("cst_id")))
            .collect::<HashSet<_>>()
            .len(),
        _ => bronze.len(),
    }
}

impl QualityGate for DefaultQualityGate {
    fn check_bronze(&self, entity: EntityKind, rows: &[BronzeRow]) -> QualityReport {
        let outcomes = self.bronze_checks(entity, rows);
        self.report(entity, GateStage::Before, outcomes)
    }

    fn check_silver(
        &self,
        entity: EntityKind,
        bronze: &[BronzeRow],
        silver: &SilverBatch,
        references: &References,
    ) -> QualityReport {
        let mut outcomes = vec![self.row_count(
            entity,
            "row_count_parity",
            expected_silver_rows(entity, bronze),
            silver.len(),
        )];
        outcomes.extend(match silver {
            SilverBatch::Customers(r) => self.customer_checks(r),
            SilverBatch::Products(r) => self.product_checks(r),
            SilverBatch::SalesDetails(r) => self.sales_checks(r, references),
            SilverBatch::ErpCustomerDemos(r) => self.erp_customer_demo_checks(r),
            SilverBatch::ErpLocations(r) => self.erp_location_checks(r),
            SilverBatch::ProductCategories(r) => self.product_category_checks(r),
        });
        self.report(entity, GateStage::After, outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> DefaultQualityGate {
        DefaultQualityGate::new(NaiveDate::from_ymd_opt(2026, 10, 15).unwrap())
    }

    fn customer(id: i64) -> CustomerRecord {
        CustomerRecord {
            cst_id: id,
            cst_key: Some(format!("AW{:08}", id)),
            cst_firstname: Some("Jon".to_string()),
            cst_lastname: Some("Yang".to_string()),
            cst_marital_status: "Married".to_string(),
            cst_gndr: "Male".to_string(),
            cst_create_date: None,
        }
    }

    fn sale(prd_key: &str, cust: i64, sales: i64, qty: i64, price: i64) -> SalesDetailRecord {
        SalesDetailRecord {
            sls_ord_num: Some("SO43697".to_string()),
            sls_prd_key: Some(prd_key.to_string()),
            sls_cust_id: Some(cust),
            sls_order_dt: NaiveDate::from_ymd_opt(2010, 12, 29),
            sls_ship_dt: NaiveDate::from_ymd_opt(2011, 1, 5),
            sls_due_dt: NaiveDate::from_ymd_opt(2011, 1, 10),
            sls_sales: Some(sales),
            sls_quantity: Some(qty),
            sls_price: Some(price),
        }
    }

    #[test]
    fn test_bronze_duplicate_keys_are_reported_not_rejected() {
        let rows = vec![
            BronzeRow::new().with("cst_id", Some("29466")).with("cst_firstname", Some(" Lee")),
            BronzeRow::new().with("cst_id", Some("29466")),
            BronzeRow::new().with("cst_id", None),
            BronzeRow::new().with("cst_id", Some("11000")),
        ];
        let report = gate().check_bronze(EntityKind::Customer, &rows);
        let dup = report.outcome("null_or_duplicate_cst_id").unwrap();
        assert!(!dup.passed);
        assert_eq!(dup.observed, 2);
        assert_eq!(dup.samples, vec!["NULL".to_string(), "29466".to_string()]);
        assert!(!report.outcome("unwanted_spaces_cst_firstname").unwrap().passed);
        assert!(report.outcome("unwanted_spaces_cst_lastname").unwrap().passed);
    }

    #[test]
    fn test_customer_parity_counts_distinct_keys() {
        let bronze = vec![
            BronzeRow::new().with("cst_id", Some("1")),
            BronzeRow::new().with("cst_id", Some("1")),
            BronzeRow::new().with("cst_id", Some("2")),
            BronzeRow::new().with("cst_id", None),
        ];
        let silver = SilverBatch::Customers(vec![customer(1), customer(2)]);
        let report = gate().check_silver(EntityKind::Customer, &bronze, &silver, &References::default());
        let parity = report.outcome("row_count_parity").unwrap();
        assert_eq!(parity.expectation, Expectation::RowCount(2));
        assert!(parity.passed);
        assert!(report.passed());
    }

    #[test]
    fn test_duplicate_silver_key_is_flagged() {
        let location = |cid: &str| ErpLocationRecord {
            cid: Some(cid.to_string()),
            cntry: "Germany".to_string(),
        };
        let bronze = vec![BronzeRow::new(), BronzeRow::new()];
        let silver = SilverBatch::ErpLocations(vec![location("AW00011000"), location("AW00011000")]);
        let report = gate().check_silver(EntityKind::ErpLocation, &bronze, &silver, &References::default());

        let dup = report.outcome("null_or_duplicate_cid").unwrap();
        assert_eq!(dup.stage, GateStage::After);
        assert!(!dup.passed);
        assert_eq!(dup.observed, 1);
        assert_eq!(dup.samples, vec!["AW00011000".to_string()]);
        assert!(report.outcome("row_count_parity").unwrap().passed);
    }

    #[test]
    fn test_sales_referential_and_consistency_checks() {
        let references = References {
            product_keys: ["BK-R93R-62".to_string()].into_iter().collect(),
            customer_ids: [21768].into_iter().collect(),
        };
        let bronze = vec![BronzeRow::new(), BronzeRow::new()];
        let silver = SilverBatch::SalesDetails(vec![
            sale("BK-R93R-62", 21768, 30, 3, 10),
            sale("XX-MISSING", 99, 31, 3, 10),
        ]);
        let report = gate().check_silver(EntityKind::SalesDetail, &bronze, &silver, &references);
        assert!(report.outcome("row_count_parity").unwrap().passed);
        assert!(report.outcome("order_after_ship_or_due").unwrap().passed);

        let mismatch = report.outcome("sales_quantity_price_mismatch").unwrap();
        assert_eq!(mismatch.observed, 1);

        let products = report.outcome("sales_product_not_in_products").unwrap();
        assert_eq!(products.samples, vec!["XX-MISSING".to_string()]);
        let customers = report.outcome("sales_customer_not_in_customers").unwrap();
        assert_eq!(customers.samples, vec!["99".to_string()]);
        assert_eq!(report.failures().count(), 3);
    }

    #[test]
    fn test_order_date_after_ship_date_is_flagged() {
        let mut late = sale("BK-R93R-62", 1, 10, 1, 10);
        late.sls_ship_dt = NaiveDate::from_ymd_opt(2010, 12, 1);
        let silver = SilverBatch::SalesDetails(vec![late]);
        let report = gate().check_silver(EntityKind::SalesDetail, &[BronzeRow::new()], &silver, &References::default());
        assert!(!report.outcome("order_after_ship_or_due").unwrap().passed);
    }

    #[test]
    fn test_product_end_before_start() {
        let product = ProductRecord {
            prd_id: Some(1),
            cat_id: Some("CO_RF".to_string()),
            prd_key: Some("FR-R92B-58".to_string()),
            prd_nm: Some("HL Road Frame".to_string()),
            prd_cost: -5,
            prd_line: "Road".to_string(),
            prd_start_dt: NaiveDate::from_ymd_opt(2012, 1, 1),
            prd_end_dt: NaiveDate::from_ymd_opt(2011, 1, 1),
        };
        let silver = SilverBatch::Products(vec![product]);
        let report = gate().check_silver(EntityKind::Product, &[BronzeRow::new()], &silver, &References::default());
        assert!(!report.outcome("end_before_start").unwrap().passed);
        assert!(!report.outcome("negative_cost").unwrap().passed);
        assert!(report.outcome("domain_prd_line").unwrap().passed);
    }

    #[test]
    fn test_birthdate_range() {
        let rows = vec![
            BronzeRow::new().with("bdate", Some("1916-02-10")),
            BronzeRow::new().with("bdate", Some("1971-10-06")),
            BronzeRow::new().with("bdate", Some("2030-01-01")),
        ];
        let report = gate().check_bronze(EntityKind::ErpCustomerDemo, &rows);
        assert_eq!(report.outcome("out_of_range_bdate").unwrap().observed, 2);
    }

    #[test]
    fn test_samples_are_capped() {
        let rows: Vec<BronzeRow> = (0..20)
            .map(|i| BronzeRow::new().with("sls_order_dt", Some(i.to_string().as_str())))
            .collect();
        let report = gate().check_bronze(EntityKind::SalesDetail, &rows);
        let invalid = report.outcome("invalid_sls_order_dt").unwrap();
        assert_eq!(invalid.observed, 20);
        assert_eq!(invalid.samples.len(), 5);
        assert!(report.outcome("invalid_sls_ship_dt").unwrap().passed);
    }

    #[test]
    fn test_expectation_display() {
        assert_eq!(Expectation::EmptySet.to_string(), "empty set");
        assert_eq!(Expectation::RowCount(3).to_string(), "row count = 3");
    }
}
