/// Source system folders under the configured base path
pub const SOURCE_CRM: &str = "source_crm";
pub const SOURCE_ERP: &str = "source_erp";

pub const FIELD_DELIMITER: char = ',';

/// Placeholder written when a coded field cannot be mapped
pub const NOT_AVAILABLE: &str = "n/a";

/// Default location of the warehouse database
pub const DEFAULT_DATABASE_PATH: &str = "data/warehouse.db";
pub const DEFAULT_BASE_PATH: &str = "datasets";
pub const DEFAULT_LOG_DIR: &str = "logs";

use crate::domain::SourceTableSpec;

/// The six fixed source tables, in load order
pub fn default_sources() -> Vec<SourceTableSpec> {
    vec![
        SourceTableSpec::new(
            "crm_cust_info",
            "source_crm/cust_info.csv",
            &[
                "cst_id",
                "cst_key",
                "cst_firstname",
                "cst_lastname",
                "cst_marital_status",
                "cst_gndr",
                "cst_create_date",
            ],
        ),
        SourceTableSpec::new(
            "crm_prd_info",
            "source_crm/prd_info.csv",
            &["prd_id", "prd_key", "prd_nm", "prd_cost", "prd_line", "prd_start_dt", "prd_end_dt"],
        ),
        SourceTableSpec::new(
            "crm_sales_details",
            "source_crm/sales_details.csv",
            &[
                "sls_ord_num",
                "sls_prd_key",
                "sls_cust_id",
                "sls_order_dt",
                "sls_ship_dt",
                "sls_due_dt",
                "sls_sales",
                "sls_quantity",
                "sls_price",
            ],
        ),
        SourceTableSpec::new("erp_loc_a101", "source_erp/LOC_A101.csv", &["cid", "cntry"]),
        SourceTableSpec::new("erp_cust_az12", "source_erp/CUST_AZ12.csv", &["cid", "bdate", "gen"]),
        SourceTableSpec::new(
            "erp_px_cat_g1v2",
            "source_erp/PX_CAT_G1V2.csv",
            &["id", "cat", "subcat", "maintenance"],
        ),
    ]
}
