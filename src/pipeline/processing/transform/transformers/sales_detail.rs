use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, EntityKind, SalesDetailRecord, SilverBatch};

/// CRM sales order lines: YYYYMMDD dates and sales/price reconciliation
pub struct SalesDetailTransformer;

fn date_field(row: &BronzeRow, column: &str) -> Option<chrono::NaiveDate> {
    rules::date_from_yyyymmdd(rules::parse_int(row.get(column)))
}

impl EntityTransformer for SalesDetailTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::SalesDetail
    }

    fn transform(&self, rows: &[BronzeRow], _ctx: &TransformContext) -> SilverBatch {
        let records = rows
            .iter()
            .map(|row| {
                let quantity = rules::parse_int(row.get("sls_quantity"));
                let (sales, price) = rules::reconcile_sales(
                    rules::parse_int(row.get("sls_sales")),
                    quantity,
                    rules::parse_int(row.get("sls_price")),
                );
                SalesDetailRecord {
                    sls_ord_num: rules::owned(row.get("sls_ord_num")),
                    sls_prd_key: rules::owned(row.get("sls_prd_key")),
                    sls_cust_id: rules::parse_int(row.get("sls_cust_id")),
                    sls_order_dt: date_field(row, "sls_order_dt"),
                    sls_ship_dt: date_field(row, "sls_ship_dt"),
                    sls_due_dt: date_field(row, "sls_due_dt"),
                    sls_sales: sales,
                    sls_quantity: quantity,
                    sls_price: price,
                }
            })
            .collect();
        SilverBatch::SalesDetails(records)
    }
}
