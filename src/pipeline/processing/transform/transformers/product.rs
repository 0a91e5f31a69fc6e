use std::collections::HashMap;

use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, EntityKind, ProductRecord, SilverBatch};

/// CRM products. No deduplication; each version of a product key gets an end
/// date closing it the day before the next version starts.
pub struct ProductTransformer;

fn cleanse(row: &BronzeRow) -> ProductRecord {
    let (cat_id, prd_key) = match row.get("prd_key") {
        Some(key) => {
            let (cat, prd) = rules::split_product_key(key.trim());
            (Some(cat), Some(prd))
        }
        None => (None, None),
    };
    ProductRecord {
        prd_id: rules::parse_int(row.get("prd_id")),
        cat_id,
        prd_key,
        prd_nm: rules::owned(row.get("prd_nm")),
        prd_cost: rules::parse_int(row.get("prd_cost")).unwrap_or(0),
        prd_line: rules::product_line(row.get("prd_line")),
        prd_start_dt: rules::parse_date(row.get("prd_start_dt")),
        prd_end_dt: None,
    }
}

/// Fills `prd_end_dt` per product key from the following version's start
fn assign_end_dates(records: &mut [ProductRecord]) {
    let mut versions: HashMap<Option<String>, Vec<usize>> = HashMap::new();
    for (idx, record) in records.iter().enumerate() {
        versions.entry(record.prd_key.clone()).or_default().push(idx);
    }

    for mut indices in versions.into_values() {
        indices.sort_by_key(|&i| (records[i].prd_start_dt, records[i].prd_id, i));
        for pair in indices.windows(2) {
            let next_start = records[pair[1]].prd_start_dt;
            records[pair[0]].prd_end_dt = next_start.and_then(rules::day_before);
        }
    }
}

impl EntityTransformer for ProductTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::Product
    }

    fn transform(&self, rows: &[BronzeRow], _ctx: &TransformContext) -> SilverBatch {
        let mut records: Vec<ProductRecord> = rows.iter().map(cleanse).collect();
        assign_end_dates(&mut records);
        SilverBatch::Products(records)
    }
}
