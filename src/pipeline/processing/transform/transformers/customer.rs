use std::collections::BTreeMap;
use tracing::debug;

use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, CustomerRecord, EntityKind, SilverBatch};

/// CRM customers: one row per `cst_id`, keeping the most recently created.
///
/// Rows whose id is missing or not an integer are dropped. When two rows
/// share an id and a creation date, the larger record (by key, then names,
/// then codes) wins so the result does not depend on input order.
pub struct CustomerTransformer;

fn cleanse(row: &BronzeRow, cst_id: i64) -> CustomerRecord {
    CustomerRecord {
        cst_id,
        cst_key: rules::owned(row.get("cst_key")),
        cst_firstname: rules::trimmed(row.get("cst_firstname")),
        cst_lastname: rules::trimmed(row.get("cst_lastname")),
        cst_marital_status: rules::marital_status(row.get("cst_marital_status")),
        cst_gndr: rules::gender_code(row.get("cst_gndr")),
        cst_create_date: rules::parse_date(row.get("cst_create_date")),
    }
}

fn rank(r: &CustomerRecord) -> impl Ord + '_ {
    (
        r.cst_create_date,
        &r.cst_key,
        &r.cst_firstname,
        &r.cst_lastname,
        &r.cst_marital_status,
        &r.cst_gndr,
    )
}

impl EntityTransformer for CustomerTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::Customer
    }

    fn transform(&self, rows: &[BronzeRow], _ctx: &TransformContext) -> SilverBatch {
        let mut latest: BTreeMap<i64, CustomerRecord> = BTreeMap::new();
        let mut dropped = 0usize;

        for row in rows {
            let Some(cst_id) = rules::parse_int(row.get("cst_id")) else {
                dropped += 1;
                continue;
            };
            let candidate = cleanse(row, cst_id);
            let newer = latest
                .get(&cst_id)
                .map_or(true, |existing| rank(existing) < rank(&candidate));
            if newer {
                latest.insert(cst_id, candidate);
            }
        }

        if dropped > 0 {
            debug!(dropped, "Dropped customer rows without a usable cst_id");
        }
        SilverBatch::Customers(latest.into_values().collect())
    }
}
