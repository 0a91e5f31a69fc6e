use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, EntityKind, ProductCategoryRecord, SilverBatch};

/// ERP product categories (PX_CAT_G1V2)
pub struct ProductCategoryTransformer;

impl EntityTransformer for ProductCategoryTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::ProductCategory
    }

    fn transform(&self, rows: &[BronzeRow], _ctx: &TransformContext) -> SilverBatch {
        let records = rows
            .iter()
            .map(|row| ProductCategoryRecord {
                id: rules::owned(row.get("id")),
                cat: rules::owned(row.get("cat")),
                subcat: rules::owned(row.get("subcat")),
                maintenance: rules::trimmed(row.get("maintenance")),
            })
            .collect();
        SilverBatch::ProductCategories(records)
    }
}
