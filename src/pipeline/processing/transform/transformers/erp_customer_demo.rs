use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, EntityKind, ErpCustomerDemoRecord, SilverBatch};

/// ERP customer demographics (CUST_AZ12)
pub struct ErpCustomerDemoTransformer;

impl EntityTransformer for ErpCustomerDemoTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::ErpCustomerDemo
    }

    fn transform(&self, rows: &[BronzeRow], ctx: &TransformContext) -> SilverBatch {
        let records = rows
            .iter()
            .map(|row| ErpCustomerDemoRecord {
                cid: rules::strip_nas_prefix(row.get("cid")),
                bdate: rules::not_in_future(rules::parse_date(row.get("bdate")), ctx.today),
                gen: rules::gender_name(row.get("gen")),
            })
            .collect();
        SilverBatch::ErpCustomerDemos(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_demographics_are_cleansed() {
        let ctx = TransformContext {
            today: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        };
        let rows = vec![
            BronzeRow::new()
                .with("cid", Some("NASAW00011000"))
                .with("bdate", Some("1971-10-06"))
                .with("gen", Some(" male")),
            BronzeRow::new()
                .with("cid", Some("AW00011001"))
                .with("bdate", Some("2099-01-01"))
                .with("gen", None),
        ];
        let SilverBatch::ErpCustomerDemos(out) = ErpCustomerDemoTransformer.transform(&rows, &ctx) else {
            panic!("unexpected batch");
        };
        assert_eq!(out[0].cid.as_deref(), Some("AW00011000"));
        assert_eq!(out[0].bdate, NaiveDate::from_ymd_opt(1971, 10, 6));
        assert_eq!(out[0].gen, "Male");
        assert_eq!(out[1].cid.as_deref(), Some("AW00011001"));
        assert_eq!(out[1].bdate, None);
        assert_eq!(out[1].gen, "n/a");
    }
}
