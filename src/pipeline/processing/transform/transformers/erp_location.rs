use super::super::rules;
use super::super::{EntityTransformer, TransformContext};
use crate::domain::{BronzeRow, EntityKind, ErpLocationRecord, SilverBatch};

/// ERP customer locations (LOC_A101)
pub struct ErpLocationTransformer;

impl EntityTransformer for ErpLocationTransformer {
    fn entity(&self) -> EntityKind {
        EntityKind::ErpLocation
    }

    fn transform(&self, rows: &[BronzeRow], _ctx: &TransformContext) -> SilverBatch {
        let records = rows
            .iter()
            .map(|row| ErpLocationRecord {
                cid: rules::strip_dashes(row.get("cid")),
                cntry: rules::country(row.get("cntry")),
            })
            .collect();
        SilverBatch::ErpLocations(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_locations_are_normalized() {
        let ctx = TransformContext {
            today: NaiveDate::from_ymd_opt(2026, 10, 15).unwrap(),
        };
        let rows = vec![
            BronzeRow::new().with("cid", Some("AW-00011000")).with("cntry", Some("USA")),
            BronzeRow::new().with("cid", Some("AW-00011001")).with("cntry", None),
            BronzeRow::new().with("cid", Some("AW-00011002")).with("cntry", Some("DE")),
            BronzeRow::new().with("cid", Some("AW-00011003")).with("cntry", Some("France ")),
        ];
        let SilverBatch::ErpLocations(out) = ErpLocationTransformer.transform(&rows, &ctx) else {
            panic!("unexpected batch");
        };
        assert_eq!(out[0].cid.as_deref(), Some("AW00011000"));
        assert_eq!(out[0].cntry, "United States");
        assert_eq!(out[1].cntry, "n/a");
        assert_eq!(out[2].cntry, "Germany");
        assert_eq!(out[3].cntry, "France");
    }
}
