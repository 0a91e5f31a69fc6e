//! Field-level cleansing rules.
//!
//! Every rule is a pure function of one raw field (or a small group of
//! fields) with an explicit fallback, so a malformed value degrades to
//! `None` or a default instead of failing the row.

use chrono::{Duration, NaiveDate};

use crate::constants::NOT_AVAILABLE;

/// Earliest and latest calendar dates accepted from YYYYMMDD integers
pub const MIN_VALID_DATE: (i32, u32, u32) = (1901, 1, 1);
pub const MAX_VALID_DATE: (i32, u32, u32) = (2049, 12, 31);

pub fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

pub fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Upper-cased, trimmed form used for code lookups
fn code(value: Option<&str>) -> String {
    value.map(|v| v.trim().to_uppercase()).unwrap_or_default()
}

pub fn parse_int(value: Option<&str>) -> Option<i64> {
    let v = value?.trim();
    v.parse::<i64>()
        .ok()
        .or_else(|| v.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

/// ISO dates, optionally followed by a time part (`2003-07-01 00:00:00`)
pub fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    let v = value?.trim();
    let day = v.get(..10).unwrap_or(v);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Converts a YYYYMMDD integer into a date.
///
/// Zero, non-positive values, anything not exactly eight digits, impossible
/// calendar dates and dates outside [1901-01-01, 2049-12-31] yield `None`.
pub fn date_from_yyyymmdd(value: Option<i64>) -> Option<NaiveDate> {
    let v = value.filter(|v| *v > 0)?;
    let digits = v.to_string();
    if digits.len() != 8 {
        return None;
    }
    let date = NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()?;
    let (min_y, min_m, min_d) = MIN_VALID_DATE;
    let (max_y, max_m, max_d) = MAX_VALID_DATE;
    let min = NaiveDate::from_ymd_opt(min_y, min_m, min_d)?;
    let max = NaiveDate::from_ymd_opt(max_y, max_m, max_d)?;
    (min..=max).contains(&date).then_some(date)
}

/// S → Single, M → Married
pub fn marital_status(value: Option<&str>) -> String {
    match code(value).as_str() {
        "S" => "Single",
        "M" => "Married",
        _ => NOT_AVAILABLE,
    }
    .to_string()
}

/// F → Female, M → Male (single-letter CRM codes)
pub fn gender_code(value: Option<&str>) -> String {
    match code(value).as_str() {
        "F" => "Female",
        "M" => "Male",
        _ => NOT_AVAILABLE,
    }
    .to_string()
}

/// ERP gender values: letter codes or spelled out, any case
pub fn gender_name(value: Option<&str>) -> String {
    match code(value).as_str() {
        "F" | "FEMALE" => "Female",
        "M" | "MALE" => "Male",
        _ => NOT_AVAILABLE,
    }
    .to_string()
}

pub fn product_line(value: Option<&str>) -> String {
    match code(value).as_str() {
        "M" => "Mountain",
        "R" => "Road",
        "S" => "Other Sales",
        "T" => "Touring",
        _ => NOT_AVAILABLE,
    }
    .to_string()
}

pub fn country(value: Option<&str>) -> String {
    let trimmed = value.map(str::trim).unwrap_or_default();
    match trimmed.to_uppercase().as_str() {
        "" => NOT_AVAILABLE.to_string(),
        "DE" => "Germany".to_string(),
        "US" | "USA" => "United States".to_string(),
        _ => trimmed.to_string(),
    }
}

/// Splits a composite product key such as `CO-RF-FR-R92B-58` into the
/// category id (`CO_RF`) and the product key proper (`FR-R92B-58`).
pub fn split_product_key(key: &str) -> (String, String) {
    let category: String = key.chars().take(5).collect::<String>().replace('-', "_");
    let product: String = key.chars().skip(6).collect();
    (category, product)
}

pub fn strip_dashes(value: Option<&str>) -> Option<String> {
    value.map(|v| v.replace('-', ""))
}

pub fn strip_nas_prefix(value: Option<&str>) -> Option<String> {
    value.map(|v| v.strip_prefix("NAS").unwrap_or(v).to_string())
}

/// A date strictly after `today` is treated as unknown
pub fn not_in_future(date: Option<NaiveDate>, today: NaiveDate) -> Option<NaiveDate> {
    date.filter(|d| *d <= today)
}

pub fn day_before(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::days(1))
}

/// Reconciles sales and price.
///
/// Sales is rebuilt as quantity × |price| whenever it is missing, not
/// positive, or disagrees with that product; a positive sales figure is kept
/// when the product cannot be computed. A positive price is kept, otherwise
/// it is derived as sales / quantity (integer division, `None` for a zero or
/// missing quantity).
pub fn reconcile_sales(
    sales: Option<i64>,
    quantity: Option<i64>,
    price: Option<i64>,
) -> (Option<i64>, Option<i64>) {
    let expected = match (quantity, price) {
        (Some(q), Some(p)) => p.checked_abs().and_then(|abs| q.checked_mul(abs)),
        _ => None,
    };
    let sales = match (sales, expected) {
        (Some(s), Some(e)) if s > 0 && s == e => Some(s),
        (_, Some(e)) => Some(e),
        (Some(s), None) if s > 0 => Some(s),
        _ => None,
    };
    let price = match price {
        Some(p) if p > 0 => Some(p),
        _ => match (sales, quantity) {
            (Some(s), Some(q)) if q != 0 => Some(s / q),
            _ => None,
        },
    };
    (sales, price)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_yyyymmdd_dates() {
        assert_eq!(date_from_yyyymmdd(Some(20101229)), Some(d(2010, 12, 29)));
        assert_eq!(date_from_yyyymmdd(Some(0)), None);
        assert_eq!(date_from_yyyymmdd(Some(5489)), None);
        assert_eq!(date_from_yyyymmdd(Some(-20101229)), None);
        assert_eq!(date_from_yyyymmdd(Some(20100231)), None);
        assert_eq!(date_from_yyyymmdd(Some(32154)), None);
        assert_eq!(date_from_yyyymmdd(Some(18991231)), None);
        assert_eq!(date_from_yyyymmdd(Some(20500101)), None);
        assert_eq!(date_from_yyyymmdd(Some(19010101)), Some(d(1901, 1, 1)));
        assert_eq!(date_from_yyyymmdd(None), None);
    }

    #[test]
    fn test_code_mappings_are_case_and_space_insensitive() {
        assert_eq!(marital_status(Some(" s ")), "Single");
        assert_eq!(marital_status(Some("M")), "Married");
        assert_eq!(marital_status(None), "n/a");
        assert_eq!(gender_code(Some("f")), "Female");
        assert_eq!(gender_code(Some("X")), "n/a");
        assert_eq!(gender_name(Some(" female")), "Female");
        assert_eq!(gender_name(Some("MALE ")), "Male");
        assert_eq!(gender_name(Some("")), "n/a");
    }

    #[test]
    fn test_product_line() {
        assert_eq!(product_line(Some("M ")), "Mountain");
        assert_eq!(product_line(Some("R")), "Road");
        assert_eq!(product_line(Some("S")), "Other Sales");
        assert_eq!(product_line(Some("T")), "Touring");
        assert_eq!(product_line(None), "n/a");
    }

    #[test]
    fn test_country_normalization() {
        assert_eq!(country(Some("DE")), "Germany");
        assert_eq!(country(Some("USA")), "United States");
        assert_eq!(country(Some(" US")), "United States");
        assert_eq!(country(None), "n/a");
        assert_eq!(country(Some("   ")), "n/a");
        assert_eq!(country(Some(" Australia ")), "Australia");
    }

    #[test]
    fn test_split_product_key() {
        assert_eq!(
            split_product_key("CO-RF-FR-R92B-58"),
            ("CO_RF".to_string(), "FR-R92B-58".to_string())
        );
        assert_eq!(
            split_product_key("AC-HE-HL-U509"),
            ("AC_HE".to_string(), "HL-U509".to_string())
        );
        assert_eq!(split_product_key("AB"), ("AB".to_string(), String::new()));
    }

    #[test]
    fn test_id_cleanup() {
        assert_eq!(strip_dashes(Some("AW-00011000")).as_deref(), Some("AW00011000"));
        assert_eq!(strip_nas_prefix(Some("NASAW00011000")).as_deref(), Some("AW00011000"));
        assert_eq!(strip_nas_prefix(Some("AW00011000")).as_deref(), Some("AW00011000"));
        assert_eq!(strip_nas_prefix(None), None);
    }

    #[test]
    fn test_parsers_degrade_to_none() {
        assert_eq!(parse_int(Some(" 42 ")), Some(42));
        assert_eq!(parse_int(Some("12.0")), Some(12));
        assert_eq!(parse_int(Some("abc")), None);
        assert_eq!(parse_date(Some("2003-07-01")), Some(d(2003, 7, 1)));
        assert_eq!(parse_date(Some("2003-07-01 00:00:00")), Some(d(2003, 7, 1)));
        assert_eq!(parse_date(Some("07/01/2003")), None);
    }

    #[test]
    fn test_reconcile_recomputes_missing_sales() {
        assert_eq!(reconcile_sales(None, Some(3), Some(10)), (Some(30), Some(10)));
    }

    #[test]
    fn test_reconcile_derives_missing_price() {
        assert_eq!(reconcile_sales(Some(100), Some(5), None), (Some(100), Some(20)));
    }

    #[test]
    fn test_reconcile_fixes_inconsistent_and_negative_values() {
        assert_eq!(reconcile_sales(Some(50), Some(2), Some(30)), (Some(60), Some(30)));
        assert_eq!(reconcile_sales(Some(-10), Some(1), Some(10)), (Some(10), Some(10)));
        assert_eq!(reconcile_sales(Some(40), Some(2), Some(-20)), (Some(40), Some(20)));
        assert_eq!(reconcile_sales(Some(40), Some(0), None), (Some(40), None));
        assert_eq!(reconcile_sales(None, None, None), (None, None));
    }

    #[test]
    fn test_not_in_future() {
        let today = d(2026, 10, 15);
        assert_eq!(not_in_future(Some(d(2030, 1, 1)), today), None);
        assert_eq!(not_in_future(Some(today), today), Some(today));
    }
}
