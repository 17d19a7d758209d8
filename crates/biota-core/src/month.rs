//! Calendar helpers for the monthly panel key.
//!
//! Every timestamp in a panel is normalized to the last day of its month, so
//! `(Grid_ID, month_end)` is the unique row key.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

use crate::error::{BiotaError, BiotaResult};

/// Last calendar day of the month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

/// Month end `months` calendar months after (or before, when negative) the
/// month containing `date`.
pub fn shift_months(date: NaiveDate, months: i32) -> NaiveDate {
    let index = date.year() * 12 + date.month0() as i32 + months;
    let year = index.div_euclid(12);
    let month0 = index.rem_euclid(12) as u32;
    NaiveDate::from_ymd_opt(year, month0 + 1, 1)
        .map(end_of_month)
        .unwrap_or(date)
}

/// Number of whole calendar months from `earlier` to `later`.
pub fn months_between(earlier: NaiveDate, later: NaiveDate) -> i32 {
    (later.year() - earlier.year()) * 12 + later.month() as i32 - earlier.month() as i32
}

/// Parse a month key and normalize it to the month end.
///
/// Accepts `YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and RFC 3339 strings.
pub fn parse_month(value: &str) -> BiotaResult<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(end_of_month(date));
    }
    if let Ok(date) = NaiveDate::parse_from_str(&format!("{trimmed}-01"), "%Y-%m-%d") {
        return Ok(end_of_month(date));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(end_of_month(ts.date()));
        }
    }
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(end_of_month(ts.date_naive()));
    }
    Err(BiotaError::Parse(format!(
        "unrecognised month '{value}'; use YYYY-MM or YYYY-MM-DD"
    )))
}

/// Month end for a timestamp expressed as epoch milliseconds.
pub fn from_epoch_millis(millis: i64) -> BiotaResult<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|ts| end_of_month(ts.date_naive()))
        .ok_or_else(|| BiotaError::Parse(format!("timestamp {millis} ms is out of range")))
}

/// Parse, normalize, sort and deduplicate a caller-supplied month list.
pub fn normalize_months<S: AsRef<str>>(values: &[S]) -> BiotaResult<Vec<NaiveDate>> {
    let mut months = values
        .iter()
        .map(|value| parse_month(value.as_ref()))
        .collect::<BiotaResult<Vec<_>>>()?;
    months.sort();
    months.dedup();
    Ok(months)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_of_month_handles_leap_years_and_december() {
        assert_eq!(end_of_month(ymd(2024, 2, 3)), ymd(2024, 2, 29));
        assert_eq!(end_of_month(ymd(2023, 2, 28)), ymd(2023, 2, 28));
        assert_eq!(end_of_month(ymd(2023, 12, 1)), ymd(2023, 12, 31));
    }

    #[test]
    fn shift_months_crosses_year_boundaries() {
        assert_eq!(shift_months(ymd(2024, 1, 31), -1), ymd(2023, 12, 31));
        assert_eq!(shift_months(ymd(2024, 1, 31), -12), ymd(2023, 1, 31));
        assert_eq!(shift_months(ymd(2023, 11, 30), 3), ymd(2024, 2, 29));
        assert_eq!(months_between(ymd(2023, 11, 30), ymd(2024, 2, 29)), 3);
    }

    #[test]
    fn parse_month_accepts_common_shapes() {
        assert_eq!(parse_month("2025-03").unwrap(), ymd(2025, 3, 31));
        assert_eq!(parse_month("2025-03-01").unwrap(), ymd(2025, 3, 31));
        assert_eq!(parse_month("2025-04-15 00:00:00").unwrap(), ymd(2025, 4, 30));
        assert_eq!(parse_month("2025-04-15T10:00:00Z").unwrap(), ymd(2025, 4, 30));
        assert!(parse_month("March").is_err());
    }

    #[test]
    fn epoch_millis_are_normalized() {
        // 2021-03-15T00:00:00Z
        assert_eq!(from_epoch_millis(1_615_766_400_000).unwrap(), ymd(2021, 3, 31));
    }

    #[test]
    fn normalize_months_sorts_and_dedups() {
        let months = normalize_months(&["2025-03", "2025-01-10", "2025-03-31"]).unwrap();
        assert_eq!(months, vec![ymd(2025, 1, 31), ymd(2025, 3, 31)]);
    }
}
