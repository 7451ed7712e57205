//! Date conversions at the fetch/storage boundary.
//!
//! The register page is keyed by `DD-MMM-YY` (`20-FEB-26`), storage and the CLI
//! use `YYYY-MM-DD`. "Today" is always the UTC calendar date.

use chrono::{Days, NaiveDate, Utc};

use crate::error::{RegisterError, Result};

pub fn parse_iso(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| RegisterError::InvalidDate(s.to_string()))
}

pub fn to_iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `2026-02-20` → `20-FEB-26`
pub fn to_register_key(date: NaiveDate) -> String {
    date.format("%d-%b-%y").to_string().to_uppercase()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Every calendar day from `from` to `to`, inclusive. Empty if `to < from`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut d = from;
    while d <= to {
        days.push(d);
        match d.checked_add_days(Days::new(1)) {
            Some(next) => d = next,
            None => break,
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn register_key_format() {
        assert_eq!(to_register_key(ymd(2026, 2, 20)), "20-FEB-26");
        assert_eq!(to_register_key(ymd(2024, 1, 5)), "05-JAN-24");
        assert_eq!(to_register_key(ymd(2030, 12, 31)), "31-DEC-30");
    }

    #[test]
    fn iso_round_trip_and_rejects() {
        let d = parse_iso("2024-02-29").unwrap();
        assert_eq!(to_iso(d), "2024-02-29");
        assert!(matches!(parse_iso("2023-02-29"), Err(RegisterError::InvalidDate(_))));
        assert!(parse_iso("20-FEB-26").is_err());
        assert!(parse_iso("").is_err());
    }

    #[test]
    fn range_crosses_month_and_leap_day() {
        let days = days_between(ymd(2024, 2, 27), ymd(2024, 3, 2));
        let iso: Vec<String> = days.into_iter().map(to_iso).collect();
        assert_eq!(
            iso,
            vec!["2024-02-27", "2024-02-28", "2024-02-29", "2024-03-01", "2024-03-02"]
        );
    }

    #[test]
    fn range_single_and_inverted() {
        assert_eq!(days_between(ymd(2026, 2, 20), ymd(2026, 2, 20)).len(), 1);
        assert!(days_between(ymd(2026, 2, 21), ymd(2026, 2, 20)).is_empty());
    }
}
