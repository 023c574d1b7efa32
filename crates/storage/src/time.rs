//! Text encodings for timestamps and dates.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexical order in SQL equals chronological order.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use tiermind_core::{Error, StorageError};

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(value: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Invalid timestamp '{value}': {e}"
            )))
        })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        Error::Storage(StorageError::QueryFailed(format!(
            "Invalid date '{value}': {e}"
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_lexically() {
        let a = Utc.with_ymd_and_hms(2026, 1, 9, 23, 59, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert!(format_ts(a) < format_ts(b));
        assert_eq!(parse_ts(&format_ts(a)).unwrap(), a);
    }

    #[test]
    fn dates_parse() {
        let d = NaiveDate::from_ymd_opt(2026, 2, 28).unwrap();
        assert_eq!(format_date(d), "2026-02-28");
        assert_eq!(parse_date("2026-02-28").unwrap(), d);
        assert!(parse_date("28/02/2026").is_err());
    }
}
