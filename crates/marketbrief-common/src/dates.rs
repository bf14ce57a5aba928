//! Calendar dates and inclusive date ranges for a pipeline run.

use chrono::{Days, NaiveDate};

use crate::error::{ConfigError, Result};

/// Format used on the command line and in the report feed.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format used for artifact directories and archive keys.
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .map_err(|_| ConfigError::InvalidDate(s.to_string()))
}

/// `20240301` style rendering used in on-disk and remote paths.
pub fn compact(date: NaiveDate) -> String {
    date.format(COMPACT_DATE_FORMAT).to_string()
}

/// Inclusive range of calendar dates, validated `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ConfigError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(date: NaiveDate) -> Self {
        Self { start: date, end: date }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the range (always >= 1).
    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Dates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        std::iter::successors(Some(self.start), move |d| {
            d.checked_add_days(Days::new(1)).filter(|next| *next <= end)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_parse_date_accepts_iso() {
        assert_eq!(d("2024-03-01"), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_date_rejects_other_formats() {
        assert_eq!(
            parse_date("2024/03/01"),
            Err(ConfigError::InvalidDate("2024/03/01".to_string()))
        );
        assert!(parse_date("20240301").is_err());
        assert!(parse_date("2024-02-30").is_err());
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let err = DateRange::new(d("2024-03-05"), d("2024-03-01")).unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRange { .. }));
    }

    #[test]
    fn test_range_is_inclusive_and_ordered() {
        let range = DateRange::new(d("2024-02-28"), d("2024-03-01")).unwrap();
        let dates: Vec<_> = range.iter().collect();
        assert_eq!(dates, vec![d("2024-02-28"), d("2024-02-29"), d("2024-03-01")]);
        assert_eq!(range.len(), 3);
        assert_eq!((range.start(), range.end()), (d("2024-02-28"), d("2024-03-01")));
    }

    #[test]
    fn test_single_day_range() {
        let range = DateRange::single(d("2024-03-01"));
        assert_eq!(range.iter().count(), 1);
    }

    #[test]
    fn test_compact_format() {
        assert_eq!(compact(d("2024-03-01")), "20240301");
    }
}
