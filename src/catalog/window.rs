//! Monthly date buckets and the calendar windows derived from them

use std::fmt;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::error::CrawlError;

/// Latest year a bucket may name; the following January must still be a
/// four-digit year
pub const MAX_BUCKET_YEAR: i32 = 9998;

/// A (month, year) unit as reported by a folder listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "BucketFields")]
pub struct DateBucket {
    month: u32,
    year: i32,
}

impl DateBucket {
    /// Create a bucket, rejecting months outside `1..=12`
    pub fn new(month: u32, year: i32) -> Result<Self, CrawlError> {
        if !(1..=12).contains(&month) {
            return Err(CrawlError::InvalidBucket(format!(
                "month {} is outside 1..=12 (year {})",
                month, year
            )));
        }
        if !(1..=MAX_BUCKET_YEAR).contains(&year) {
            return Err(CrawlError::InvalidBucket(format!(
                "year {} is outside 1..={}",
                year, MAX_BUCKET_YEAR
            )));
        }
        Ok(Self { month, year })
    }

    /// Decode a bucket from a listing entry such as `{"mes": "12", "anyo": "2020"}`
    ///
    /// Both fields may be JSON numbers or numeric strings.
    pub fn from_listing(entry: &Value) -> Result<Self, CrawlError> {
        let month = listing_number(entry, "mes")?;
        let year = listing_number(entry, "anyo")?;
        let month = u32::try_from(month)
            .map_err(|_| CrawlError::InvalidBucket(format!("month {} is outside 1..=12", month)))?;
        let year = i32::try_from(year)
            .map_err(|_| CrawlError::InvalidBucket(format!("year {} is out of range", year)))?;
        Self::new(month, year)
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// The calendar month this bucket covers
    pub fn window(&self) -> DateWindow {
        let (next_month, next_year) = if self.month == 12 {
            (1, self.year + 1)
        } else {
            (self.month + 1, self.year)
        };

        let start_date =
            NaiveDate::from_ymd_opt(self.year, self.month, 1).expect("bucket validated on construction");
        let end_date = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|first| first.checked_sub_days(Days::new(1)))
            .expect("bucket validated on construction");

        DateWindow {
            start_date,
            end_date,
        }
    }
}

/// Unchecked serde form of a bucket
#[derive(Deserialize)]
struct BucketFields {
    month: u32,
    year: i32,
}

impl TryFrom<BucketFields> for DateBucket {
    type Error = CrawlError;

    fn try_from(fields: BucketFields) -> Result<Self, Self::Error> {
        Self::new(fields.month, fields.year)
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}

fn listing_number(entry: &Value, field: &str) -> Result<i64, CrawlError> {
    let value = entry
        .get(field)
        .ok_or_else(|| CrawlError::InvalidBucket(format!("missing '{}' in {}", field, entry)))?;

    let number = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    number.ok_or_else(|| CrawlError::InvalidBucket(format!("'{}' is not a number: {}", field, value)))
}

/// An inclusive calendar-month date range used to scope a content request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DateWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl DateWindow {
    /// Bounds as sent to the catalog, unpadded `d/m/yyyy`
    pub fn as_params(&self) -> (String, String) {
        (wire_date(self.start_date), wire_date(self.end_date))
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (start, end) = self.as_params();
        write!(f, "{}..{}", start, end)
    }
}

fn wire_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.day(), date.month(), date.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_window_ends_day_before_next_month() {
        for year in [1999, 2000, 2020, 2021, 2100] {
            for month in 1..=12 {
                let window = DateBucket::new(month, year).unwrap().window();
                let next_first = if month == 12 {
                    date(year + 1, 1, 1)
                } else {
                    date(year, month + 1, 1)
                };

                assert_eq!(window.start_date, date(year, month, 1));
                assert_eq!(window.end_date.succ_opt().unwrap(), next_first);
                assert_eq!(window.end_date.month(), month);
                assert_eq!(window.end_date.year(), year);
            }
        }
    }

    #[test]
    fn test_december_crosses_year() {
        let window = DateBucket::new(12, 2020).unwrap().window();
        assert_eq!(window.as_params(), ("1/12/2020".to_string(), "31/12/2020".to_string()));
    }

    #[test]
    fn test_leap_years() {
        assert_eq!(DateBucket::new(2, 2020).unwrap().window().end_date, date(2020, 2, 29));
        assert_eq!(DateBucket::new(2, 2021).unwrap().window().end_date, date(2021, 2, 28));
        assert_eq!(DateBucket::new(2, 1900).unwrap().window().end_date, date(1900, 2, 28));
        assert_eq!(DateBucket::new(2, 2000).unwrap().window().end_date, date(2000, 2, 29));
    }

    #[test]
    fn test_month_out_of_range_fails() {
        assert!(matches!(DateBucket::new(0, 2020), Err(CrawlError::InvalidBucket(_))));
        assert!(matches!(DateBucket::new(13, 2020), Err(CrawlError::InvalidBucket(_))));
        assert!(matches!(DateBucket::new(1, 0), Err(CrawlError::InvalidBucket(_))));
    }

    #[test]
    fn test_from_listing() {
        let bucket = DateBucket::from_listing(&json!({"mes": "12", "anyo": "2020"})).unwrap();
        assert_eq!((bucket.month(), bucket.year()), (12, 2020));

        let bucket = DateBucket::from_listing(&json!({"mes": 3, "anyo": 1998})).unwrap();
        assert_eq!((bucket.month(), bucket.year()), (3, 1998));

        assert!(DateBucket::from_listing(&json!({"mes": "13", "anyo": "2020"})).is_err());
        assert!(DateBucket::from_listing(&json!({"mes": "-1", "anyo": "2020"})).is_err());
        assert!(DateBucket::from_listing(&json!({"mes": "x", "anyo": "2020"})).is_err());
        assert!(DateBucket::from_listing(&json!({"anyo": "2020"})).is_err());
    }

    #[test]
    fn test_deserialize_checks_month() {
        let err = serde_json::from_str::<DateBucket>(r#"{"month":13,"year":2020}"#).unwrap_err();
        assert!(err.to_string().contains("outside 1..=12"));
        assert!(serde_json::from_str::<DateBucket>(r#"{"month":3,"year":0}"#).is_err());

        let bucket: DateBucket = serde_json::from_str(r#"{"month":2,"year":2020}"#).unwrap();
        assert_eq!(bucket, DateBucket::new(2, 2020).unwrap());
        assert_eq!(bucket.window().end_date, date(2020, 2, 29));
        assert_eq!(serde_json::to_value(bucket).unwrap(), json!({"month": 2, "year": 2020}));
    }

    #[test]
    fn test_display() {
        let bucket = DateBucket::new(3, 2021).unwrap();
        assert_eq!(bucket.to_string(), "03/2021");
        assert_eq!(bucket.window().to_string(), "1/3/2021..31/3/2021");
    }
}
