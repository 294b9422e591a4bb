//! Calendar feature extraction from a date column

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

use crate::error::Result;

/// Days from 0001-01-01 to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

const SUFFIXES: [&str; 7] = [
    "year",
    "month",
    "day",
    "dayofweek",
    "quarter",
    "is_month_start",
    "is_month_end",
];

/// Expand `series` into calendar columns named `<date>_<part>`.
/// Unparseable or null dates produce zeros.
pub(crate) fn calendar_features(date_column: &str, series: &Series) -> Result<Vec<(String, Vec<f64>)>> {
    let dates = parse_dates(series)?;
    let mut columns: Vec<(String, Vec<f64>)> = SUFFIXES
        .iter()
        .map(|s| (format!("{}_{}", date_column, s), Vec::with_capacity(dates.len())))
        .collect();

    for date in &dates {
        let parts = match date {
            Some(d) => calendar_parts(*d),
            None => [0.0; 7],
        };
        for (column, value) in columns.iter_mut().zip(parts) {
            column.1.push(value);
        }
    }
    Ok(columns)
}

fn calendar_parts(d: NaiveDate) -> [f64; 7] {
    let month_end = d.succ_opt().map_or(true, |next| next.month() != d.month());
    [
        d.year() as f64,
        d.month() as f64,
        d.day() as f64,
        d.weekday().num_days_from_monday() as f64,
        ((d.month() - 1) / 3 + 1) as f64,
        f64::from(u8::from(d.day() == 1)),
        f64::from(u8::from(month_end)),
    ]
}

fn parse_dates(series: &Series) -> Result<Vec<Option<NaiveDate>>> {
    match series.dtype() {
        DataType::Date => {
            let days = series.to_physical_repr().cast(&DataType::Int64)?;
            Ok(days.i64()?.into_iter().map(|d| d.and_then(from_epoch_days)).collect())
        }
        DataType::Datetime(unit, _) => {
            let per_day: i64 = match unit {
                TimeUnit::Nanoseconds => 86_400_000_000_000,
                TimeUnit::Microseconds => 86_400_000_000,
                TimeUnit::Milliseconds => 86_400_000,
            };
            let ticks = series.to_physical_repr().cast(&DataType::Int64)?;
            Ok(ticks
                .i64()?
                .into_iter()
                .map(|t| t.and_then(|t| from_epoch_days(t.div_euclid(per_day))))
                .collect())
        }
        _ => {
            let text = series.cast(&DataType::String)?;
            Ok(text.str()?.into_iter().map(|s| s.and_then(parse_date_str)).collect())
        }
    }
}

fn from_epoch_days(days: i64) -> Option<NaiveDate> {
    let ce = i32::try_from(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?).ok()?;
    NaiveDate::from_num_days_from_ce_opt(ce)
}

fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let head = s.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(head, "%Y/%m/%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_dates_expand() {
        let series = Series::new("Date".into(), &["2024-03-31", "2024-04-01 10:00:00", "garbage"]);
        let columns = calendar_features("Date", &series).unwrap();
        assert_eq!(columns.len(), 7);
        assert_eq!(columns[0].0, "Date_year");
        assert_eq!(columns[0].1, vec![2024.0, 2024.0, 0.0]);
        assert_eq!(columns[1].1, vec![3.0, 4.0, 0.0]);
        // 2024-03-31 is a Sunday
        assert_eq!(columns[3].1[0], 6.0);
        assert_eq!(columns[4].1, vec![1.0, 2.0, 0.0]);
        assert_eq!(columns[5].1, vec![0.0, 1.0, 0.0]);
        assert_eq!(columns[6].1, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_epoch_conversion() {
        assert_eq!(from_epoch_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(from_epoch_days(31), NaiveDate::from_ymd_opt(1970, 2, 1));
        assert_eq!(from_epoch_days(i64::MAX), None);
        assert_eq!(from_epoch_days(i64::MIN), None);
    }
}
