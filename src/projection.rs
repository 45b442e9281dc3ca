use chrono::{DateTime, Datelike, NaiveDate, Utc};
use thiserror::Error;

use crate::domain::{MonthlyBuckets, PredictedPayment};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("{instrument}: month {month} is not a calendar month")]
    InvalidMonth { instrument: String, month: u32 },
    #[error("{instrument}: cannot build date {year}-{month:02}-{day:02}")]
    InvalidDate {
        instrument: String,
        year: i32,
        month: u32,
        day: u32,
    },
}

/// A target date that does not exist in the calendar chrono can represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbuildableDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

/// Last valid day of `month` in `year`, or `None` for an invalid month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    if !(1..=12).contains(&month) {
        return None;
    }
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|d| d.day())
}

/// `day` clamped to the length of `month` in `year`.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
}

fn has_passed(date: NaiveDate, now: DateTime<Utc>) -> bool {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc() < now)
        .unwrap_or(false)
}

/// Next occurrence of a recurring payment in `month` on `day`, relative to `now`.
///
/// Tries the current year first; if that date has already passed, re-clamps
/// against the following year and uses it.
pub fn next_occurrence(
    month: u32,
    day: u32,
    now: DateTime<Utc>,
) -> Result<NaiveDate, UnbuildableDate> {
    let attempt = |year: i32| {
        clamped_date(year, month, day).ok_or(UnbuildableDate { year, month, day })
    };
    let this_year = attempt(now.year())?;
    if !has_passed(this_year, now) {
        return Ok(this_year);
    }
    attempt(now.year() + 1)
}

/// One prediction per historical record, sorted by predicted date.
///
/// Buckets are walked in month order and records in observation order; the
/// sort is stable so equal dates keep that order.
pub fn project(
    buckets: &MonthlyBuckets,
    now: DateTime<Utc>,
) -> Result<Vec<PredictedPayment>, ProjectionError> {
    let mut predictions = Vec::with_capacity(buckets.values().map(Vec::len).sum());

    for (&month, records) in buckets {
        if !(1..=12).contains(&month) {
            let instrument = records
                .first()
                .map(|r| r.instrument_id.clone())
                .unwrap_or_default();
            return Err(ProjectionError::InvalidMonth { instrument, month });
        }
        for record in records {
            let predicted_date = next_occurrence(month, record.day_of_month, now).map_err(
                |UnbuildableDate { year, month, day }| ProjectionError::InvalidDate {
                    instrument: record.instrument_id.clone(),
                    year,
                    month,
                    day,
                },
            )?;
            predictions.push(PredictedPayment {
                record: record.clone(),
                predicted_date,
            });
        }
    }

    predictions.sort_by_key(|p| p.predicted_date);
    Ok(predictions)
}
