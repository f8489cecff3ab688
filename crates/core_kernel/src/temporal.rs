//! Temporal helpers
//!
//! Reporting queries in the back office are almost always "everything recorded
//! in a given month". The helpers here produce closed UTC intervals so that the
//! registry's `GreaterOrEqual` / `LessOrEqual` filter pair covers the month
//! exactly, excluding the first instant of the following month.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },

    #[error("Invalid period: start {start} must not be after end {end}")]
    InvalidPeriod { start: String, end: String },
}

/// Returns the first instant of the given month in UTC
pub fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>, TemporalError> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or(TemporalError::InvalidMonth { year, month })
}

/// Returns the closed interval `[start, start + 1 month - 1ns]` for a month
///
/// # Example
///
/// ```rust
/// use core_kernel::month_range;
///
/// let (start, end) = month_range(2024, 2).unwrap();
/// assert_eq!(start.to_rfc3339(), "2024-02-01T00:00:00+00:00");
/// assert_eq!(end.to_rfc3339(), "2024-02-29T23:59:59.999999999+00:00");
/// ```
pub fn month_range(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>), TemporalError> {
    let start = month_start(year, month)?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next = month_start(next_year, next_month)?;
    Ok((start, next - Duration::nanoseconds(1)))
}

/// Returns the month range containing the given instant
pub fn month_range_of(instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    // the month of an existing instant is always valid
    month_range(instant.year(), instant.month())
        .unwrap_or((instant, instant))
}

/// Returns the closed interval covering a whole UTC day
pub fn day_range(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = date.and_time(chrono::NaiveTime::MIN).and_utc();
    (start, start + Duration::days(1) - Duration::nanoseconds(1))
}

/// Validates that `start` is not after `end`
pub fn closed_interval(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), TemporalError> {
    if start > end {
        return Err(TemporalError::InvalidPeriod {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok((start, end))
}
