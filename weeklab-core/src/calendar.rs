//! Calendar math shared by the planner, harness, and store routing.
//!
//! All week arithmetic uses ISO semantics: weeks start on Monday, and any
//! date normalizes to the Monday of its containing week. A week-start date
//! is therefore never a Saturday or Sunday.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Monday of the ISO week containing `date`. A Monday maps to itself.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let days_from_monday = date.weekday().num_days_from_monday() as i64;
    date - Duration::days(days_from_monday)
}

/// Wednesday of the week whose Monday is `monday`.
pub fn wednesday_of_week(monday: NaiveDate) -> NaiveDate {
    monday + Duration::days(2)
}

/// Friday of the week whose Monday is `monday`.
pub fn friday_of_week(monday: NaiveDate) -> NaiveDate {
    monday + Duration::days(4)
}

/// Third Friday of a month (standard monthly option expiration).
pub fn third_friday(year: i32, month: u32) -> NaiveDate {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("valid year/month");
    let days_to_friday = (Weekday::Fri.num_days_from_monday() + 7
        - first.weekday().num_days_from_monday())
        % 7;
    first + Duration::days(days_to_friday as i64 + 14)
}

/// Every (year, month) pair touched by the inclusive date range.
///
/// Returned in ascending order; used to enumerate the partitions a
/// range query must visit.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<(i32, u32)> {
    if start > end {
        return Vec::new();
    }
    let mut months = Vec::new();
    let mut year = start.year();
    let mut month = start.month();
    loop {
        months.push((year, month));
        if year == end.year() && month == end.month() {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }
    months
}

/// First instant of a calendar month.
pub fn month_floor(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .expect("valid year/month")
        .and_hms_opt(0, 0, 0)
        .expect("valid midnight")
}

/// First instant of the following month (exclusive upper bound).
pub fn month_ceil(year: i32, month: u32) -> NaiveDateTime {
    let (ny, nm) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    month_floor(ny, nm)
}
