//! Resolve relative and absolute time expressions to calendar ranges.
//!
//! Ranges are half-open `[start, end)` in UTC. Weeks start on Monday.
//! "Last N units" covers the N complete units before the current one.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use querylens_core::{Granularity, TimeRange};
use regex::{Captures, Regex};
use std::sync::LazyLock;

const UNITS: &str = "hours?|days?|weeks?|months?|quarters?|years?";

static LAST_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:last|previous|past)\s+(\d{{1,3}})\s+({UNITS})\b"))
        .expect("valid last-n regex")
});

static LAST_ONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:last|previous|past)\s+(hour|day|week|month|quarter|year)\b")
        .expect("valid last-unit regex")
});

static CURRENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:this|current)\s+(hour|day|week|month|quarter|year)\b")
        .expect("valid current-unit regex")
});

static DAY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|yesterday)\b").expect("valid day regex"));

static QUARTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bq([1-4])(?:\s+((?:19|20)\d{2}))?\b").expect("valid quarter regex")
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year regex"));

pub fn extract_time_range(question: &str) -> Option<TimeRange> {
    extract_time_range_at(question, Utc::now())
}

/// Resolve the first time expression in `question` relative to `now`.
pub fn extract_time_range_at(question: &str, now: DateTime<Utc>) -> Option<TimeRange> {
    if let Some(caps) = LAST_N.captures(question) {
        let n: i32 = caps[1].parse().ok()?;
        let unit = Granularity::from_unit(&caps[2]);
        let end = floor(now, unit)?;
        let start = shift(end, unit, -n)?;
        return Some(range(&caps, start, end, unit));
    }

    if let Some(caps) = LAST_ONE.captures(question) {
        let unit = Granularity::from_unit(&caps[1]);
        let end = floor(now, unit)?;
        let start = shift(end, unit, -1)?;
        return Some(range(&caps, start, end, unit));
    }

    if let Some(caps) = CURRENT.captures(question) {
        let unit = Granularity::from_unit(&caps[1]);
        let start = floor(now, unit)?;
        let end = shift(start, unit, 1)?;
        return Some(range(&caps, start, end, unit));
    }

    if let Some(caps) = DAY_WORD.captures(question) {
        let today = floor(now, Granularity::Day)?;
        let start = if caps[1].eq_ignore_ascii_case("yesterday") {
            shift(today, Granularity::Day, -1)?
        } else {
            today
        };
        let end = shift(start, Granularity::Day, 1)?;
        return Some(range(&caps, start, end, Granularity::Day));
    }

    if let Some(caps) = QUARTER.captures(question) {
        let quarter: u32 = caps[1].parse().ok()?;
        let year = match caps.get(2) {
            Some(y) => y.as_str().parse().ok()?,
            None => now.year(),
        };
        let start = midnight(NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)?);
        let end = shift(start, Granularity::Quarter, 1)?;
        return Some(range(&caps, start, end, Granularity::Quarter));
    }

    if let Some(caps) = YEAR.captures(question) {
        let year: i32 = caps[1].parse().ok()?;
        let start = midnight(NaiveDate::from_ymd_opt(year, 1, 1)?);
        let end = shift(start, Granularity::Year, 1)?;
        return Some(range(&caps, start, end, Granularity::Year));
    }

    None
}

fn range(caps: &Captures<'_>, start: DateTime<Utc>, end: DateTime<Utc>, unit: Granularity) -> TimeRange {
    TimeRange {
        start,
        end,
        relative_expression: caps[0].to_lowercase(),
        granularity: unit,
    }
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Start of the unit containing `now`.
fn floor(now: DateTime<Utc>, unit: Granularity) -> Option<DateTime<Utc>> {
    let date = now.date_naive();
    let start = match unit {
        Granularity::Hour => midnight(date) + TimeDelta::hours(i64::from(now.hour())),
        Granularity::Day => midnight(date),
        Granularity::Week => {
            midnight(date) - TimeDelta::days(i64::from(date.weekday().num_days_from_monday()))
        }
        Granularity::Month => midnight(NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?),
        Granularity::Quarter => {
            let month = (date.month() - 1) / 3 * 3 + 1;
            midnight(NaiveDate::from_ymd_opt(date.year(), month, 1)?)
        }
        Granularity::Year => midnight(NaiveDate::from_ymd_opt(date.year(), 1, 1)?),
        Granularity::Unknown => return None,
    };
    Some(start)
}

/// Move `start` by `n` whole units.
fn shift(start: DateTime<Utc>, unit: Granularity, n: i32) -> Option<DateTime<Utc>> {
    let months = |count: i32| {
        let step = Months::new(count.unsigned_abs());
        if count >= 0 {
            start.checked_add_months(step)
        } else {
            start.checked_sub_months(step)
        }
    };
    match unit {
        Granularity::Hour => start.checked_add_signed(TimeDelta::hours(i64::from(n))),
        Granularity::Day => start.checked_add_signed(TimeDelta::days(i64::from(n))),
        Granularity::Week => start.checked_add_signed(TimeDelta::weeks(i64::from(n))),
        Granularity::Month => months(n),
        Granularity::Quarter => months(n * 3),
        Granularity::Year => months(n * 12),
        Granularity::Unknown => None,
    }
}
