//! Time ranges referenced by a question.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    Unknown,
}

impl Granularity {
    /// Parse a unit word such as "days" or "Month".
    pub fn from_unit(unit: &str) -> Self {
        let unit = unit.trim().to_ascii_lowercase();
        let unit = unit.trim_end_matches('s');
        match unit {
            "hour" | "hr" => Self::Hour,
            "day" => Self::Day,
            "week" | "wk" => Self::Week,
            "month" | "mo" => Self::Month,
            "quarter" | "qtr" => Self::Quarter,
            "year" | "yr" => Self::Year,
            _ => Self::Unknown,
        }
    }
}

/// A resolved period. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// The question text the range was resolved from, e.g. "last month".
    pub relative_expression: String,

    pub granularity: Granularity,
}

impl TimeRange {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}
