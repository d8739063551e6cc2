//! Symbolic reporting periods and concrete date ranges.
//!
//! Tools accept periods like `last30` or `this_month`; the store only
//! understands concrete inclusive date ranges. [`Period::resolve`] turns one
//! into the other relative to a reference date.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Upper bound on `lastN` periods (ten years).
const MAX_DAYS: u32 = 3650;

// ─────────────────────────────────────────────────────────────────────────────
// DateRange
// ─────────────────────────────────────────────────────────────────────────────

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(StoreError::invalid_query(format!(
                "range start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// The range of equal length ending the day before this one starts.
    pub fn previous(&self) -> DateRange {
        let end = self.start - TimeDelta::days(1);
        let start = end - TimeDelta::days(self.days() - 1);
        DateRange { start, end }
    }

    /// Every day in the range, in order.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let count = self.days().max(0) as usize;
        self.start.iter_days().take(count)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Period
// ─────────────────────────────────────────────────────────────────────────────

/// A symbolic reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Today,
    Yesterday,
    /// The trailing N days, including today.
    LastDays(u32),
    ThisMonth,
    LastMonth,
    ThisYear,
    /// No date restriction.
    All,
}

impl Period {
    /// Parse a symbolic period.
    ///
    /// Accepts `today`, `yesterday`, `lastN` / `last_N` / `last_N_days`,
    /// `last_week`, `last_quarter`, `this_month`, `last_month`,
    /// `this_year` / `ytd` and `all`.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_ascii_lowercase().replace(['-', ' '], "_");

        let period = match normalized.as_str() {
            "today" => Period::Today,
            "yesterday" => Period::Yesterday,
            "last_week" | "past_week" => Period::LastDays(7),
            "last_quarter" | "past_quarter" => Period::LastDays(90),
            "last_year" | "past_year" => Period::LastDays(365),
            "this_month" | "month_to_date" | "mtd" => Period::ThisMonth,
            "last_month" | "previous_month" => Period::LastMonth,
            "this_year" | "year_to_date" | "ytd" => Period::ThisYear,
            "all" | "all_time" | "" => Period::All,
            other => Period::LastDays(parse_last_days(other).ok_or_else(|| {
                StoreError::invalid_query(format!("unrecognised period '{}'", input))
            })?),
        };
        Ok(period)
    }

    /// Resolve to a concrete range relative to `today`; `None` for [`Period::All`].
    pub fn resolve(&self, today: NaiveDate) -> Option<DateRange> {
        let range = match self {
            Period::Today => DateRange {
                start: today,
                end: today,
            },
            Period::Yesterday => {
                let day = today.pred_opt()?;
                DateRange {
                    start: day,
                    end: day,
                }
            }
            Period::LastDays(n) => DateRange {
                start: today - TimeDelta::days(i64::from(*n) - 1),
                end: today,
            },
            Period::ThisMonth => DateRange {
                start: NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?,
                end: today,
            },
            Period::LastMonth => {
                let end = NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?.pred_opt()?;
                DateRange {
                    start: NaiveDate::from_ymd_opt(end.year(), end.month(), 1)?,
                    end,
                }
            }
            Period::ThisYear => DateRange {
                start: NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
                end: today,
            },
            Period::All => return None,
        };
        Some(range)
    }

    /// Day count of the resolved range.
    pub fn day_count(&self, today: NaiveDate) -> Option<i64> {
        self.resolve(today).map(|range| range.days())
    }

    /// Canonical symbolic form.
    pub fn label(&self) -> String {
        match self {
            Period::Today => "today".to_string(),
            Period::Yesterday => "yesterday".to_string(),
            Period::LastDays(n) => format!("last{}", n),
            Period::ThisMonth => "this_month".to_string(),
            Period::LastMonth => "last_month".to_string(),
            Period::ThisYear => "this_year".to_string(),
            Period::All => "all".to_string(),
        }
    }
}

fn parse_last_days(input: &str) -> Option<u32> {
    let rest = input
        .strip_prefix("last")
        .or_else(|| input.strip_prefix("past"))?;
    let rest = rest.trim_start_matches('_');
    let rest = rest
        .strip_suffix("_days")
        .or_else(|| rest.strip_suffix("days"))
        .or_else(|| rest.strip_suffix('d'))
        .unwrap_or(rest)
        .trim_end_matches('_');

    let days: u32 = rest.parse().ok()?;
    (1..=MAX_DAYS).contains(&days).then_some(days)
}

impl FromStr for Period {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Period::parse(s)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
