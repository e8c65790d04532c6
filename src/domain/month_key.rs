use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Identifies one calendar month of one budget's history.
///
/// Keys order chronologically and convert to a `YYYYMM` ordinal that is both
/// integer-comparable and string-sortable, so month ranges reduce to plain
/// comparisons instead of date arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Builds a key, rejecting out-of-range month numbers.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// The month containing `date`.
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Sortable `YYYYMM` ordinal, e.g. `202401` for January 2024.
    pub fn ordinal(&self) -> i32 {
        self.year * 100 + self.month as i32
    }

    /// Inverse of [`MonthKey::ordinal`]. Returns `None` for malformed ordinals.
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        Self::new(ordinal.div_euclid(100), ordinal.rem_euclid(100) as u32)
    }

    pub fn next(&self) -> Self {
        self.plus_months(1)
    }

    pub fn prev(&self) -> Self {
        self.plus_months(-1)
    }

    /// Shifts the key by a signed number of calendar months.
    pub fn plus_months(&self, months: i32) -> Self {
        let index = self.year * 12 + self.month as i32 - 1 + months;
        Self {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// Signed month distance from `other` to `self`.
    pub fn months_since(&self, other: MonthKey) -> i32 {
        (self.year * 12 + self.month as i32) - (other.year * 12 + other.month as i32)
    }

    /// First calendar day of the month.
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .unwrap_or_else(|| NaiveDate::from_ymd_opt(self.year, 1, 1).unwrap_or_default())
    }

    /// Store document id for this month, reproducible without an index read.
    pub fn document_id(&self, budget_id: &str) -> String {
        format!("{}_{}_{:02}", budget_id, self.year, self.month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}
