//! Billing months and periods
//!
//! Usage is billed per calendar month, written `YYYYMM` (e.g. `202203`).
//! A billing period is an inclusive range of such months.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Earliest year the ledger accepts
pub const MIN_YEAR: i32 = 2000;

/// Errors that can occur when building months and periods
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Month must be in format YYYYMM, got '{0}'")]
    InvalidFormat(String),

    #[error("Month must be between 1 and 12, got {0}")]
    InvalidMonth(u32),

    #[error("Year must be 2000 or later, got {0}")]
    YearTooEarly(i32),

    #[error("Last month {last} is before first month {first}")]
    Reversed { first: BillingMonth, last: BillingMonth },
}

/// A calendar month in `YYYYMM` form
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BillingMonth {
    year: i32,
    month: u32,
}

impl BillingMonth {
    /// Creates a month from its year and month number
    ///
    /// # Errors
    ///
    /// Returns an error if the month is outside 1..=12 or the year is
    /// before 2000.
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::InvalidMonth(month));
        }
        if year < MIN_YEAR {
            return Err(PeriodError::YearTooEarly(year));
        }
        Ok(Self { year, month })
    }

    /// Creates a month from its `YYYYMM` integer form
    pub fn from_yyyymm(value: u32) -> Result<Self, PeriodError> {
        if !(100_000..=999_999).contains(&value) {
            return Err(PeriodError::InvalidFormat(value.to_string()));
        }
        Self::new((value / 100) as i32, value % 100)
    }

    /// The month a calendar date falls in
    pub fn from_date(date: NaiveDate) -> Result<Self, PeriodError> {
        Self::new(date.year(), date.month())
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Returns the `YYYYMM` integer form
    pub fn as_yyyymm(&self) -> u32 {
        self.year as u32 * 100 + self.month
    }

    /// The following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for BillingMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

impl FromStr for BillingMonth {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(PeriodError::InvalidFormat(s.to_string()));
        }
        let value: u32 = trimmed
            .parse()
            .map_err(|_| PeriodError::InvalidFormat(s.to_string()))?;
        Self::from_yyyymm(value)
    }
}

impl TryFrom<u32> for BillingMonth {
    type Error = PeriodError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_yyyymm(value)
    }
}

impl From<BillingMonth> for u32 {
    fn from(month: BillingMonth) -> u32 {
        month.as_yyyymm()
    }
}

/// An inclusive range of billing months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    first: BillingMonth,
    last: BillingMonth,
}

impl BillingPeriod {
    /// Creates a period, rejecting one whose last month precedes its first
    pub fn new(first: BillingMonth, last: BillingMonth) -> Result<Self, PeriodError> {
        if last < first {
            return Err(PeriodError::Reversed { first, last });
        }
        Ok(Self { first, last })
    }

    /// A period covering exactly one month
    pub fn single(month: BillingMonth) -> Self {
        Self {
            first: month,
            last: month,
        }
    }

    pub fn first(&self) -> BillingMonth {
        self.first
    }

    pub fn last(&self) -> BillingMonth {
        self.last
    }

    /// Every month in the period, in order
    pub fn months(&self) -> Vec<BillingMonth> {
        let mut months = Vec::new();
        let mut current = self.first;
        while current <= self.last {
            months.push(current);
            current = current.next();
        }
        months
    }

    pub fn contains(&self, month: BillingMonth) -> bool {
        self.first <= month && month <= self.last
    }

    /// True when the two periods share at least one month
    pub fn overlaps(&self, other: &BillingPeriod) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn month(v: u32) -> BillingMonth {
        BillingMonth::from_yyyymm(v).unwrap()
    }

    #[test]
    fn test_month_parsing() {
        assert_eq!("202203".parse::<BillingMonth>().unwrap(), month(202203));
        assert!("2022-03".parse::<BillingMonth>().is_err());
        assert!("202213".parse::<BillingMonth>().is_err());
        assert!("199912".parse::<BillingMonth>().is_err());
    }

    #[test]
    fn test_next_rolls_over_year() {
        assert_eq!(month(202212).next(), month(202301));
        assert_eq!(month(202201).next(), month(202202));
    }

    #[test]
    fn test_period_months_across_year() {
        let period = BillingPeriod::new(month(202211), month(202302)).unwrap();
        let months: Vec<u32> = period.months().iter().map(|m| m.as_yyyymm()).collect();
        assert_eq!(months, vec![202211, 202212, 202301, 202302]);
    }

    #[test]
    fn test_reversed_period_rejected() {
        assert!(BillingPeriod::new(month(202203), month(202201)).is_err());
    }

    #[test]
    fn test_overlap() {
        let a = BillingPeriod::new(month(202201), month(202203)).unwrap();
        let b = BillingPeriod::new(month(202202), month(202204)).unwrap();
        let c = BillingPeriod::new(month(202204), month(202206)).unwrap();
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }
}
