//! Common types used across hojin-sync

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, Result};

/// Wire format of dates in query parameters (`20250131`)
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Parse a calendar date written as `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, COMPACT_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| CommonError::InvalidDate(s.to_string()))
}

/// Inclusive calendar window `[from, to]` for incremental syncs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateWindow {
    /// Build a window, rejecting `from > to`
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(CommonError::InvertedWindow {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        Ok(Self { from, to })
    }

    /// The `days` days leading up to and including `today`
    pub fn trailing(days: u32, today: NaiveDate) -> Self {
        let from = today - Duration::days(i64::from(days));
        Self { from, to: today }
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// `from` rendered for the `from=` query parameter
    pub fn from_param(&self) -> String {
        self.from.format(COMPACT_DATE_FORMAT).to_string()
    }

    /// `to` rendered for the `to=` query parameter
    pub fn to_param(&self) -> String {
        self.to.format(COMPACT_DATE_FORMAT).to_string()
    }
}

impl std::fmt::Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.from_param(), self.to_param())
    }
}

impl std::str::FromStr for DateWindow {
    type Err = CommonError;

    /// Parses `FROM..TO`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (from, to) = s
            .split_once("..")
            .ok_or_else(|| CommonError::InvalidDate(s.to_string()))?;
        Self::new(parse_date(from)?, parse_date(to)?)
    }
}
