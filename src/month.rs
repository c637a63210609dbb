//! Reporting period tag (`YYYYMM`).

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid month tag {0:?}: expected YYYYMM")]
pub struct MonthTagError(String);

/// A `YYYYMM` tag naming the month a run reports on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthTag(String);

impl MonthTag {
    /// The tag for the current local month.
    pub fn current() -> Self {
        MonthTag(Local::now().format("%Y%m").to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MonthTag {
    type Err = MonthTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 6 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MonthTagError(s.to_string()));
        }
        NaiveDate::parse_from_str(&format!("{s}01"), "%Y%m%d")
            .map_err(|_| MonthTagError(s.to_string()))?;
        Ok(MonthTag(s.to_string()))
    }
}

impl fmt::Display for MonthTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
