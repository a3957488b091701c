use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Window start {start} is after end {end}")]
    Inverted { start: NaiveDate, end: NaiveDate },
    #[error("Lookback of {0} days is out of range")]
    LookbackOutOfRange(u32),
}

/// The inclusive date window a sync run compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl SyncWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if start > end {
            return Err(PeriodError::Inverted { start, end });
        }
        Ok(SyncWindow { start, end })
    }

    /// Window ending on `end` and starting `days` days earlier.
    pub fn lookback(end: NaiveDate, days: u32) -> Result<Self, PeriodError> {
        let start = end
            .checked_sub_days(Days::new(u64::from(days)))
            .ok_or(PeriodError::LookbackOutOfRange(days))?;
        Ok(SyncWindow { start, end })
    }

    /// Start and end rendered with a chrono format string, used as report labels.
    pub fn labels(self, format: &str) -> (String, String) {
        (
            self.start.format(format).to_string(),
            self.end.format(format).to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn lookback_one_day() {
        let w = SyncWindow::lookback(date(2025, 5, 1), 1).unwrap();
        assert_eq!(w.start, date(2025, 4, 30));
        assert_eq!(w.end, date(2025, 5, 1));
    }

    #[test]
    fn lookback_zero_is_single_day() {
        let w = SyncWindow::lookback(date(2025, 5, 1), 0).unwrap();
        assert_eq!(w.start, w.end);
    }

    #[test]
    fn new_rejects_inverted_window() {
        assert!(matches!(
            SyncWindow::new(date(2025, 5, 2), date(2025, 5, 1)),
            Err(PeriodError::Inverted { .. })
        ));
    }

    #[test]
    fn labels_use_format() {
        let w = SyncWindow::new(date(2025, 4, 30), date(2025, 5, 1)).unwrap();
        assert_eq!(
            w.labels("%d.%m.%Y"),
            ("30.04.2025".to_string(), "01.05.2025".to_string())
        );
        assert_eq!(w.to_string(), "2025-04-30 to 2025-05-01");
    }
}
