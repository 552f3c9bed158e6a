//! Time windows and period buckets
//!
//! All windows are half-open: `[start, end)`. A calendar year `Y` is
//! `[Y-01-01, (Y+1)-01-01)`.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::WindowError;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeriodWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, WindowError> {
        if end < start {
            return Err(WindowError::Inverted {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Bucket that `date` is counted in, or `None` outside the window.
    pub fn bucket_for(&self, date: NaiveDate, granularity: PeriodGranularity) -> Option<PeriodWindow> {
        if !self.contains(date) {
            return None;
        }
        match granularity {
            PeriodGranularity::Window => Some(*self),
            PeriodGranularity::Month => {
                let month_start = date.with_day(1)?;
                let next = month_start.checked_add_months(Months::new(1))?;
                Some(PeriodWindow {
                    start: month_start.max(self.start),
                    end: next.min(self.end),
                })
            }
        }
    }

    /// Every bucket of the window at the given granularity, in order.
    pub fn buckets(&self, granularity: PeriodGranularity) -> Vec<PeriodWindow> {
        let mut out = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            match self.bucket_for(cursor, granularity) {
                Some(bucket) => {
                    cursor = bucket.end;
                    out.push(bucket);
                }
                None => break,
            }
        }
        out
    }
}

impl fmt::Display for PeriodWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// How sales are bucketed inside a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodGranularity {
    /// One bucket per calendar month, clipped to the window.
    #[default]
    Month,
    /// A single bucket equal to the window.
    Window,
}

impl PeriodGranularity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "month" | "monthly" => Some(PeriodGranularity::Month),
            "window" => Some(PeriodGranularity::Window),
            _ => None,
        }
    }
}

/// Named window policy, resolved against a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowSpec {
    /// `[today - N months, today)`
    Rolling { months: u32 },
    /// `[Jan 1 of today's year, today)`
    YearToDate,
    /// `[Jan 1 Y, Jan 1 Y+1)`
    Calendar { year: i32 },
}

impl Default for WindowSpec {
    fn default() -> Self {
        WindowSpec::Rolling { months: 3 }
    }
}

impl WindowSpec {
    /// Parse `rolling:N`, `ytd` or `calendar:YYYY`.
    pub fn parse(raw: &str) -> Result<Self, WindowError> {
        let lowered = raw.trim().to_ascii_lowercase();
        let invalid = || WindowError::InvalidSpec(raw.to_string());
        if lowered == "ytd" {
            return Ok(WindowSpec::YearToDate);
        }
        let (kind, arg) = lowered.split_once(':').ok_or_else(invalid)?;
        match kind {
            "rolling" => {
                let months = arg.trim().parse::<u32>().map_err(|_| invalid())?;
                if months == 0 {
                    return Err(invalid());
                }
                Ok(WindowSpec::Rolling { months })
            }
            "calendar" => {
                let year = arg.trim().parse::<i32>().map_err(|_| invalid())?;
                Ok(WindowSpec::Calendar { year })
            }
            _ => Err(invalid()),
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> Result<PeriodWindow, WindowError> {
        match *self {
            WindowSpec::Rolling { months } => {
                let start = today
                    .checked_sub_months(Months::new(months))
                    .ok_or(WindowError::OutOfRange)?;
                PeriodWindow::new(start, today)
            }
            WindowSpec::YearToDate => {
                let start =
                    NaiveDate::from_ymd_opt(today.year(), 1, 1).ok_or(WindowError::OutOfRange)?;
                PeriodWindow::new(start, today)
            }
            WindowSpec::Calendar { year } => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1).ok_or(WindowError::OutOfRange)?;
                let end = year
                    .checked_add(1)
                    .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
                    .ok_or(WindowError::OutOfRange)?;
                PeriodWindow::new(start, end)
            }
        }
    }
}

impl fmt::Display for WindowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowSpec::Rolling { months } => write!(f, "rolling:{months}"),
            WindowSpec::YearToDate => f.write_str("ytd"),
            WindowSpec::Calendar { year } => write!(f, "calendar:{year}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = PeriodWindow::new(date(2025, 1, 1), date(2025, 4, 1)).unwrap();
        assert!(window.contains(date(2025, 1, 1)));
        assert!(window.contains(date(2025, 3, 31)));
        assert!(!window.contains(date(2025, 4, 1)));
        assert!(!window.contains(date(2024, 12, 31)));
    }

    #[test]
    fn test_inverted_window_rejected() {
        assert!(PeriodWindow::new(date(2025, 2, 1), date(2025, 1, 1)).is_err());
    }

    #[test]
    fn test_rolling_window() {
        let window = WindowSpec::Rolling { months: 3 }
            .resolve(date(2025, 5, 31))
            .unwrap();
        assert_eq!(window.start, date(2025, 2, 28));
        assert_eq!(window.end, date(2025, 5, 31));
    }

    #[test]
    fn test_ytd_window() {
        let window = WindowSpec::YearToDate.resolve(date(2025, 7, 15)).unwrap();
        assert_eq!(window.start, date(2025, 1, 1));
        assert_eq!(window.end, date(2025, 7, 15));
    }

    #[test]
    fn test_calendar_window() {
        let window = WindowSpec::Calendar { year: 2024 }
            .resolve(date(2025, 7, 15))
            .unwrap();
        assert_eq!(window.start, date(2024, 1, 1));
        assert_eq!(window.end, date(2025, 1, 1));
        assert!(window.contains(date(2024, 12, 31)));
    }

    #[test]
    fn test_window_spec_parse() {
        assert_eq!(WindowSpec::parse("rolling:6").unwrap(), WindowSpec::Rolling { months: 6 });
        assert_eq!(WindowSpec::parse(" YTD ").unwrap(), WindowSpec::YearToDate);
        assert_eq!(
            WindowSpec::parse("calendar:2024").unwrap(),
            WindowSpec::Calendar { year: 2024 }
        );
        assert!(WindowSpec::parse("rolling:0").is_err());
        assert!(WindowSpec::parse("rolling").is_err());
        assert!(WindowSpec::parse("weekly:2").is_err());
    }

    #[test]
    fn test_month_buckets_clipped() {
        let window = PeriodWindow::new(date(2025, 2, 15), date(2025, 5, 10)).unwrap();
        let buckets = window.buckets(PeriodGranularity::Month);
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0], PeriodWindow::new(date(2025, 2, 15), date(2025, 3, 1)).unwrap());
        assert_eq!(buckets[1], PeriodWindow::new(date(2025, 3, 1), date(2025, 4, 1)).unwrap());
        assert_eq!(buckets[3], PeriodWindow::new(date(2025, 5, 1), date(2025, 5, 10)).unwrap());
    }

    #[test]
    fn test_bucket_for_window_granularity() {
        let window = PeriodWindow::new(date(2025, 1, 1), date(2025, 4, 1)).unwrap();
        assert_eq!(
            window.bucket_for(date(2025, 2, 3), PeriodGranularity::Window),
            Some(window)
        );
        assert_eq!(window.bucket_for(date(2025, 4, 1), PeriodGranularity::Window), None);
        assert_eq!(window.buckets(PeriodGranularity::Window), vec![window]);
    }

    #[test]
    fn test_empty_window_has_no_buckets() {
        let window = PeriodWindow::new(date(2025, 1, 1), date(2025, 1, 1)).unwrap();
        assert!(window.is_empty());
        assert!(window.buckets(PeriodGranularity::Month).is_empty());
    }

    fn day(offset: i64) -> NaiveDate {
        date(2023, 1, 1) + chrono::Duration::days(offset)
    }

    fn granularity() -> impl Strategy<Value = PeriodGranularity> {
        prop_oneof![Just(PeriodGranularity::Month), Just(PeriodGranularity::Window)]
    }

    proptest! {
        #[test]
        fn prop_buckets_tile_window(
            start in 0i64..900,
            len in 0i64..500,
            granularity in granularity(),
        ) {
            let window = PeriodWindow::new(day(start), day(start + len)).unwrap();
            let buckets = window.buckets(granularity);

            if window.is_empty() {
                prop_assert!(buckets.is_empty());
            } else {
                prop_assert_eq!(buckets.first().unwrap().start, window.start);
                prop_assert_eq!(buckets.last().unwrap().end, window.end);
            }
            for bucket in &buckets {
                prop_assert!(bucket.start < bucket.end);
            }
            for pair in buckets.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
            }
        }

        #[test]
        fn prop_bucket_for_agrees_with_buckets(
            start in 0i64..900,
            len in 0i64..500,
            offset in -60i64..1500,
            granularity in granularity(),
        ) {
            let window = PeriodWindow::new(day(start), day(start + len)).unwrap();
            let d = day(offset);
            let expected = window
                .buckets(granularity)
                .into_iter()
                .find(|bucket| bucket.contains(d));

            prop_assert_eq!(window.bucket_for(d, granularity), expected);
            if !window.contains(d) {
                prop_assert_eq!(window.bucket_for(d, granularity), None);
            }
        }
    }
}
