//! Trading calendars: session hours, holidays and period-end detection.

use crate::domain::TimeFrame;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Scan horizon when looking for the next trading day.
const MAX_SCAN_DAYS: usize = 3660;

/// Latest representable session end of a calendar day.
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_990).unwrap_or(NaiveTime::MIN)
}

/// Session schedule collaborator.
pub trait TradingCalendar: Send + Sync + fmt::Debug {
    /// Open and close of the session containing `dt`. If `dt` is already past
    /// that day's close, the following day's session is returned.
    fn session_bounds(&self, dt: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime);

    /// First trading day strictly after `date`.
    fn next_trading_day(&self, date: NaiveDate) -> NaiveDate;

    /// Whether `date` is the last trading day of its week, month or year.
    /// Finer units are always false.
    fn is_last_trading_day_of(&self, unit: TimeFrame, date: NaiveDate) -> bool {
        let next = self.next_trading_day(date);
        match unit {
            TimeFrame::Weeks => date.iso_week() != next.iso_week(),
            TimeFrame::Months => date.month() != next.month() || date.year() != next.year(),
            TimeFrame::Years => date.year() != next.year(),
            _ => false,
        }
    }
}

/// Regular weekday sessions with holidays and early-close days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeekdayCalendar {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub holidays: BTreeSet<NaiveDate>,
    /// Days with non-regular hours: date → (open, close).
    pub early_days: BTreeMap<NaiveDate, (NaiveTime, NaiveTime)>,
    pub off_days: Vec<Weekday>,
}

impl Default for WeekdayCalendar {
    fn default() -> Self {
        Self {
            open: NaiveTime::MIN,
            close: end_of_day(),
            holidays: BTreeSet::new(),
            early_days: BTreeMap::new(),
            off_days: vec![Weekday::Sat, Weekday::Sun],
        }
    }
}

impl WeekdayCalendar {
    pub fn with_hours(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            open,
            close,
            ..Self::default()
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn with_early_day(mut self, date: NaiveDate, open: NaiveTime, close: NaiveTime) -> Self {
        self.early_days.insert(date, (open, close));
        self
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !self.off_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    fn hours(&self, date: NaiveDate) -> (NaiveTime, NaiveTime) {
        self.early_days
            .get(&date)
            .copied()
            .unwrap_or((self.open, self.close))
    }
}

impl TradingCalendar for WeekdayCalendar {
    fn session_bounds(&self, dt: NaiveDateTime) -> (NaiveDateTime, NaiveDateTime) {
        let mut date = dt.date();
        for _ in 0..MAX_SCAN_DAYS {
            let (open, close) = self.hours(date);
            let closing = date.and_time(close);
            if dt <= closing {
                return (date.and_time(open), closing);
            }
            date += Duration::days(1);
        }
        (dt, dt)
    }

    fn next_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut day = date;
        for _ in 0..MAX_SCAN_DAYS {
            day += Duration::days(1);
            if self.is_trading_day(day) {
                return day;
            }
        }
        date + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn nyse_like() -> WeekdayCalendar {
        WeekdayCalendar::with_hours(
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    #[test]
    fn session_rolls_forward_after_close() {
        let cal = nyse_like();
        let (open, close) = cal.session_bounds(d(2024, 1, 2).and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(open, d(2024, 1, 2).and_hms_opt(9, 30, 0).unwrap());
        assert_eq!(close, d(2024, 1, 2).and_hms_opt(16, 0, 0).unwrap());

        let (_, close) = cal.session_bounds(d(2024, 1, 2).and_hms_opt(17, 0, 0).unwrap());
        assert_eq!(close, d(2024, 1, 3).and_hms_opt(16, 0, 0).unwrap());
    }

    #[test]
    fn early_close_is_respected() {
        let cal = nyse_like().with_early_day(
            d(2024, 7, 3),
            NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        );
        let (_, close) = cal.session_bounds(d(2024, 7, 3).and_hms_opt(10, 0, 0).unwrap());
        assert_eq!(close, d(2024, 7, 3).and_hms_opt(13, 0, 0).unwrap());
    }

    #[test]
    fn next_trading_day_skips_weekend_and_holidays() {
        let cal = WeekdayCalendar::default().with_holidays([d(2024, 1, 1)]);
        assert_eq!(cal.next_trading_day(d(2023, 12, 29)), d(2024, 1, 2));
        assert_eq!(cal.next_trading_day(d(2024, 1, 2)), d(2024, 1, 3));
    }

    #[test]
    fn last_trading_day_detection() {
        let cal = WeekdayCalendar::default().with_holidays([d(2024, 3, 29)]);
        // Thursday before a Good Friday holiday closes both week and month.
        assert!(cal.is_last_trading_day_of(TimeFrame::Weeks, d(2024, 3, 28)));
        assert!(cal.is_last_trading_day_of(TimeFrame::Months, d(2024, 3, 28)));
        assert!(!cal.is_last_trading_day_of(TimeFrame::Weeks, d(2024, 3, 27)));
        assert!(cal.is_last_trading_day_of(TimeFrame::Years, d(2024, 12, 31)));
        assert!(!cal.is_last_trading_day_of(TimeFrame::Days, d(2024, 12, 31)));
    }
}
