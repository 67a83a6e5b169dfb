//! Timeframe units for bar streams and aggregation targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a bar's period. Ordered from finest to coarsest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    Ticks,
    MicroSeconds,
    Seconds,
    Minutes,
    #[default]
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeFrame {
    /// Strictly between ticks and days: bucketed by an intraday clock point.
    pub fn is_intraday(self) -> bool {
        self > TimeFrame::Ticks && self < TimeFrame::Days
    }

    /// Anything finer than a week, where session ends define edges.
    pub fn is_below_weeks(self) -> bool {
        self < TimeFrame::Weeks
    }
}

impl fmt::Display for TimeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeFrame::Ticks => "ticks",
            TimeFrame::MicroSeconds => "microseconds",
            TimeFrame::Seconds => "seconds",
            TimeFrame::Minutes => "minutes",
            TimeFrame::Days => "days",
            TimeFrame::Weeks => "weeks",
            TimeFrame::Months => "months",
            TimeFrame::Years => "years",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_finest_first() {
        assert!(TimeFrame::Ticks < TimeFrame::Seconds);
        assert!(TimeFrame::Minutes < TimeFrame::Days);
        assert!(TimeFrame::Months < TimeFrame::Years);
    }

    #[test]
    fn intraday_excludes_ticks_and_days() {
        assert!(!TimeFrame::Ticks.is_intraday());
        assert!(TimeFrame::MicroSeconds.is_intraday());
        assert!(TimeFrame::Minutes.is_intraday());
        assert!(!TimeFrame::Days.is_intraday());
        assert!(TimeFrame::Days.is_below_weeks());
        assert!(!TimeFrame::Weeks.is_below_weeks());
    }

    #[test]
    fn deserializes_snake_case() {
        let tf: TimeFrame = serde_json::from_str("\"minutes\"").unwrap();
        assert_eq!(tf, TimeFrame::Minutes);
    }
}
