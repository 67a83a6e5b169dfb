//! The fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// OHLCV bar with open interest, stamped with the instant it closes.
///
/// Once handed to a consumer a bar is never mutated; the aggregators keep
/// their own accumulating copy and emit fresh values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub open_interest: f64,
}

impl Bar {
    pub fn new(
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            open_interest: 0.0,
        }
    }

    pub fn with_open_interest(mut self, open_interest: f64) -> Self {
        self.open_interest = open_interest;
        self
    }

    /// Returns true if any OHLC field is NaN (void bar).
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high bounds everything, low is bounded by everything.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.volume >= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bar() -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        Bar::new(ts, 100.0, 105.0, 98.0, 103.0, 50_000.0)
    }

    #[test]
    fn bar_is_sane() {
        assert!(sample_bar().is_sane());
    }

    #[test]
    fn bar_high_below_close_is_insane() {
        let mut bar = sample_bar();
        bar.high = 101.0;
        assert!(!bar.is_sane());
    }

    #[test]
    fn nan_bar_is_void() {
        let mut bar = sample_bar();
        bar.close = f64::NAN;
        assert!(bar.is_void());
        assert!(!bar.is_sane());
    }

    #[test]
    fn open_interest_defaults_to_zero_when_missing() {
        let json = r#"{"timestamp":"2024-01-02T16:00:00","open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10.0}"#;
        let bar: Bar = serde_json::from_str(json).unwrap();
        assert_eq!(bar.open_interest, 0.0);
        let bar = bar.with_open_interest(7.0);
        assert_eq!(bar.open_interest, 7.0);
    }
}
