//! Boundary state machine shared by the resampler and the replayer.

use super::ResampleConfig;
use crate::calendar::{end_of_day, TradingCalendar};
use crate::domain::{Bar, TimeFrame};
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime, Timelike};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct Aggregator {
    pub config: ResampleConfig,
    calendar: Option<Arc<dyn TradingCalendar>>,
    subdays: bool,
    subweeks: bool,
    /// Same unit as the source; bars are only counted.
    pub componly: bool,
    pub doadjusttime: bool,
    /// The accumulating target bar. `None` while no bar is open.
    pub bar: Option<Bar>,
    compcount: u32,
    next_eos: Option<NaiveDateTime>,
    pub last_eos: Option<NaiveDateTime>,
    pub last_delivered: Option<NaiveDateTime>,
}

impl Aggregator {
    pub fn new(mut config: ResampleConfig, source: TimeFrame, source_compression: u32) -> Self {
        config.compression = config.compression.max(1);
        let tf = config.timeframe;
        let subdays = tf.is_intraday();
        let subweeks = tf.is_below_weeks();
        let componly = !subdays && source == tf && config.compression % source_compression.max(1) == 0;
        let doadjusttime = config.bar2edge && config.adjbartime && subweeks;
        Self {
            config,
            calendar: None,
            subdays,
            subweeks,
            componly,
            doadjusttime,
            bar: None,
            compcount: 0,
            next_eos: None,
            last_eos: None,
            last_delivered: None,
        }
    }

    pub fn set_calendar(&mut self, calendar: Arc<dyn TradingCalendar>) {
        self.calendar = Some(calendar);
    }

    pub fn is_open(&self) -> bool {
        self.bar.is_some()
    }

    fn compression(&self) -> i64 {
        i64::from(self.config.compression)
    }

    /// Folds a source bar into the open bar, opening one if needed.
    pub fn update(&mut self, src: &Bar) {
        match self.bar.as_mut() {
            None => self.bar = Some(*src),
            Some(bar) => {
                bar.high = bar.high.max(src.high);
                bar.low = bar.low.min(src.low);
                bar.close = src.close;
                bar.volume += src.volume;
                bar.open_interest = src.open_interest;
                bar.timestamp = src.timestamp;
            }
        }
    }

    /// Closes the open bar and returns it.
    pub fn take(&mut self) -> Option<Bar> {
        let bar = self.bar.take()?;
        self.last_delivered = Some(bar.timestamp);
        Some(bar)
    }

    /// Intraday source bar at or before the last delivered bar.
    pub fn is_late(&self, dt: NaiveDateTime) -> bool {
        self.subdays && self.last_delivered.is_some_and(|last| dt <= last)
    }

    pub fn restamp_late(&mut self) {
        if let (Some(bar), Some(last)) = (self.bar.as_mut(), self.last_delivered) {
            bar.timestamp = last + Duration::microseconds(1);
        }
    }

    /// First session end at or after `dt`.
    pub fn session_end_after(&self, dt: NaiveDateTime) -> NaiveDateTime {
        if let Some(calendar) = &self.calendar {
            return calendar.session_bounds(dt).1;
        }
        let end = self.config.session_end.unwrap_or_else(end_of_day);
        let mut eos = dt.date().and_time(end);
        while dt > eos {
            eos += Duration::days(1);
        }
        eos
    }

    /// Pins the pending session end to the open bar before a final delivery.
    pub fn prepare_flush(&mut self) {
        if self.next_eos.is_none() {
            if let Some(bar) = self.bar {
                self.next_eos = Some(self.session_end_after(bar.timestamp));
            }
        }
    }

    /// Whether `dt` reaches (or, unless `exact`, has passed while a bar from
    /// before is open) the pending session end. A hit consumes it.
    fn eos_check(&mut self, dt: NaiveDateTime, exact: bool) -> bool {
        let next = match self.next_eos {
            Some(eos) => eos,
            None => {
                let eos = self.session_end_after(dt);
                self.next_eos = Some(eos);
                eos
            }
        };
        let hit = if exact || dt <= next {
            dt == next
        } else {
            self.bar.is_some_and(|bar| bar.timestamp <= next)
        };
        if hit {
            self.last_eos = Some(next);
            self.next_eos = None;
        }
        hit
    }

    /// Intraday clock point in target units (shifted by `boundoff`) and the
    /// finer remainder.
    fn time_point(&self, t: NaiveTime) -> (i64, i64) {
        let tf = self.config.timeframe;
        let micros = i64::from(t.nanosecond() / 1_000);
        let mut point = i64::from(t.hour() * 60 + t.minute());
        let rest;
        if tf < TimeFrame::Minutes {
            point = point * 60 + i64::from(t.second());
            if tf < TimeFrame::Seconds {
                point = point * 1_000_000 + micros;
                rest = 0;
            } else {
                rest = micros;
            }
        } else {
            rest = i64::from(t.second()) + micros;
        }
        (point + self.config.boundoff, rest)
    }

    fn bar_over(&mut self, dt: NaiveDateTime) -> bool {
        let Some(bar) = self.bar else {
            return false;
        };
        match self.config.timeframe {
            TimeFrame::Ticks => true,
            TimeFrame::Days => self.eos_check(dt, false),
            tf if tf < TimeFrame::Days => self.bar_over_subdays(dt),
            // Calendar edges are caught by `on_edge`; a change of period here
            // means the period's last trading day had no bar.
            TimeFrame::Weeks => {
                let (a, b) = (bar.timestamp.date().iso_week(), dt.date().iso_week());
                (b.year(), b.week()) > (a.year(), a.week())
            }
            TimeFrame::Months => {
                let (a, b) = (bar.timestamp.date(), dt.date());
                (b.year(), b.month()) > (a.year(), a.month())
            }
            _ => dt.date().year() > bar.timestamp.date().year(),
        }
    }

    fn bar_over_subdays(&mut self, dt: NaiveDateTime) -> bool {
        if self.eos_check(dt, false) {
            return true;
        }
        let Some(bar) = self.bar else {
            return false;
        };
        if dt < bar.timestamp {
            return false;
        }
        let (point, _) = self.time_point(bar.timestamp.time());
        let (barpoint, _) = self.time_point(dt.time());
        if barpoint <= point {
            return false;
        }
        let comp = self.compression();
        !self.config.bar2edge || comp == 1 || barpoint.div_euclid(comp) > point.div_euclid(comp)
    }

    /// Whether the open bar is complete before `dt` joins it.
    pub fn check_bar_over(&mut self, dt: NaiveDateTime) -> bool {
        if !self.componly && !self.bar_over(dt) {
            return false;
        }
        if self.subdays && self.config.bar2edge {
            return true;
        }
        self.compcount += 1;
        self.compcount % self.config.compression == 0
    }

    /// Whether `dt` sits exactly on a boundary, so the source bar closes the
    /// target bar. Second value: whether a boundary-crossing check still applies.
    pub fn on_edge(&mut self, dt: NaiveDateTime) -> (bool, bool) {
        if !self.subweeks {
            let Some(calendar) = &self.calendar else {
                return (false, true);
            };
            if !calendar.is_last_trading_day_of(self.config.timeframe, dt.date()) {
                return (false, true);
            }
            self.compcount += 1;
            return (self.compcount % self.config.compression == 0, false);
        }
        if self.eos_check(dt, true) {
            return (true, true);
        }
        if self.subdays {
            let (point, rest) = self.time_point(dt.time());
            if rest != 0 {
                return (false, true);
            }
            return (point.rem_euclid(self.compression()) == 0, true);
        }
        (false, true)
    }

    /// Boundary timestamp for the open bar.
    fn adjusted_time(&self) -> Option<NaiveDateTime> {
        let Some(next_eos) = self.next_eos else {
            return self.last_eos;
        };
        let bar = self.bar?;
        let date = bar.timestamp.date();
        let unit_micros: i64 = match self.config.timeframe {
            TimeFrame::Days => return Some(date.and_time(next_eos.time())),
            TimeFrame::Minutes => 60_000_000,
            TimeFrame::Seconds => 1_000_000,
            TimeFrame::Ticks | TimeFrame::MicroSeconds => 1,
            _ => return None,
        };
        let comp = self.compression();
        let (point, _) = self.time_point(bar.timestamp.time());
        let mut bucket = point.div_euclid(comp);
        if self.config.rightedge {
            bucket += 1;
        }
        let edge = bucket * comp - self.config.boundoff;
        Some(date.and_time(NaiveTime::MIN) + Duration::microseconds(edge * unit_micros))
    }

    /// Restamps the open bar at its boundary. With `greater`, only moves the
    /// timestamp forward (right-edge stamping while the source is live).
    pub fn adjust_time(&mut self, greater: bool) -> bool {
        let Some(adjusted) = self.adjusted_time() else {
            return false;
        };
        let Some(bar) = self.bar.as_mut() else {
            return false;
        };
        if greater && adjusted <= bar.timestamp {
            return false;
        }
        bar.timestamp = adjusted;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn time_point_units() {
        let agg = Aggregator::new(ResampleConfig::minutes(5), TimeFrame::Minutes, 1);
        assert_eq!(agg.time_point(at(0, 5, 20).time()), (5, 20));
        let agg = Aggregator::new(ResampleConfig::new(TimeFrame::Seconds, 5), TimeFrame::Ticks, 1);
        assert_eq!(agg.time_point(at(0, 5, 20).time()), (320, 0));
    }

    #[test]
    fn five_minute_edges() {
        let mut agg = Aggregator::new(ResampleConfig::minutes(5), TimeFrame::Minutes, 1);
        assert_eq!(agg.on_edge(at(10, 5, 0)), (true, true));
        assert_eq!(agg.on_edge(at(10, 6, 0)), (false, true));
        assert_eq!(agg.on_edge(at(10, 5, 30)), (false, true));
    }

    #[test]
    fn boundoff_shifts_edges() {
        let cfg = ResampleConfig {
            boundoff: 1,
            ..ResampleConfig::minutes(5)
        };
        let mut agg = Aggregator::new(cfg, TimeFrame::Minutes, 1);
        assert_eq!(agg.on_edge(at(10, 4, 0)), (true, true));
    }

    #[test]
    fn adjusted_time_rounds_to_right_edge() {
        let mut agg = Aggregator::new(ResampleConfig::minutes(5), TimeFrame::Minutes, 1);
        agg.update(&Bar::new(at(10, 3, 0), 1.0, 1.0, 1.0, 1.0, 1.0));
        agg.eos_check(at(10, 3, 0), false);
        assert!(agg.adjust_time(true));
        assert_eq!(agg.bar.unwrap().timestamp, at(10, 5, 0));
    }

    #[test]
    fn componly_for_same_unit() {
        let agg = Aggregator::new(ResampleConfig::new(TimeFrame::Days, 2), TimeFrame::Days, 1);
        assert!(agg.componly);
        let agg = Aggregator::new(ResampleConfig::minutes(5), TimeFrame::Minutes, 1);
        assert!(!agg.componly);
    }
}
