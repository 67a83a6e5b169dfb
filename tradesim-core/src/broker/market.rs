//! Per-tick market input and the broker's view of each instrument.

use crate::domain::Bar;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A delivered bar plus an optional tick-level override (the source bar that
/// last updated a replayed bar).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketBar {
    pub bar: Bar,
    pub tick: Option<Bar>,
}

impl From<Bar> for MarketBar {
    fn from(bar: Bar) -> Self {
        Self { bar, tick: None }
    }
}

/// The synchronized row handed to the broker for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSet {
    pub dt: NaiveDateTime,
    pub bars: BTreeMap<String, MarketBar>,
}

impl BarSet {
    pub fn new(dt: NaiveDateTime) -> Self {
        Self {
            dt,
            bars: BTreeMap::new(),
        }
    }

    /// Single-instrument row stamped with the bar's own timestamp.
    pub fn single(instrument: impl Into<String>, bar: Bar) -> Self {
        Self::new(bar.timestamp).with(instrument, bar)
    }

    pub fn with(mut self, instrument: impl Into<String>, bar: Bar) -> Self {
        self.insert(instrument, MarketBar::from(bar));
        self
    }

    pub fn insert(&mut self, instrument: impl Into<String>, bar: MarketBar) {
        self.bars.insert(instrument.into(), bar);
    }

    pub fn get(&self, instrument: &str) -> Option<&MarketBar> {
        self.bars.get(instrument)
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Open/high/low/close used for matching.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Quote {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Latest known data for one instrument.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MarketState {
    pub bar: Bar,
    pub tick: Option<Bar>,
    pub prev: Option<Bar>,
    /// A bar arrived for this instrument on the current tick.
    pub fresh: bool,
}

impl MarketState {
    pub fn new(delivered: MarketBar) -> Self {
        Self {
            bar: delivered.bar,
            tick: delivered.tick,
            prev: None,
            fresh: true,
        }
    }

    pub fn advance(&mut self, delivered: MarketBar) {
        // A replayed bar updates in place; only a new timestamp moves history.
        if delivered.bar.timestamp != self.bar.timestamp {
            self.prev = Some(self.bar);
        }
        self.bar = delivered.bar;
        self.tick = delivered.tick;
        self.fresh = true;
    }

    pub fn quote(&self) -> Quote {
        let src = self.tick.unwrap_or(self.bar);
        Quote {
            open: src.open,
            high: src.high,
            low: src.low,
            close: src.close,
        }
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.bar.timestamp
    }
}
