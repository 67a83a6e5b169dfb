use super::boundary::Aggregator;
use super::ResampleConfig;
use crate::calendar::TradingCalendar;
use crate::domain::{Bar, TimeFrame};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// One step of a replayed bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayUpdate {
    /// The target bar as it stands after this source bar.
    pub bar: Bar,
    /// The source bar that produced the update.
    pub tick: Bar,
    /// First update of a new target bar.
    pub opened: bool,
    /// The target bar is complete with this update.
    pub closed: bool,
    /// The previous target bar, completed because this source bar belongs to
    /// the next period.
    pub finished: Option<Bar>,
}

/// Reports the target bar after every source bar.
///
/// Boundary timestamps are not adjusted while replaying: the bar always
/// carries its latest source timestamp.
#[derive(Debug)]
pub struct Replayer {
    agg: Aggregator,
}

impl Replayer {
    pub fn new(config: ResampleConfig, source: TimeFrame, source_compression: u32) -> Self {
        let config = ResampleConfig {
            adjbartime: false,
            ..config
        };
        Self {
            agg: Aggregator::new(config, source, source_compression),
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.agg.set_calendar(calendar);
        self
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.agg.config
    }

    pub fn push(&mut self, src: &Bar) -> Option<ReplayUpdate> {
        let dt = src.timestamp;
        let late = self.agg.is_late(dt);
        if late && !self.agg.config.takelate {
            trace!(%dt, "dropping late bar");
            return None;
        }
        let (consumed, onedge, docheckover) = if late || self.agg.componly {
            (true, false, true)
        } else {
            let (onedge, docheckover) = self.agg.on_edge(dt);
            (onedge, onedge, docheckover)
        };

        let opened = !self.agg.is_open();
        if consumed {
            self.agg.update(src);
            if late {
                self.agg.restamp_late();
            }
        }
        let mut over = onedge;
        if !over && docheckover && self.agg.is_open() {
            over = self.agg.check_bar_over(dt);
        }

        if over && consumed {
            let bar = self.agg.take()?;
            return Some(ReplayUpdate {
                bar,
                tick: *src,
                opened,
                closed: true,
                finished: None,
            });
        }
        let finished = if over { self.agg.take() } else { None };
        if !consumed {
            self.agg.update(src);
        }
        let bar = self.agg.bar?;
        Some(ReplayUpdate {
            bar,
            tick: *src,
            opened: opened || finished.is_some(),
            closed: false,
            finished,
        })
    }

    /// Closes the bar in progress once the source is exhausted.
    pub fn flush(&mut self) -> Option<Bar> {
        self.agg.take()
    }
}
