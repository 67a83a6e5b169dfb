use super::boundary::Aggregator;
use super::ResampleConfig;
use crate::calendar::TradingCalendar;
use crate::domain::{Bar, TimeFrame};
use std::sync::Arc;
use tracing::trace;

/// Accumulates source bars and emits each target bar once it is complete.
#[derive(Debug)]
pub struct Resampler {
    agg: Aggregator,
}

impl Resampler {
    /// `source` and `source_compression` describe the incoming stream.
    pub fn new(config: ResampleConfig, source: TimeFrame, source_compression: u32) -> Self {
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

    /// The target bar being accumulated, if any.
    pub fn pending(&self) -> Option<&Bar> {
        self.agg.bar.as_ref()
    }

    /// Feeds one source bar. Returns the target bar it completed, if any.
    /// A source bar that opens a new period is kept for the next bar.
    pub fn push(&mut self, src: &Bar) -> Option<Bar> {
        let dt = src.timestamp;
        if self.agg.is_late(dt) {
            if !self.agg.config.takelate {
                trace!(%dt, "dropping late bar");
                return None;
            }
            self.agg.update(src);
            self.agg.restamp_late();
            return None;
        }

        let (consumed, onedge, docheckover) = if self.agg.componly {
            self.agg.last_eos = Some(self.agg.session_end_after(dt));
            (true, false, true)
        } else {
            let (onedge, docheckover) = self.agg.on_edge(dt);
            (onedge, onedge, docheckover)
        };
        if consumed {
            self.agg.update(src);
        }

        let mut over = self.agg.is_open();
        if over && !onedge && docheckover {
            over = self.agg.check_bar_over(dt);
        }
        let mut out = None;
        if over {
            if !onedge && self.agg.doadjusttime {
                let forward_only = self.agg.config.rightedge;
                self.agg.adjust_time(forward_only);
            }
            out = self.agg.take();
        }
        if !consumed {
            self.agg.update(src);
        }
        out
    }

    /// Delivers the open bar once the source is exhausted.
    pub fn flush(&mut self) -> Option<Bar> {
        if !self.agg.is_open() {
            return None;
        }
        if self.agg.doadjusttime {
            self.agg.prepare_flush();
            self.agg.adjust_time(false);
        }
        self.agg.take()
    }
}
