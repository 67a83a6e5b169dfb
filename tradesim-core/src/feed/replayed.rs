use super::{BarStream, StreamStatus};
use crate::calendar::TradingCalendar;
use crate::domain::{Bar, TimeFrame};
use crate::resample::{ReplayUpdate, ResampleConfig, Replayer};
use std::sync::Arc;

/// What one delivery changed, so it can be undone.
#[derive(Debug, Clone, Copy)]
struct Applied {
    update: ReplayUpdate,
    prev_len: usize,
    prev_last: Option<Bar>,
    prev_tick: Option<Bar>,
    prev_closed: usize,
}

/// Shows a larger bar building up, one source bar at a time.
///
/// Every source bar is delivered as an update of the current target bar. The
/// history only grows when a new target bar opens; until then the last entry
/// is replaced in place.
pub struct ReplayedFeed {
    name: String,
    source: Box<dyn BarStream>,
    replayer: Replayer,
    history: Vec<Bar>,
    tick: Option<Bar>,
    last: Option<Applied>,
    stash: Option<ReplayUpdate>,
    closed: usize,
    done: bool,
}

impl ReplayedFeed {
    pub fn new(name: impl Into<String>, source: Box<dyn BarStream>, config: ResampleConfig) -> Self {
        let replayer = Replayer::new(config, source.timeframe(), source.compression());
        Self {
            name: name.into(),
            source,
            replayer,
            history: Vec::new(),
            tick: None,
            last: None,
            stash: None,
            closed: 0,
            done: false,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.replayer = self.replayer.with_calendar(calendar);
        self
    }

    /// Number of completed target bars.
    pub fn closed_len(&self) -> usize {
        self.closed
    }

    fn apply(&mut self, update: ReplayUpdate) -> StreamStatus {
        self.last = Some(Applied {
            update,
            prev_len: self.history.len(),
            prev_last: self.history.last().copied(),
            prev_tick: self.tick,
            prev_closed: self.closed,
        });
        if let Some(finished) = update.finished {
            if let Some(last) = self.history.last_mut() {
                *last = finished;
            }
        }
        if update.opened || self.history.is_empty() {
            self.history.push(update.bar);
        } else if let Some(last) = self.history.last_mut() {
            *last = update.bar;
        }
        self.tick = Some(update.tick);
        self.recount();
        StreamStatus::Delivered
    }

    fn recount(&mut self) {
        let open = self.last.is_some_and(|a| !a.update.closed);
        self.closed = if open {
            self.history.len().saturating_sub(1)
        } else {
            self.history.len()
        };
    }
}

impl BarStream for ReplayedFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrame {
        self.replayer.config().timeframe
    }

    fn compression(&self) -> u32 {
        self.replayer.config().compression
    }

    fn next(&mut self) -> StreamStatus {
        if let Some(update) = self.stash.take() {
            return self.apply(update);
        }
        if self.done {
            return StreamStatus::Exhausted;
        }
        match self.source.next() {
            StreamStatus::Delivered => {
                let Some(src) = self.source.current().copied() else {
                    return StreamStatus::NotYetAvailable;
                };
                match self.replayer.push(&src) {
                    Some(update) => self.apply(update),
                    None => StreamStatus::NotYetAvailable,
                }
            }
            StreamStatus::NotYetAvailable => StreamStatus::NotYetAvailable,
            StreamStatus::Exhausted => {
                // The open bar was already shown; closing it only finalises
                // the stored copy.
                if let Some(bar) = self.replayer.flush() {
                    if let Some(last) = self.history.last_mut() {
                        *last = bar;
                    }
                }
                self.closed = self.history.len();
                self.done = true;
                StreamStatus::Exhausted
            }
        }
    }

    fn tick(&self) -> Option<&Bar> {
        self.tick.as_ref()
    }

    fn rewind(&mut self) {
        let Some(applied) = self.last.take() else {
            return;
        };
        self.history.truncate(applied.prev_len);
        if let (Some(prev), Some(last)) = (applied.prev_last, self.history.last_mut()) {
            *last = prev;
        }
        self.tick = applied.prev_tick;
        self.stash = Some(applied.update);
        self.closed = applied.prev_closed;
    }

    fn history(&self) -> &[Bar] {
        &self.history
    }
}
