use super::{BarStream, StreamStatus};
use crate::calendar::TradingCalendar;
use crate::domain::{Bar, TimeFrame};
use crate::resample::{ResampleConfig, Resampler};
use std::sync::Arc;

/// Folds a finer source stream into larger bars.
///
/// Each poll consumes one source bar, so the stream reports
/// `NotYetAvailable` while a target bar is still open.
pub struct ResampledFeed {
    name: String,
    source: Box<dyn BarStream>,
    resampler: Resampler,
    history: Vec<Bar>,
    stash: Option<Bar>,
    flushed: bool,
    consumed: bool,
}

impl ResampledFeed {
    pub fn new(name: impl Into<String>, source: Box<dyn BarStream>, config: ResampleConfig) -> Self {
        let resampler = Resampler::new(config, source.timeframe(), source.compression());
        Self {
            name: name.into(),
            source,
            resampler,
            history: Vec::new(),
            stash: None,
            flushed: false,
            consumed: false,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.resampler = self.resampler.with_calendar(calendar);
        self
    }

    pub fn config(&self) -> &ResampleConfig {
        self.resampler.config()
    }

    fn deliver(&mut self, bar: Bar) -> StreamStatus {
        self.history.push(bar);
        StreamStatus::Delivered
    }
}

impl BarStream for ResampledFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrame {
        self.resampler.config().timeframe
    }

    fn compression(&self) -> u32 {
        self.resampler.config().compression
    }

    fn next(&mut self) -> StreamStatus {
        self.consumed = false;
        if let Some(bar) = self.stash.take() {
            return self.deliver(bar);
        }
        match self.source.next() {
            StreamStatus::Delivered => {
                let Some(src) = self.source.current().copied() else {
                    return StreamStatus::NotYetAvailable;
                };
                match self.resampler.push(&src) {
                    Some(bar) => self.deliver(bar),
                    None => {
                        self.consumed = true;
                        StreamStatus::NotYetAvailable
                    }
                }
            }
            StreamStatus::NotYetAvailable => StreamStatus::NotYetAvailable,
            StreamStatus::Exhausted => {
                if self.flushed {
                    return StreamStatus::Exhausted;
                }
                self.flushed = true;
                match self.resampler.flush() {
                    Some(bar) => self.deliver(bar),
                    None => StreamStatus::Exhausted,
                }
            }
        }
    }

    fn rewind(&mut self) {
        self.stash = self.history.pop();
    }

    fn is_resample_only(&self) -> bool {
        true
    }

    fn consumed_input(&self) -> bool {
        self.consumed
    }

    fn history(&self) -> &[Bar] {
        &self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::{at, minute_bars};
    use crate::feed::VecFeed;

    fn five_minute(bars: Vec<Bar>) -> ResampledFeed {
        let src = VecFeed::minutes("es", 1, bars);
        ResampledFeed::new("es-5m", Box::new(src), ResampleConfig::minutes(5))
    }

    #[test]
    fn waits_until_the_bucket_closes() {
        let mut feed = five_minute(minute_bars(2, 10, 1, 5));
        for _ in 0..4 {
            assert_eq!(feed.next(), StreamStatus::NotYetAvailable);
            assert!(feed.consumed_input());
        }
        assert_eq!(feed.next(), StreamStatus::Delivered);
        let bar = feed.current().unwrap();
        assert_eq!(bar.timestamp, at(2, 10, 5));
        assert_eq!(bar.open, 100.0);
        assert_eq!(bar.close, 104.5);
        assert_eq!(bar.volume, 50.0);
        assert_eq!(feed.next(), StreamStatus::Exhausted);
    }

    #[test]
    fn flushes_the_open_bar_at_the_end() {
        let mut feed = five_minute(minute_bars(2, 10, 1, 3));
        for _ in 0..3 {
            assert_eq!(feed.next(), StreamStatus::NotYetAvailable);
        }
        assert_eq!(feed.next(), StreamStatus::Delivered);
        assert_eq!(feed.current().unwrap().high, 103.0);
        assert_eq!(feed.next(), StreamStatus::Exhausted);
        assert_eq!(feed.next(), StreamStatus::Exhausted);
        assert!(!feed.consumed_input());
    }

    #[test]
    fn rewind_stashes_the_delivered_bar() {
        let mut feed = five_minute(minute_bars(2, 10, 1, 5));
        while feed.next() != StreamStatus::Delivered {}
        let bar = *feed.current().unwrap();
        feed.rewind();
        assert!(feed.is_empty());
        assert_eq!(feed.next(), StreamStatus::Delivered);
        assert_eq!(*feed.current().unwrap(), bar);
        assert!(feed.is_resample_only());
    }
}
