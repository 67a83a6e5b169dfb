//! Bar streams consumed by the engine.
//!
//! A stream is polled once per iteration. It either delivers its next bar,
//! reports that nothing is ready yet (an aggregator still building a bar), or
//! reports that it is exhausted. The engine may rewind a delivered bar so the
//! same bar is offered again on the following poll.

mod replayed;
mod resampled;
mod vec_feed;

pub use replayed::ReplayedFeed;
pub use resampled::ResampledFeed;
pub use vec_feed::VecFeed;

use crate::domain::{Bar, TimeFrame};
use serde::{Deserialize, Serialize};

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamStatus {
    Delivered,
    NotYetAvailable,
    Exhausted,
}

/// A source of bars with a fixed timeframe and compression.
pub trait BarStream: Send {
    /// Unique name; also the instrument key seen by the broker.
    fn name(&self) -> &str;

    fn timeframe(&self) -> TimeFrame;

    fn compression(&self) -> u32;

    /// Advances by at most one bar.
    fn next(&mut self) -> StreamStatus;

    /// The most recently delivered bar.
    fn current(&self) -> Option<&Bar> {
        self.history().last()
    }

    /// Source-level bar behind the current bar, when the stream replays.
    fn tick(&self) -> Option<&Bar> {
        None
    }

    /// Undoes the last delivery. The undone bar is delivered again by the
    /// next call to [`BarStream::next`].
    fn rewind(&mut self);

    /// Aggregated streams that should not drive the clock when raw streams
    /// are present.
    fn is_resample_only(&self) -> bool {
        false
    }

    /// Whether the last `NotYetAvailable` poll still consumed input, i.e.
    /// an aggregator folded a source bar into a bar that is not closed yet.
    fn consumed_input(&self) -> bool {
        false
    }

    /// Every bar delivered so far, oldest first.
    fn history(&self) -> &[Bar];

    fn len(&self) -> usize {
        self.history().len()
    }

    fn is_empty(&self) -> bool {
        self.history().is_empty()
    }
}

impl<S: BarStream + ?Sized> BarStream for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn timeframe(&self) -> TimeFrame {
        (**self).timeframe()
    }

    fn compression(&self) -> u32 {
        (**self).compression()
    }

    fn next(&mut self) -> StreamStatus {
        (**self).next()
    }

    fn current(&self) -> Option<&Bar> {
        (**self).current()
    }

    fn tick(&self) -> Option<&Bar> {
        (**self).tick()
    }

    fn rewind(&mut self) {
        (**self).rewind()
    }

    fn is_resample_only(&self) -> bool {
        (**self).is_resample_only()
    }

    fn consumed_input(&self) -> bool {
        (**self).consumed_input()
    }

    fn history(&self) -> &[Bar] {
        (**self).history()
    }
}
