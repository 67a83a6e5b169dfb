//! Timeframe aggregation.
//!
//! A [`Resampler`] folds finer source bars into one coarser bar and hands it
//! out only once it is complete. A [`Replayer`] reports the coarser bar after
//! every source update so consumers can watch it build up.
//!
//! Boundaries come from the target unit: an intraday clock point bucketed by
//! the compression for seconds and minutes, the session end for days, and
//! calendar edges (or ISO week / month / year changes) above that.

mod boundary;
mod replayer;
mod resampler;

pub use replayer::{ReplayUpdate, Replayer};
pub use resampler::Resampler;

use crate::domain::TimeFrame;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

/// Target timeframe and edge policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResampleConfig {
    pub timeframe: TimeFrame,
    /// Target units per bar, e.g. 5 with `Minutes` for 5-minute bars.
    pub compression: u32,
    /// Align bars to clock boundaries instead of counting source bars.
    pub bar2edge: bool,
    /// Stamp a delivered bar with its boundary rather than the last source
    /// timestamp. Only applies with `bar2edge` below weekly timeframes.
    pub adjbartime: bool,
    /// Stamp with the end of the bucket (true) or its start.
    pub rightedge: bool,
    /// Shift intraday boundaries by this many target units.
    pub boundoff: i64,
    /// Merge late intraday source bars into the open bar instead of dropping them.
    pub takelate: bool,
    /// Session end used when no calendar is attached. Defaults to end of day.
    pub session_end: Option<NaiveTime>,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            timeframe: TimeFrame::Days,
            compression: 1,
            bar2edge: true,
            adjbartime: true,
            rightedge: true,
            boundoff: 0,
            takelate: true,
            session_end: None,
        }
    }
}

impl ResampleConfig {
    pub fn new(timeframe: TimeFrame, compression: u32) -> Self {
        Self {
            timeframe,
            compression,
            ..Self::default()
        }
    }

    pub fn minutes(compression: u32) -> Self {
        Self::new(TimeFrame::Minutes, compression)
    }

    pub fn days() -> Self {
        Self::new(TimeFrame::Days, 1)
    }

    pub fn weeks() -> Self {
        Self::new(TimeFrame::Weeks, 1)
    }

    pub fn months() -> Self {
        Self::new(TimeFrame::Months, 1)
    }

    pub fn with_session_end(mut self, end: NaiveTime) -> Self {
        self.session_end = Some(end);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.compression == 0 {
            return Err("compression must be at least 1".into());
        }
        Ok(())
    }
}
