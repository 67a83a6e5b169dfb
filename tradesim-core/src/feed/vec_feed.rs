use super::{BarStream, StreamStatus};
use crate::domain::{Bar, TimeFrame};

/// In-memory stream over pre-loaded bars.
#[derive(Debug, Clone)]
pub struct VecFeed {
    name: String,
    timeframe: TimeFrame,
    compression: u32,
    bars: Vec<Bar>,
    cursor: usize,
}

impl VecFeed {
    /// Bars are sorted by timestamp; the order of equal timestamps is kept.
    pub fn new(name: impl Into<String>, timeframe: TimeFrame, compression: u32, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            name: name.into(),
            timeframe,
            compression: compression.max(1),
            bars,
            cursor: 0,
        }
    }

    pub fn daily(name: impl Into<String>, bars: Vec<Bar>) -> Self {
        Self::new(name, TimeFrame::Days, 1, bars)
    }

    pub fn minutes(name: impl Into<String>, compression: u32, bars: Vec<Bar>) -> Self {
        Self::new(name, TimeFrame::Minutes, compression, bars)
    }

    /// Bars not yet delivered.
    pub fn remaining(&self) -> usize {
        self.bars.len() - self.cursor
    }
}

impl BarStream for VecFeed {
    fn name(&self) -> &str {
        &self.name
    }

    fn timeframe(&self) -> TimeFrame {
        self.timeframe
    }

    fn compression(&self) -> u32 {
        self.compression
    }

    fn next(&mut self) -> StreamStatus {
        if self.cursor < self.bars.len() {
            self.cursor += 1;
            StreamStatus::Delivered
        } else {
            StreamStatus::Exhausted
        }
    }

    fn rewind(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    fn history(&self) -> &[Bar] {
        &self.bars[..self.cursor]
    }
}
