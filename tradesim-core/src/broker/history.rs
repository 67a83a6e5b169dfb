//! Recorded order and fund histories fed back into the broker.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A past execution to replay as a Historical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalOrder {
    pub dt: NaiveDateTime,
    pub instrument: String,
    /// Signed: positive buys, negative sells.
    pub size: f64,
    pub price: f64,
}

impl HistoricalOrder {
    pub fn new(dt: NaiveDateTime, instrument: impl Into<String>, size: f64, price: f64) -> Self {
        Self {
            dt,
            instrument: instrument.into(),
            size,
            price,
        }
    }
}

/// A recorded fund mark: share value and net asset value at `dt`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundMark {
    pub dt: NaiveDateTime,
    pub share_value: f64,
    pub net_asset_value: f64,
}

/// One registered batch of historical orders, consumed in order.
#[derive(Debug, Clone)]
pub(crate) struct OrderHistory {
    pending: VecDeque<HistoricalOrder>,
    pub notify: bool,
}

impl OrderHistory {
    pub fn new(entries: impl IntoIterator<Item = HistoricalOrder>, notify: bool) -> Self {
        Self {
            pending: entries.into_iter().collect(),
            notify,
        }
    }

    pub fn peek(&self) -> Option<&HistoricalOrder> {
        self.pending.front()
    }

    pub fn pop(&mut self) -> Option<HistoricalOrder> {
        self.pending.pop_front()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FundHistory {
    pending: VecDeque<FundMark>,
    last: Option<FundMark>,
}

impl FundHistory {
    pub fn new(marks: impl IntoIterator<Item = FundMark>) -> Self {
        Self {
            pending: marks.into_iter().collect(),
            last: None,
        }
    }

    pub fn first(&self) -> Option<FundMark> {
        self.pending.front().copied()
    }

    /// Consumes every mark at or before `now` and returns the latest one seen.
    pub fn advance(&mut self, now: NaiveDateTime) -> Option<FundMark> {
        while self.pending.front().is_some_and(|m| m.dt <= now) {
            self.last = self.pending.pop_front();
        }
        self.last
    }
}
