//! Per-instrument position ledger.
//!
//! A trade of signed size against the current position is split into a
//! *closed* part (reducing the existing exposure at the old average price)
//! and an *opened* part (new exposure, averaged in or starting fresh on the
//! other side of zero).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Sizes below this are treated as flat.
pub const SIZE_EPSILON: f64 = 1e-9;

/// Signed size, average entry price and the price last used for mark-to-market
/// cash adjustment of margined instruments.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub size: f64,
    /// Average entry price. Not meaningful while `size == 0`.
    pub price: f64,
    pub adjbase: f64,
    /// Last update or interest accrual instant.
    pub updated: Option<NaiveDateTime>,
}

/// Outcome of applying a trade to a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionUpdate {
    /// Size after the trade.
    pub size: f64,
    /// Average price after the trade.
    pub price: f64,
    /// Signed part of the trade that opened exposure.
    pub opened: f64,
    /// Signed part of the trade that reduced existing exposure.
    pub closed: f64,
}

impl Position {
    pub fn new(size: f64, price: f64) -> Self {
        Self {
            size,
            price,
            adjbase: price,
            updated: None,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.size.abs() < SIZE_EPSILON
    }

    pub fn is_long(&self) -> bool {
        self.size >= SIZE_EPSILON
    }

    pub fn is_short(&self) -> bool {
        self.size <= -SIZE_EPSILON
    }

    /// Applies a signed trade and returns the open/close split.
    pub fn update(&mut self, size: f64, price: f64, dt: Option<NaiveDateTime>) -> PositionUpdate {
        let old = self.size;
        let mut new_size = old + size;
        if new_size.abs() < SIZE_EPSILON {
            new_size = 0.0;
        }
        self.size = new_size;
        if dt.is_some() {
            self.updated = dt;
        }

        let (opened, closed);
        if new_size == 0.0 {
            opened = 0.0;
            closed = size;
            self.price = 0.0;
        } else if old.abs() < SIZE_EPSILON {
            opened = size;
            closed = 0.0;
            self.price = price;
        } else if old > 0.0 {
            if size > 0.0 {
                opened = size;
                closed = 0.0;
                self.price = (self.price * old + size * price) / new_size;
            } else if new_size > 0.0 {
                opened = 0.0;
                closed = size;
            } else {
                opened = new_size;
                closed = -old;
                self.price = price;
            }
        } else if size < 0.0 {
            opened = size;
            closed = 0.0;
            self.price = (self.price * old + size * price) / new_size;
        } else if new_size < 0.0 {
            opened = 0.0;
            closed = size;
        } else {
            opened = new_size;
            closed = -old;
            self.price = price;
        }

        PositionUpdate {
            size: self.size,
            price: self.price,
            opened,
            closed,
        }
    }

    /// Same split as [`Position::update`] without touching `self`.
    pub fn pseudo_update(&self, size: f64, price: f64) -> PositionUpdate {
        let mut shadow = *self;
        shadow.update(size, price, None)
    }
}
