//! Commission, margin and interest pricing.
//!
//! A [`CommissionScheme`] decides how much an operation costs, how much cash a
//! position ties up, and how a margined position moves cash as prices change.
//! Schemes are attached per instrument through a [`CommissionRegistry`] before
//! a run and are read-only afterwards.

mod futures;
mod info;
mod registry;

pub use futures::FuturesCommission;
pub use info::{AutoMargin, CommissionInfo, CommissionSpec, CommissionType};
pub use registry::CommissionRegistry;

use crate::domain::Position;
use chrono::NaiveDateTime;
use std::fmt;

/// Pricing policy for one instrument.
///
/// Implementors provide the primitive parameters; valuation and cost helpers
/// are derived from them.
pub trait CommissionScheme: Send + Sync + fmt::Debug {
    /// Cash-settled (value = size × price) rather than margined.
    fn stocklike(&self) -> bool;

    fn multiplier(&self) -> f64;

    fn leverage(&self) -> f64;

    /// Margin required per unit at `price`. Only used for margined instruments.
    fn margin(&self, price: f64) -> f64;

    /// Margin parameter reported on fills.
    fn nominal_margin(&self) -> Option<f64>;

    /// Commission for an operation of `size` units at `price`.
    fn commission(&self, size: f64, price: f64) -> f64;

    /// Interest rate per day charged on borrowed exposure.
    fn daily_credit_rate(&self) -> f64 {
        0.0
    }

    /// Whether long positions are charged interest too.
    fn charges_long_interest(&self) -> bool {
        false
    }

    /// Leverage usable as a divisor. Zero, negative or non-finite leverage is
    /// treated as 1.
    fn leverage_divisor(&self) -> f64 {
        let lev = self.leverage();
        if lev.is_finite() && lev > 0.0 {
            lev
        } else {
            1.0
        }
    }

    /// Units affordable with `cash` at `price`.
    fn size_for_cash(&self, price: f64, cash: f64) -> f64 {
        let unit = if self.stocklike() {
            price
        } else {
            self.margin(price)
        };
        if !(unit > 0.0) {
            return 0.0;
        }
        self.leverage_divisor() * (cash / unit).floor()
    }

    /// Cash needed to carry out the operation.
    fn operation_cost(&self, size: f64, price: f64) -> f64 {
        if self.stocklike() {
            size.abs() * price
        } else {
            size.abs() * self.margin(price)
        }
    }

    /// Signed value of `size` units (negative for stock-like shorts).
    fn value_size(&self, size: f64, price: f64) -> f64 {
        if self.stocklike() {
            size * price
        } else {
            size.abs() * self.margin(price)
        }
    }

    /// Value of a position, counting a short stock-like position's gain as
    /// value on top of its entry value.
    fn position_value(&self, position: &Position, price: f64) -> f64 {
        if !self.stocklike() {
            return position.size.abs() * self.margin(price);
        }
        let size = position.size;
        if size >= 0.0 {
            return size * price;
        }
        position.price * size + (position.price - price) * size
    }

    fn profit_and_loss(&self, size: f64, price: f64, new_price: f64) -> f64 {
        size * (new_price - price) * self.multiplier()
    }

    /// Cash moved by marking a margined position from `price` to `new_price`.
    fn cash_adjust(&self, size: f64, price: f64, new_price: f64) -> f64 {
        if self.stocklike() {
            0.0
        } else {
            size * (new_price - price) * self.multiplier()
        }
    }

    /// Interest owed for holding `position` from its last update until `now`.
    /// Only whole days count.
    fn credit_interest(&self, position: &Position, now: NaiveDateTime) -> f64 {
        if position.size > 0.0 && !self.charges_long_interest() {
            return 0.0;
        }
        let Some(since) = position.updated else {
            return 0.0;
        };
        let days = (now.date() - since.date()).num_days();
        if days <= 0 {
            return 0.0;
        }
        days as f64 * self.daily_credit_rate() * position.size.abs() * position.price
    }
}
