//! Slippage applied against matched prices.
//!
//! The slipped price is capped by the bar's range (or the limit price). When
//! the cap is hit the outcome depends on `slip_match`, `slip_limit` and
//! `slip_out`; with none of them the order does not fill on this bar.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippageConfig {
    /// Relative slippage (0.01 = 1%). Takes precedence over `fixed`.
    pub perc: f64,
    /// Absolute slippage in price units.
    pub fixed: f64,
    /// Slip prices that are the bar's open.
    pub slip_open: bool,
    /// On hitting the cap, fill at the cap instead of not filling.
    pub slip_match: bool,
    /// On hitting the cap, limit orders still fill.
    pub slip_limit: bool,
    /// When filling past the cap, use the slipped price outside the bar range.
    pub slip_out: bool,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            perc: 0.0,
            fixed: 0.0,
            slip_open: true,
            slip_match: true,
            slip_limit: true,
            slip_out: false,
        }
    }
}

impl SlippageConfig {
    pub fn percent(perc: f64) -> Self {
        Self {
            perc,
            ..Self::default()
        }
    }

    pub fn fixed(fixed: f64) -> Self {
        Self {
            fixed,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.perc != 0.0 || self.fixed != 0.0
    }

    /// Worsens a buy price, capped at `pmax`.
    pub fn slip_up(&self, pmax: f64, price: f64, doslip: bool, lim: bool) -> Option<f64> {
        if !doslip {
            return Some(price);
        }
        let slipped = if self.perc != 0.0 {
            price * (1.0 + self.perc)
        } else if self.fixed != 0.0 {
            price + self.fixed
        } else {
            return Some(price);
        };
        if slipped <= pmax {
            return Some(slipped);
        }
        self.capped(pmax, slipped, lim)
    }

    /// Worsens a sell price, floored at `pmin`.
    pub fn slip_down(&self, pmin: f64, price: f64, doslip: bool, lim: bool) -> Option<f64> {
        if !doslip {
            return Some(price);
        }
        let slipped = if self.perc != 0.0 {
            price * (1.0 - self.perc)
        } else if self.fixed != 0.0 {
            price - self.fixed
        } else {
            return Some(price);
        };
        if slipped >= pmin {
            return Some(slipped);
        }
        self.capped(pmin, slipped, lim)
    }

    fn capped(&self, cap: f64, slipped: f64, lim: bool) -> Option<f64> {
        if self.slip_match || (lim && self.slip_limit) {
            Some(if self.slip_out { slipped } else { cap })
        } else {
            None
        }
    }
}
