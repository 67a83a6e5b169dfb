//! Volume fillers: cap how much of an order a single bar can absorb.

use crate::domain::Bar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decides the unsigned size executable on `bar` at `price`.
pub trait Filler: Send + Sync + fmt::Debug {
    fn fill_size(&self, remaining: f64, price: f64, bar: &Bar) -> f64;
}

/// At most `size` units per bar (unbounded when `None`), never more than
/// the bar's volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedSize {
    pub size: Option<f64>,
}

impl Filler for FixedSize {
    fn fill_size(&self, remaining: f64, _price: f64, bar: &Bar) -> f64 {
        let cap = self.size.filter(|s| *s > 0.0).unwrap_or(f64::INFINITY);
        bar.volume.min(remaining.abs()).min(cap)
    }
}

/// A percentage of the bar's volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedBarPerc {
    pub perc: f64,
}

impl Filler for FixedBarPerc {
    fn fill_size(&self, remaining: f64, _price: f64, bar: &Bar) -> f64 {
        let max = (bar.volume * self.perc / 100.0).floor();
        max.min(remaining.abs())
    }
}

/// Volume spread evenly over the bar's high-low range in `minmov` steps; a
/// percentage of one step's share is available at any given price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarPointPerc {
    pub minmov: Option<f64>,
    pub perc: f64,
}

impl Filler for BarPointPerc {
    fn fill_size(&self, remaining: f64, _price: f64, bar: &Bar) -> f64 {
        let parts = match self.minmov {
            Some(minmov) if minmov > 0.0 => ((bar.high - bar.low + minmov) / minmov).floor().max(1.0),
            _ => 1.0,
        };
        let alloc = (bar.volume / parts * self.perc / 100.0).floor();
        alloc.min(remaining.abs())
    }
}

/// Serializable filler selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillerConfig {
    FixedSize { size: Option<f64> },
    FixedBarPerc { perc: f64 },
    BarPointPerc { minmov: Option<f64>, perc: f64 },
}

impl FillerConfig {
    pub fn build(&self) -> Box<dyn Filler> {
        match *self {
            FillerConfig::FixedSize { size } => Box::new(FixedSize { size }),
            FillerConfig::FixedBarPerc { perc } => Box::new(FixedBarPerc { perc }),
            FillerConfig::BarPointPerc { minmov, perc } => Box::new(BarPointPerc { minmov, perc }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(high: f64, low: f64, volume: f64) -> Bar {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap();
        Bar::new(ts, low, high, low, high, volume)
    }

    #[test]
    fn fixed_size_is_min_of_three() {
        let f = FixedSize { size: Some(30.0) };
        assert_eq!(f.fill_size(100.0, 10.0, &bar(11.0, 10.0, 50.0)), 30.0);
        assert_eq!(f.fill_size(100.0, 10.0, &bar(11.0, 10.0, 20.0)), 20.0);
        assert_eq!(f.fill_size(-5.0, 10.0, &bar(11.0, 10.0, 20.0)), 5.0);
        let unbounded = FixedSize { size: None };
        assert_eq!(unbounded.fill_size(100.0, 10.0, &bar(11.0, 10.0, 70.0)), 70.0);
    }

    #[test]
    fn fixed_bar_perc_floors() {
        let f = FixedBarPerc { perc: 10.0 };
        assert_eq!(f.fill_size(100.0, 10.0, &bar(11.0, 10.0, 255.0)), 25.0);
    }

    #[test]
    fn bar_point_perc_partitions_range() {
        let f = BarPointPerc {
            minmov: Some(0.5),
            perc: 100.0,
        };
        // (11 - 10 + 0.5) / 0.5 = 3 price points
        assert_eq!(f.fill_size(100.0, 10.0, &bar(11.0, 10.0, 90.0)), 30.0);
    }

    #[test]
    fn config_builds_matching_filler() {
        let cfg: FillerConfig = serde_json::from_str(r#"{"type":"FIXED_BAR_PERC","perc":50.0}"#).unwrap();
        assert_eq!(cfg.build().fill_size(100.0, 1.0, &bar(2.0, 1.0, 10.0)), 5.0);
    }
}
