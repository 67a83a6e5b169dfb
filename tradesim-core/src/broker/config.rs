//! Broker configuration.

use super::filler::FillerConfig;
use super::slippage::SlippageConfig;
use serde::{Deserialize, Serialize};

/// Static broker parameters, fixed for the life of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Starting cash.
    pub cash: f64,
    /// Pseudo-execute newly submitted orders against cash before accepting.
    pub checksubmit: bool,
    pub slippage: SlippageConfig,
    /// Cheat-on-close: market orders fill at the close of their creation bar.
    pub coc: bool,
    /// Cheat-on-open: market orders fill at the open of the bar they were
    /// created on (orders must be placed before the broker settles the bar).
    pub coo: bool,
    /// Charge accrued interest as commission on the next closing execution.
    pub int2pnl: bool,
    /// Short stock-like positions credit cash and carry negative value.
    pub shortcash: bool,
    /// Report performance as net asset value per fund share.
    pub fundmode: bool,
    /// Initial value of one fund share.
    pub fundstartval: f64,
    /// Volume-limited fills. `None` fills the whole remaining size.
    pub filler: Option<FillerConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            cash: 10_000.0,
            checksubmit: true,
            slippage: SlippageConfig::default(),
            coc: false,
            coo: false,
            int2pnl: true,
            shortcash: true,
            fundmode: false,
            fundstartval: 100.0,
            filler: None,
        }
    }
}

impl BrokerConfig {
    pub fn with_cash(cash: f64) -> Self {
        Self {
            cash,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.cash.is_finite() || self.cash < 0.0 {
            return Err(format!("cash must be a non-negative number, got {}", self.cash));
        }
        if self.fundstartval.is_nan() || self.fundstartval <= 0.0 {
            return Err(format!("fundstartval must be positive, got {}", self.fundstartval));
        }
        if self.slippage.perc < 0.0 || self.slippage.fixed < 0.0 {
            return Err("slippage must not be negative".into());
        }
        Ok(())
    }
}
