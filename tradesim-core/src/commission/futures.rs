use super::{CommissionScheme, CommissionType};
use serde::{Deserialize, Serialize};

/// Margined future whose margin is a fraction of the contract notional
/// (`price × mult × margin_rate`) and whose percentage commission is charged
/// on that notional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesCommission {
    pub commission: f64,
    pub mult: f64,
    pub margin_rate: f64,
    pub commtype: CommissionType,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
}

fn default_leverage() -> f64 {
    1.0
}

impl FuturesCommission {
    pub fn percent(commission: f64, mult: f64, margin_rate: f64) -> Self {
        Self {
            commission,
            mult,
            margin_rate,
            commtype: CommissionType::Percentage,
            leverage: 1.0,
        }
    }

    pub fn fixed(commission: f64, mult: f64, margin_rate: f64) -> Self {
        Self {
            commtype: CommissionType::Fixed,
            ..Self::percent(commission, mult, margin_rate)
        }
    }
}

impl CommissionScheme for FuturesCommission {
    fn stocklike(&self) -> bool {
        false
    }

    fn multiplier(&self) -> f64 {
        self.mult
    }

    fn leverage(&self) -> f64 {
        self.leverage
    }

    fn margin(&self, price: f64) -> f64 {
        price * self.mult * self.margin_rate
    }

    fn nominal_margin(&self) -> Option<f64> {
        Some(self.margin_rate)
    }

    fn commission(&self, size: f64, price: f64) -> f64 {
        match self.commtype {
            CommissionType::Percentage => size.abs() * price * self.mult * self.commission,
            CommissionType::Fixed => size.abs() * self.commission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_scales_with_notional() {
        let fut = FuturesCommission::percent(0.0005, 10.0, 0.1);
        assert!((fut.margin(3000.0) - 3000.0).abs() < 1e-9);
        assert!((fut.commission(-2.0, 3000.0) - 30.0).abs() < 1e-9);
        assert!((fut.operation_cost(2.0, 3000.0) - 6000.0).abs() < 1e-9);
    }

    #[test]
    fn fixed_charges_per_contract() {
        let fut = FuturesCommission::fixed(2.5, 10.0, 0.1);
        assert_eq!(fut.commission(4.0, 3000.0), 10.0);
        assert_eq!(fut.cash_adjust(-1.0, 3000.0, 2990.0), 100.0);
    }
}
