use super::CommissionScheme;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// Commission is a fraction of the operation's notional.
    Percentage,
    /// Commission is a fixed amount per unit.
    Fixed,
}

/// How margin per unit is derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "factor", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AutoMargin {
    /// Use the configured margin.
    #[default]
    Off,
    /// price × multiplier.
    Multiplier,
    /// price × factor.
    Factor(f64),
}

/// Declarative commission parameters, as written in configuration.
///
/// `commtype: None` keeps the legacy inference: a margin makes the
/// instrument a fixed-commission future, no margin a percentage stock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionSpec {
    pub commission: f64,
    pub mult: f64,
    pub margin: Option<f64>,
    pub commtype: Option<CommissionType>,
    pub stocklike: bool,
    /// Percentage commissions are given as 0.XX rather than XX%.
    pub percabs: bool,
    /// Yearly interest rate, e.g. 0.05 for 5%.
    pub interest: f64,
    pub interest_long: bool,
    pub leverage: f64,
    pub automargin: AutoMargin,
}

impl Default for CommissionSpec {
    fn default() -> Self {
        Self {
            commission: 0.0,
            mult: 1.0,
            margin: None,
            commtype: None,
            stocklike: false,
            percabs: false,
            interest: 0.0,
            interest_long: false,
            leverage: 1.0,
            automargin: AutoMargin::Off,
        }
    }
}

/// The generic scheme: percentage or fixed commission on stock-like or
/// margined instruments.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionInfo {
    commission: f64,
    mult: f64,
    margin: f64,
    nominal_margin: Option<f64>,
    commtype: CommissionType,
    stocklike: bool,
    interest_long: bool,
    credit_rate: f64,
    leverage: f64,
    automargin: AutoMargin,
}

impl CommissionInfo {
    pub fn from_spec(spec: &CommissionSpec) -> Self {
        let has_margin = spec.margin.is_some_and(|m| m != 0.0);
        let (stocklike, commtype) = match spec.commtype {
            Some(commtype) => (spec.stocklike, commtype),
            None if has_margin => (false, CommissionType::Fixed),
            None => (true, CommissionType::Percentage),
        };
        let margin = match spec.margin {
            Some(m) if m != 0.0 => m,
            _ if !stocklike => 1.0,
            _ => 0.0,
        };
        let commission = if commtype == CommissionType::Percentage && !spec.percabs {
            spec.commission / 100.0
        } else {
            spec.commission
        };
        Self {
            commission,
            mult: spec.mult,
            margin,
            nominal_margin: spec.margin,
            commtype,
            stocklike,
            interest_long: spec.interest_long,
            credit_rate: spec.interest / 365.0,
            leverage: spec.leverage,
            automargin: spec.automargin,
        }
    }

    /// Stock-like with a percentage commission given as a fraction (0.001 = 0.1%).
    pub fn stock(commission: f64) -> Self {
        Self::from_spec(&CommissionSpec {
            commission,
            percabs: true,
            ..CommissionSpec::default()
        })
    }

    /// Margined future with a fixed per-contract commission.
    pub fn futures(commission: f64, margin: f64, mult: f64) -> Self {
        Self::from_spec(&CommissionSpec {
            commission,
            margin: Some(margin),
            mult,
            ..CommissionSpec::default()
        })
    }

    pub fn commission_type(&self) -> CommissionType {
        self.commtype
    }

    /// Commission rate after percentage normalisation.
    pub fn rate(&self) -> f64 {
        self.commission
    }
}

impl Default for CommissionInfo {
    fn default() -> Self {
        Self::from_spec(&CommissionSpec::default())
    }
}

impl CommissionScheme for CommissionInfo {
    fn stocklike(&self) -> bool {
        self.stocklike
    }

    fn multiplier(&self) -> f64 {
        self.mult
    }

    fn leverage(&self) -> f64 {
        self.leverage
    }

    fn margin(&self, price: f64) -> f64 {
        match self.automargin {
            AutoMargin::Off => self.margin,
            AutoMargin::Multiplier => price * self.mult,
            AutoMargin::Factor(factor) => price * factor,
        }
    }

    fn nominal_margin(&self) -> Option<f64> {
        self.nominal_margin
    }

    fn commission(&self, size: f64, price: f64) -> f64 {
        match self.commtype {
            CommissionType::Percentage => size.abs() * self.commission * price,
            CommissionType::Fixed => size.abs() * self.commission,
        }
    }

    fn daily_credit_rate(&self) -> f64 {
        self.credit_rate
    }

    fn charges_long_interest(&self) -> bool {
        self.interest_long
    }
}
