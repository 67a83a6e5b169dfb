use crate::broker::AccountSnapshot;
use crate::domain::{Fill, NotificationReason, OrderNotification, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Account state after each row.
    pub snapshots: Vec<AccountSnapshot>,
    /// Every notification in emission order.
    pub notifications: Vec<OrderNotification>,
    /// One record per execution slice.
    pub fills: Vec<Fill>,
    /// Final positions, flat ones included.
    pub positions: BTreeMap<String, Position>,
    /// Rows processed.
    pub iterations: usize,
}

impl RunResult {
    pub(crate) fn new() -> Self {
        Self {
            snapshots: Vec::new(),
            notifications: Vec::new(),
            fills: Vec::new(),
            positions: BTreeMap::new(),
            iterations: 0,
        }
    }

    pub(crate) fn record(&mut self, note: &OrderNotification) {
        if note.reason == NotificationReason::Executed {
            if let Some(bit) = note.last_fill() {
                self.fills.push(Fill::from_bit(&note.order, bit));
            }
        }
        self.notifications.push(note.clone());
    }

    pub fn final_value(&self) -> Option<f64> {
        self.snapshots.last().map(|s| s.value)
    }

    pub fn final_cash(&self) -> Option<f64> {
        self.snapshots.last().map(|s| s.cash)
    }

    /// Value after each row.
    pub fn value_curve(&self) -> Vec<f64> {
        self.snapshots.iter().map(|s| s.value).collect()
    }
}
