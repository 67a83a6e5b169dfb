//! Order status-change events drained by strategies and observers.

use super::ids::OrderId;
use super::order::{ExecutionBit, Order, OrderStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an order changed status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationReason {
    Submitted,
    Accepted,
    /// A fill slice was applied (partial or complete).
    Executed,
    /// Cancelled on request.
    Cancelled,
    /// Cancelled because another member of its OCO group filled or died.
    OcoSibling(OrderId),
    /// Cancelled because its bracket group was torn down by this order.
    BracketCascade(OrderId),
    Expired,
    /// Cash could not cover the opening value plus commission.
    InsufficientMargin,
    /// The bracket parent is unknown or no longer able to execute.
    ParentUnavailable(OrderId),
    InvalidRequest(String),
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationReason::OcoSibling(id) => write!(f, "oco sibling {id}"),
            NotificationReason::BracketCascade(id) => write!(f, "bracket cascade from {id}"),
            NotificationReason::ParentUnavailable(id) => write!(f, "parent {id} unavailable"),
            NotificationReason::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Snapshot of an order taken at the moment its status changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderNotification {
    pub order: Order,
    pub reason: NotificationReason,
}

impl OrderNotification {
    pub fn id(&self) -> OrderId {
        self.order.id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    /// The slice that triggered an `Executed` notification.
    pub fn last_fill(&self) -> Option<&ExecutionBit> {
        match self.reason {
            NotificationReason::Executed => self.order.executed.bits.last(),
            _ => None,
        }
    }
}
