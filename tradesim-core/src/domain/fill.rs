use crate::domain::ids::OrderId;
use crate::domain::order::{ExecutionBit, Order, OrderSide};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fill record, one per execution slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub timestamp: NaiveDateTime,
    pub instrument: String,
    pub side: OrderSide,
    pub price: f64,
    /// Signed size of the slice.
    pub size: f64,
    pub commission: f64,
    /// Realized pnl of the closing part of the slice.
    pub pnl: f64,
}

impl Fill {
    pub fn from_bit(order: &Order, bit: &ExecutionBit) -> Self {
        Self {
            order_id: order.id,
            timestamp: bit.dt,
            instrument: order.instrument.clone(),
            side: order.side,
            price: bit.price,
            size: bit.size,
            commission: bit.comm(),
            pnl: bit.pnl,
        }
    }
}
