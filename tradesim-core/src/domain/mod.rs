//! Domain types shared by the broker, aggregators and orchestrator.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod notification;
pub mod order;
pub mod position;
pub mod timeframe;

pub use bar::Bar;
pub use fill::Fill;
pub use ids::{IdGen, OrderId};
pub use notification::{NotificationReason, OrderNotification};
pub use order::{
    CreationContext, ExecType, ExecutedState, ExecutionBit, Order, OrderData, OrderRequest,
    OrderSide, OrderStatus, Trail, Validity,
};
pub use position::{Position, PositionUpdate};
pub use timeframe::TimeFrame;
