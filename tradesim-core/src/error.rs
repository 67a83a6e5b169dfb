//! Fatal configuration errors, detected before the first tick.
//!
//! Per-order failures never surface here; they end as rejected or cancelled
//! orders with a notification.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no bar streams were added to the engine")]
    NoStreams,

    #[error("duplicate stream name '{0}'")]
    DuplicateStream(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
