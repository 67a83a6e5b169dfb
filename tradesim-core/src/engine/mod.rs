//! Orchestrator: synchronizes bar streams, settles the broker once per row and
//! then drives the strategy.
//!
//! Order of work on every row:
//!
//! 1. `next_open` (cheat-on-open only)
//! 2. broker settlement
//! 3. `notify_order` for each pending notification
//! 4. `next`
//! 5. account snapshot

pub mod config;
pub mod loop_runner;
pub mod result;
pub mod strategy;
mod sync;

pub use crate::broker::AccountSnapshot;
pub use config::EngineConfig;
pub use loop_runner::Engine;
pub use result::RunResult;
pub use strategy::{Strategy, StrategyContext};
