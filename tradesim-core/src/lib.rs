//! TradeSim Core: simulated broker, stream synchronization, timeframe aggregation.
//!
//! - Domain types (bars, orders, positions, fills, notifications)
//! - Commission, margin and interest pricing with a per-instrument registry
//! - Trading calendars for session ends and period edges
//! - The broker: order state machine, matching per execution type, brackets
//!   and OCO groups, cash and fund accounting
//! - Resampling and replay of bars into coarser timeframes
//! - Bar streams and the orchestrator that advances them in lock-step

pub mod broker;
pub mod calendar;
pub mod commission;
pub mod domain;
pub mod engine;
pub mod error;
pub mod feed;
pub mod resample;

pub use broker::{AccountSnapshot, BarSet, Broker, BrokerConfig};
pub use engine::{Engine, EngineConfig, RunResult, Strategy, StrategyContext};
pub use error::EngineError;
