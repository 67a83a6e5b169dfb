//! Tradesim Runner: run configuration, logging setup and parameter sweeps.
//!
//! This crate builds on `tradesim-core` to provide:
//! - TOML run configuration with content-addressed run ids
//! - Broker and engine construction from a configuration
//! - `tracing` subscriber initialisation
//! - Parallel sweeps over independent simulations

pub mod config;
pub mod logging;
pub mod sweep;

pub use config::{
    AggregationMode, CalendarConfig, ConfigError, DerivedStream, RunConfig, RunId, SessionOverride,
};
pub use logging::init_tracing;
pub use sweep::{run_one, run_sweep, ParamGrid, SweepEntry, SweepResults};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn run_config_is_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
    }

    #[test]
    fn sweep_results_are_send_sync() {
        assert_send::<SweepResults>();
        assert_sync::<SweepResults>();
        assert_send::<ConfigError>();
        assert_sync::<ConfigError>();
    }
}
