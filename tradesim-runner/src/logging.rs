//! Tracing subscriber setup for simulation runs.
//!
//! The core library only emits events; binaries and test harnesses call
//! [`init_tracing`] once to see them. Filtering follows `RUST_LOG`
//! (e.g. `RUST_LOG=tradesim_core::broker=debug`) and falls back to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// With `json` every event is one JSON object per line, otherwise the
/// human-readable pretty format is used. Returns `false` when a global
/// subscriber was already installed, in which case nothing changes.
pub fn init_tracing(json: bool) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());

    let installed = if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true);
        registry.with(layer).try_init()
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false);
        registry.with(layer).try_init()
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_a_noop() {
        // The first call may lose to another test that installed a subscriber.
        let _ = init_tracing(true);
        assert!(!init_tracing(false));
        tracing::info!(target: "tradesim_runner", "subscriber installed");
    }
}
