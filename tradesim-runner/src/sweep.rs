//! Parameter sweeps over independent simulations.
//!
//! Each configuration gets its own broker, streams and strategy instance, so
//! runs share no mutable state and can execute on the rayon pool. Nothing is
//! parallelised inside a single run.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use tradesim_core::engine::{RunResult, Strategy};
use tradesim_core::feed::VecFeed;

use crate::config::{RunConfig, RunId};

/// Cartesian grid over strategy parameters.
///
/// Axes are applied to [`RunConfig::params`]; every other field comes from
/// the base configuration.
#[derive(Debug, Clone, Default)]
pub struct ParamGrid {
    axes: BTreeMap<String, Vec<serde_json::Value>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis<V: Into<serde_json::Value>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.axes
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Number of configurations the grid expands to.
    pub fn size(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.values().map(Vec::len).product()
    }

    pub fn generate_configs(&self, base: &RunConfig) -> Vec<RunConfig> {
        if self.axes.is_empty() {
            return Vec::new();
        }
        let mut configs = vec![base.clone()];
        for (key, values) in &self.axes {
            configs = configs
                .into_iter()
                .flat_map(|config| {
                    values
                        .iter()
                        .map(move |value| config.clone().with_param(key.clone(), value.clone()))
                })
                .collect();
        }
        configs
    }
}

/// One finished run and the configuration that produced it.
#[derive(Debug, Clone)]
pub struct SweepEntry {
    pub run_id: RunId,
    pub config: RunConfig,
    pub result: RunResult,
}

/// Results of a sweep, keyed by run id.
#[derive(Debug, Default)]
pub struct SweepResults {
    by_run_id: BTreeMap<RunId, SweepEntry>,
}

impl SweepResults {
    pub fn len(&self) -> usize {
        self.by_run_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_run_id.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&SweepEntry> {
        self.by_run_id.get(run_id)
    }

    /// Entries in run id order.
    pub fn iter(&self) -> impl Iterator<Item = &SweepEntry> {
        self.by_run_id.values()
    }

    /// Entries sorted by final account value, highest first. Runs that
    /// processed no rows sort last.
    pub fn ranked_by_final_value(&self) -> Vec<&SweepEntry> {
        let mut ranked: Vec<_> = self.by_run_id.values().collect();
        ranked.sort_by(|a, b| {
            let a = a.result.final_value().unwrap_or(f64::NEG_INFINITY);
            let b = b.result.final_value().unwrap_or(f64::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked
    }

    pub fn best(&self) -> Option<&SweepEntry> {
        self.ranked_by_final_value().into_iter().next()
    }

    pub fn into_map(self) -> BTreeMap<RunId, SweepEntry> {
        self.by_run_id
    }
}

/// Build the engine described by `config` over `feeds` and run `strategy`.
pub fn run_one(config: &RunConfig, feeds: Vec<VecFeed>, strategy: &mut dyn Strategy) -> Result<RunResult> {
    let mut engine = config
        .build_engine(feeds)
        .with_context(|| format!("building engine for run '{}'", config.name))?;
    let result = engine
        .run(strategy)
        .with_context(|| format!("running '{}'", config.name))?;
    Ok(result)
}

/// Run every configuration on the rayon pool.
///
/// `feeds_factory` supplies fresh raw feeds for a configuration and
/// `strategy_factory` a fresh strategy. Configurations with the same run id
/// are executed once. The first failing run aborts the sweep.
pub fn run_sweep<F, S>(configs: &[RunConfig], feeds_factory: F, strategy_factory: S) -> Result<SweepResults>
where
    F: Fn(&RunConfig) -> Result<Vec<VecFeed>> + Sync,
    S: Fn(&RunConfig) -> Box<dyn Strategy> + Sync,
{
    let mut seen = BTreeSet::new();
    let unique: Vec<(RunId, &RunConfig)> = configs
        .iter()
        .map(|config| (config.run_id(), config))
        .filter(|(id, _)| seen.insert(id.clone()))
        .collect();
    info!(
        requested = configs.len(),
        unique = unique.len(),
        "starting sweep"
    );

    let entries = unique
        .par_iter()
        .map(|(run_id, config)| {
            let feeds = feeds_factory(config)
                .with_context(|| format!("loading feeds for run '{}' ({run_id})", config.name))?;
            let mut strategy = strategy_factory(config);
            let result = run_one(config, feeds, strategy.as_mut())?;
            debug!(
                run_id = %run_id,
                name = %config.name,
                iterations = result.iterations,
                final_value = result.final_value(),
                "run finished"
            );
            Ok(SweepEntry {
                run_id: run_id.clone(),
                config: (*config).clone(),
                result,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    info!(runs = entries.len(), "sweep finished");
    Ok(SweepResults {
        by_run_id: entries.into_iter().map(|e| (e.run_id.clone(), e)).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_size_is_the_product_of_axes() {
        let grid = ParamGrid::new().axis("fast", [5, 10]).axis("slow", [20, 50, 100]);
        assert_eq!(grid.size(), 6);
        assert_eq!(ParamGrid::new().size(), 0);
    }

    #[test]
    fn generated_configs_cover_every_combination() {
        let grid = ParamGrid::new().axis("fast", [5, 10]).axis("slow", [20, 50]);
        let configs = grid.generate_configs(&RunConfig::default());
        assert_eq!(configs.len(), 4);

        let pairs: BTreeSet<(u64, u64)> = configs
            .iter()
            .map(|c| (c.param_u64("fast").unwrap(), c.param_u64("slow").unwrap()))
            .collect();
        assert_eq!(pairs.len(), 4);
        assert!(pairs.contains(&(10, 20)));

        let ids: BTreeSet<RunId> = configs.iter().map(RunConfig::run_id).collect();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn empty_results_have_no_best() {
        let results = SweepResults::default();
        assert!(results.is_empty());
        assert!(results.best().is_none());
    }
}
