//! Serializable run configuration.
//!
//! A [`RunConfig`] captures everything needed to reproduce one simulation
//! apart from the bars themselves and the strategy code: broker settings,
//! commission schemes, the trading calendar, engine options, derived
//! (resampled or replayed) streams and free-form strategy parameters.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use tradesim_core::broker::{Broker, BrokerConfig};
use tradesim_core::calendar::{TradingCalendar, WeekdayCalendar};
use tradesim_core::commission::{CommissionInfo, CommissionRegistry, CommissionSpec};
use tradesim_core::engine::{Engine, EngineConfig};
use tradesim_core::feed::{BarStream, ReplayedFeed, ResampledFeed, VecFeed};
use tradesim_core::resample::ResampleConfig;

/// Content-addressable identifier of a run (hex blake3 digest).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Session hours, holidays and shortened days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub holidays: BTreeSet<NaiveDate>,
    pub early_days: Vec<SessionOverride>,
    pub off_days: Vec<Weekday>,
}

/// Non-regular hours for a single date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionOverride {
    pub date: NaiveDate,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        let base = WeekdayCalendar::default();
        Self {
            open: base.open,
            close: base.close,
            holidays: base.holidays,
            early_days: Vec::new(),
            off_days: base.off_days,
        }
    }
}

impl CalendarConfig {
    pub fn build(&self) -> WeekdayCalendar {
        let mut calendar = WeekdayCalendar::with_hours(self.open, self.close)
            .with_holidays(self.holidays.iter().copied());
        calendar.off_days = self.off_days.clone();
        for day in &self.early_days {
            calendar = calendar.with_early_day(day.date, day.open, day.close);
        }
        calendar
    }

    fn validate(&self) -> Result<(), String> {
        if self.open >= self.close {
            return Err(format!("calendar open {} is not before close {}", self.open, self.close));
        }
        if let Some(day) = self.early_days.iter().find(|d| d.open >= d.close) {
            return Err(format!("session override on {} opens after it closes", day.date));
        }
        if self.off_days.len() >= 7 {
            return Err("calendar has no trading weekdays".into());
        }
        Ok(())
    }
}

/// How a derived stream folds its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// One bar per completed period.
    #[default]
    Resample,
    /// The period's bar is updated by every source bar.
    Replay,
}

/// A stream built from one of the raw feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedStream {
    pub name: String,
    /// Name of the raw feed to aggregate.
    pub source: String,
    #[serde(default)]
    pub mode: AggregationMode,
    #[serde(default)]
    pub resample: ResampleConfig,
}

/// Complete, reproducible description of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Human-readable label. Part of the run id.
    pub name: String,
    pub broker: BrokerConfig,
    /// Scheme applied to instruments without an override.
    pub commission: CommissionSpec,
    /// Per-instrument overrides, keyed by stream name.
    pub commissions: BTreeMap<String, CommissionSpec>,
    pub calendar: CalendarConfig,
    pub engine: EngineConfig,
    pub streams: Vec<DerivedStream>,
    /// Strategy parameters, opaque to the runner.
    pub params: BTreeMap<String, serde_json::Value>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "run".into(),
            broker: BrokerConfig::default(),
            commission: CommissionSpec::default(),
            commissions: BTreeMap::new(),
            calendar: CalendarConfig::default(),
            engine: EngineConfig::default(),
            streams: Vec::new(),
            params: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    /// Computes a deterministic hash of this configuration.
    ///
    /// Two configs that serialize identically share a run id, so a sweep can
    /// run them once.
    pub fn run_id(&self) -> RunId {
        // Every map in the config is ordered, so the JSON form is canonical.
        let bytes = serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes());
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.broker.validate().map_err(ConfigError::Invalid)?;
        self.engine.validate().map_err(ConfigError::Invalid)?;
        self.calendar.validate().map_err(ConfigError::Invalid)?;
        for (key, spec) in std::iter::once(("default", &self.commission))
            .chain(self.commissions.iter().map(|(k, v)| (k.as_str(), v)))
        {
            if spec.mult <= 0.0 || !spec.mult.is_finite() {
                return Err(ConfigError::Invalid(format!("commission '{key}': mult must be positive")));
            }
            if spec.commission < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "commission '{key}': commission must not be negative"
                )));
            }
        }
        let mut names = BTreeSet::new();
        for stream in &self.streams {
            if !names.insert(stream.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate derived stream '{}'", stream.name)));
            }
            stream
                .resample
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("stream '{}': {e}", stream.name)))?;
        }
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(serde_json::Value::as_f64)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(serde_json::Value::as_u64)
    }

    pub fn commission_registry(&self) -> CommissionRegistry {
        let mut registry = CommissionRegistry::new(Box::new(CommissionInfo::from_spec(&self.commission)));
        for (instrument, spec) in &self.commissions {
            registry.insert(instrument.clone(), Box::new(CommissionInfo::from_spec(spec)));
        }
        registry
    }

    /// Broker with this config's cash, commissions and calendar.
    pub fn build_broker(&self) -> Result<Broker, ConfigError> {
        self.validate()?;
        let calendar: Arc<dyn TradingCalendar> = Arc::new(self.calendar.build());
        Ok(Broker::new(self.broker.clone())
            .with_commissions(self.commission_registry())
            .with_calendar(calendar))
    }

    /// Engine over `feeds` plus the derived streams, in declaration order.
    ///
    /// Derived streams aggregate their own copy of the source feed, so the raw
    /// feed stays available to the strategy.
    pub fn build_engine(&self, feeds: Vec<VecFeed>) -> Result<Engine, ConfigError> {
        let broker = self.build_broker()?;
        let calendar: Arc<dyn TradingCalendar> = Arc::new(self.calendar.build());

        let mut derived: Vec<Box<dyn BarStream>> = Vec::with_capacity(self.streams.len());
        for stream in &self.streams {
            let source = feeds
                .iter()
                .find(|f| f.name() == stream.source)
                .cloned()
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "stream '{}' aggregates unknown feed '{}'",
                        stream.name, stream.source
                    ))
                })?;
            let boxed: Box<dyn BarStream> = match stream.mode {
                AggregationMode::Resample => Box::new(
                    ResampledFeed::new(stream.name.clone(), Box::new(source), stream.resample.clone())
                        .with_calendar(Arc::clone(&calendar)),
                ),
                AggregationMode::Replay => Box::new(
                    ReplayedFeed::new(stream.name.clone(), Box::new(source), stream.resample.clone())
                        .with_calendar(Arc::clone(&calendar)),
                ),
            };
            derived.push(boxed);
        }

        let mut engine = Engine::new(broker).with_config(self.engine.clone());
        for feed in feeds {
            engine.add_stream(feed);
        }
        for stream in derived {
            engine.add_stream(stream);
        }
        Ok(engine)
    }
}
