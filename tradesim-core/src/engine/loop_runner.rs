//! The synchronization loop.
//!
//! Per poll:
//! 1. Every stream is asked for its next bar.
//! 2. The row time is the earliest delivered timestamp; streams ahead of it
//!    are rewound and offered again on the next poll.
//! 3. The broker settles the row, then the strategy sees it.

use super::config::EngineConfig;
use super::result::RunResult;
use super::strategy::{Strategy, StrategyContext};
use super::sync::{partition, row_time, Candidate};
use crate::broker::{BarSet, Broker, MarketBar};
use crate::error::EngineError;
use crate::feed::{BarStream, StreamStatus};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Owns one broker and the streams feeding it.
pub struct Engine {
    broker: Broker,
    streams: Vec<Box<dyn BarStream>>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(broker: Broker) -> Self {
        Self {
            broker,
            streams: Vec::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_stream(mut self, stream: impl BarStream + 'static) -> Self {
        self.add_stream(stream);
        self
    }

    pub fn add_stream(&mut self, stream: impl BarStream + 'static) {
        self.streams.push(Box::new(stream));
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    pub fn streams(&self) -> &[Box<dyn BarStream>] {
        &self.streams
    }

    fn validate(&self) -> Result<(), EngineError> {
        if self.streams.is_empty() {
            return Err(EngineError::NoStreams);
        }
        let mut seen = HashSet::new();
        for stream in &self.streams {
            if !seen.insert(stream.name()) {
                return Err(EngineError::DuplicateStream(stream.name().to_string()));
            }
        }
        self.config.validate().map_err(EngineError::InvalidConfig)?;
        self.broker.config().validate().map_err(EngineError::InvalidConfig)?;
        Ok(())
    }

    /// Runs until every stream is exhausted.
    ///
    /// Configuration problems are reported before any row is processed.
    pub fn run(&mut self, strategy: &mut dyn Strategy) -> Result<RunResult, EngineError> {
        self.validate()?;
        info!(
            streams = self.streams.len(),
            cash = self.broker.cash(),
            cheat_on_open = self.config.cheat_on_open,
            "run started"
        );

        let mut result = RunResult::new();
        let rs_only = self.streams.iter().filter(|s| s.is_resample_only()).count();
        let mixed = rs_only > 0 && rs_only < self.streams.len();

        {
            let mut ctx = StrategyContext::new(&mut self.broker, &self.streams, None);
            strategy.start(&mut ctx);
        }

        let mut idle = 0usize;
        loop {
            let statuses: Vec<StreamStatus> = self.streams.iter_mut().map(|s| s.next()).collect();
            if statuses.iter().all(|s| *s == StreamStatus::Exhausted) {
                break;
            }

            let delivered: Vec<Candidate> = statuses
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == StreamStatus::Delivered)
                .filter_map(|(index, _)| {
                    let stream = &self.streams[index];
                    stream.current().map(|bar| Candidate {
                        index,
                        dt: bar.timestamp,
                        resample_only: stream.is_resample_only(),
                    })
                })
                .collect();

            let Some(dt0) = row_time(&delivered, mixed) else {
                if self.streams.iter().any(|s| s.consumed_input()) {
                    idle = 0;
                    continue;
                }
                idle += 1;
                if idle >= self.config.max_idle_polls {
                    warn!(polls = idle, "no stream delivered, stopping run");
                    break;
                }
                continue;
            };
            idle = 0;

            let (joined, ahead) = partition(&delivered, dt0);
            for index in ahead {
                self.streams[index].rewind();
            }
            let row = self.assemble(dt0, &joined);
            result.iterations += 1;
            debug!(dt = %dt0, streams = joined.len(), "row");

            // ─── Cheat-on-open ───
            if self.config.cheat_on_open {
                let mut ctx = StrategyContext::new(&mut self.broker, &self.streams, Some(&row));
                strategy.next_open(&mut ctx);
            }

            // ─── Settlement ───
            self.broker.tick(&row);

            // ─── Strategy ───
            let mut ctx = StrategyContext::new(&mut self.broker, &self.streams, Some(&row));
            while let Some(note) = ctx.broker_mut().next_notification() {
                result.record(&note);
                strategy.notify_order(&mut ctx, &note);
            }
            strategy.next(&mut ctx);

            result.snapshots.push(self.broker.snapshot());
        }

        let mut ctx = StrategyContext::new(&mut self.broker, &self.streams, None);
        while let Some(note) = ctx.broker_mut().next_notification() {
            result.record(&note);
            strategy.notify_order(&mut ctx, &note);
        }
        strategy.stop(&mut ctx);
        // Orders placed in stop() still report their submission.
        for note in self.broker.notifications() {
            result.record(&note);
        }

        result.positions = self.broker.positions().clone();
        info!(
            iterations = result.iterations,
            fills = result.fills.len(),
            value = self.broker.value(),
            "run finished"
        );
        Ok(result)
    }

    fn assemble(&self, dt: chrono::NaiveDateTime, joined: &[usize]) -> BarSet {
        let mut row = BarSet::new(dt);
        for &index in joined {
            let stream = &self.streams[index];
            if let Some(bar) = stream.current() {
                row.insert(
                    stream.name(),
                    MarketBar {
                        bar: *bar,
                        tick: stream.tick().copied(),
                    },
                );
            }
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::BrokerConfig;
    use crate::domain::{Bar, OrderStatus};
    use crate::feed::VecFeed;
    use chrono::{NaiveDate, NaiveDateTime};

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn daily(days: &[u32], price: f64) -> Vec<Bar> {
        days.iter()
            .map(|&d| Bar::new(day(d), price, price + 1.0, price - 1.0, price, 100.0))
            .collect()
    }

    struct Noop;

    impl Strategy for Noop {
        fn next(&mut self, _ctx: &mut StrategyContext<'_>) {}
    }

    struct BuyOnce {
        done: bool,
    }

    impl Strategy for BuyOnce {
        fn next(&mut self, ctx: &mut StrategyContext<'_>) {
            if !self.done {
                ctx.buy("a", 10.0);
                self.done = true;
            }
        }
    }

    #[test]
    fn no_streams_is_fatal() {
        let mut engine = Engine::new(Broker::new(BrokerConfig::default()));
        assert_eq!(engine.run(&mut Noop).unwrap_err(), EngineError::NoStreams);
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let mut engine = Engine::new(Broker::new(BrokerConfig::default()))
            .with_stream(VecFeed::daily("a", daily(&[2], 10.0)))
            .with_stream(VecFeed::daily("a", daily(&[3], 10.0)));
        assert_eq!(
            engine.run(&mut Noop).unwrap_err(),
            EngineError::DuplicateStream("a".into())
        );
    }

    #[test]
    fn invalid_config_aborts_before_any_row() {
        let mut engine = Engine::new(Broker::new(BrokerConfig::with_cash(-5.0)))
            .with_stream(VecFeed::daily("a", daily(&[2], 10.0)));
        assert!(matches!(engine.run(&mut Noop), Err(EngineError::InvalidConfig(_))));
        assert_eq!(engine.streams()[0].len(), 0);
    }

    #[test]
    fn streams_advance_in_lock_step() {
        let mut engine = Engine::new(Broker::new(BrokerConfig::default()))
            .with_stream(VecFeed::daily("a", daily(&[2, 3, 4], 10.0)))
            .with_stream(VecFeed::daily("b", daily(&[3], 20.0)));
        let result = engine.run(&mut Noop).unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(engine.streams()[0].len(), 3);
        assert_eq!(engine.streams()[1].len(), 1);
        let dts: Vec<_> = result.snapshots.iter().map(|s| s.dt.unwrap()).collect();
        assert_eq!(dts, vec![day(2), day(3), day(4)]);
    }

    #[test]
    fn market_order_fills_on_the_following_row() {
        let mut engine = Engine::new(Broker::new(BrokerConfig::default()))
            .with_stream(VecFeed::daily("a", daily(&[2, 3], 10.0)));
        let result = engine.run(&mut BuyOnce { done: false }).unwrap();
        assert_eq!(result.fills.len(), 1);
        assert_eq!(result.fills[0].timestamp, day(3));
        assert_eq!(result.positions["a"].size, 10.0);
        let last = result.notifications.last().unwrap();
        assert_eq!(last.status(), OrderStatus::Completed);
    }
}
