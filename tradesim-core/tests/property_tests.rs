//! Property tests for broker, aggregation and synchronization invariants.
//!
//! Uses proptest to verify:
//! 1. Accounting: value == cash + sum of position contributions after every tick
//! 2. Limit fills: a buy limit inside the bar range fills exactly at the limit;
//!    a sell limit above the high never fills
//! 3. OCO: at most one member of a group ever executes
//! 4. Resampling N one-minute bars gives first open, max high, min low,
//!    last close and summed volume
//! 5. Synchronization: every stream in a row carries the row timestamp and no
//!    bar is skipped

use chrono::{Duration, NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use std::collections::BTreeSet;
use tradesim_core::broker::{BarSet, Broker, BrokerConfig};
use tradesim_core::domain::{Bar, OrderRequest, OrderSide, OrderStatus, TimeFrame};
use tradesim_core::engine::{Engine, Strategy as EngineStrategy, StrategyContext};
use tradesim_core::feed::VecFeed;
use tradesim_core::resample::{ResampleConfig, Resampler};

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn bar_at(dt: NaiveDateTime, open: f64, spread_up: f64, spread_down: f64, close_frac: f64) -> Bar {
    let high = open + spread_up;
    let low = open - spread_down;
    let close = low + (high - low) * close_frac;
    Bar::new(dt, open, high, low, close, 100.0)
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (20.0..200.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_bar_shape() -> impl Strategy<Value = (f64, f64, f64, f64)> {
    (arb_price(), 0.0..5.0_f64, 0.0..5.0_f64, 0.0..=1.0_f64)
}

fn arb_action() -> impl Strategy<Value = i32> {
    -20i32..=20
}

// ── 1. Accounting ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn value_is_cash_plus_positions(
        steps in prop::collection::vec((arb_bar_shape(), arb_action()), 1..40),
        shortcash in any::<bool>(),
    ) {
        let config = BrokerConfig { cash: 1_000_000.0, shortcash, ..BrokerConfig::default() };
        let mut broker = Broker::new(config);
        for (i, ((open, up, down, frac), action)) in steps.into_iter().enumerate() {
            let dt = base() + Duration::days(i as i64);
            broker.tick(&BarSet::single("X", bar_at(dt, open, up, down, frac)));

            let held: Vec<&str> = broker.positions().keys().map(|k| k.as_str()).collect();
            let expected = broker.cash() + broker.value_of(&held);
            prop_assert!((broker.value() - expected).abs() < 1e-6);

            match action.signum() {
                1 => { broker.submit(OrderRequest::buy("X", f64::from(action))); }
                -1 => { broker.submit(OrderRequest::sell("X", f64::from(-action))); }
                _ => {}
            }
        }
    }
}

// ── 2. Limit fills ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn buy_limit_inside_range_fills_at_limit(
        (open, up, down, frac) in arb_bar_shape(),
        pos in 0.0..=1.0_f64,
    ) {
        let signal = bar_at(base(), open, 1.0, 1.0, 0.5);
        let bar = bar_at(base() + Duration::days(1), open, up, down, frac);
        let limit = bar.low + (bar.high - bar.low) * pos;

        let mut broker = Broker::new(BrokerConfig::with_cash(1_000_000.0));
        broker.tick(&BarSet::single("X", signal));
        let id = broker.submit(OrderRequest::limit("X", OrderSide::Buy, 1.0, limit));
        broker.tick(&BarSet::single("X", bar));

        let order = broker.order(id).unwrap();
        prop_assert_eq!(order.status, OrderStatus::Completed);
        prop_assert!((order.executed.price - limit).abs() < 1e-9);
    }

    #[test]
    fn sell_limit_above_high_never_fills(
        (open, up, down, frac) in arb_bar_shape(),
        gap in 0.01..50.0_f64,
    ) {
        let signal = bar_at(base(), open, 1.0, 1.0, 0.5);
        let bar = bar_at(base() + Duration::days(1), open, up, down, frac);
        let limit = bar.high + gap;

        let mut broker = Broker::new(BrokerConfig::with_cash(1_000_000.0));
        broker.tick(&BarSet::single("X", signal));
        let id = broker.submit(OrderRequest::limit("X", OrderSide::Sell, 1.0, limit));
        broker.tick(&BarSet::single("X", bar));

        let order = broker.order(id).unwrap();
        prop_assert!(order.is_alive());
        prop_assert_eq!(order.executed.size, 0.0);
    }
}

// ── 3. OCO ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn at_most_one_oco_member_executes(
        bars in prop::collection::vec(arb_bar_shape(), 1..10),
        below in 0.5..10.0_f64,
        above in 0.5..10.0_f64,
    ) {
        let mut broker = Broker::new(BrokerConfig::with_cash(1_000_000.0));
        broker.tick(&BarSet::single("X", bar_at(base(), 100.0, 1.0, 1.0, 0.5)));
        let a = broker.submit(OrderRequest::limit("X", OrderSide::Buy, 1.0, 100.0 - below));
        let b = broker.submit(OrderRequest::stop("X", OrderSide::Buy, 1.0, 100.0 + above).with_oco(a));

        for (i, (open, up, down, frac)) in bars.into_iter().enumerate() {
            let dt = base() + Duration::days(i as i64 + 1);
            broker.tick(&BarSet::single("X", bar_at(dt, open, up, down, frac)));
            let executed = [a, b]
                .iter()
                .filter(|id| broker.order(**id).unwrap().executed.size != 0.0)
                .count();
            prop_assert!(executed <= 1);
        }
    }
}

// ── 4. Resampling ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn n_minutes_fold_into_one_bar(
        shapes in prop::collection::vec((arb_bar_shape(), 1.0..1_000.0_f64), 1..60),
    ) {
        let n = shapes.len();
        let src: Vec<Bar> = shapes
            .iter()
            .enumerate()
            .map(|(i, ((open, up, down, frac), vol))| {
                let mut bar = bar_at(base() + Duration::minutes(i as i64 + 1), *open, *up, *down, *frac);
                bar.volume = *vol;
                bar
            })
            .collect();

        let cfg = ResampleConfig::new(TimeFrame::Minutes, n as u32);
        let mut rs = Resampler::new(cfg, TimeFrame::Minutes, 1);
        let out: Vec<Bar> = src.iter().filter_map(|b| rs.push(b)).collect();
        prop_assert_eq!(out.len(), 1);
        let bar = out[0];

        let high = src.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = src.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        let volume: f64 = src.iter().map(|b| b.volume).sum();
        prop_assert_eq!(bar.open, src[0].open);
        prop_assert_eq!(bar.high, high);
        prop_assert_eq!(bar.low, low);
        prop_assert_eq!(bar.close, src[n - 1].close);
        prop_assert!((bar.volume - volume).abs() < 1e-6);
        prop_assert_eq!(bar.timestamp, src[n - 1].timestamp);
    }
}

// ── 5. Synchronization ───────────────────────────────────────────────

#[derive(Default)]
struct Rows {
    ok: bool,
    rows: usize,
}

impl EngineStrategy for Rows {
    fn start(&mut self, _ctx: &mut StrategyContext<'_>) {
        self.ok = true;
    }

    fn next(&mut self, ctx: &mut StrategyContext<'_>) {
        self.rows += 1;
        if let Some(row) = ctx.row() {
            self.ok &= row.bars.values().all(|mb| mb.bar.timestamp == row.dt);
        }
    }
}

fn feed(name: &str, minutes: &BTreeSet<u32>) -> VecFeed {
    let bars = minutes
        .iter()
        .map(|&m| bar_at(base() + Duration::minutes(i64::from(m)), 100.0, 1.0, 1.0, 0.5))
        .collect();
    VecFeed::minutes(name, 1, bars)
}

proptest! {
    #[test]
    fn rows_are_synchronized(
        a in prop::collection::btree_set(0u32..300, 1..40),
        b in prop::collection::btree_set(0u32..300, 1..40),
    ) {
        let mut engine = Engine::new(Broker::new(BrokerConfig::default()))
            .with_stream(feed("a", &a))
            .with_stream(feed("b", &b));
        let mut rows = Rows::default();
        let result = engine.run(&mut rows).unwrap();

        let union: BTreeSet<u32> = a.union(&b).copied().collect();
        prop_assert!(rows.ok);
        prop_assert_eq!(rows.rows, union.len());
        prop_assert_eq!(result.iterations, union.len());
        prop_assert_eq!(engine.streams()[0].len(), a.len());
        prop_assert_eq!(engine.streams()[1].len(), b.len());
    }
}
