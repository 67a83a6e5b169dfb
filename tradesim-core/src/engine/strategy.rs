//! Strategy callbacks and the view they get of the run.

use crate::broker::{BarSet, BracketIds, BracketRequest, Broker};
use crate::domain::{Bar, OrderId, OrderNotification, OrderRequest, Position};
use crate::feed::BarStream;
use chrono::NaiveDateTime;

/// Decision logic driven by the engine.
///
/// Per row the engine calls `next_open` (only with cheat-on-open), settles
/// the broker, hands every pending notification to `notify_order`, then calls
/// `next`. Orders placed in any callback are matched from the next settlement
/// on.
pub trait Strategy {
    fn start(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn next_open(&mut self, _ctx: &mut StrategyContext<'_>) {}

    fn notify_order(&mut self, _ctx: &mut StrategyContext<'_>, _note: &OrderNotification) {}

    fn next(&mut self, ctx: &mut StrategyContext<'_>);

    fn stop(&mut self, _ctx: &mut StrategyContext<'_>) {}
}

/// Access to the broker and the streams during a callback.
pub struct StrategyContext<'a> {
    broker: &'a mut Broker,
    streams: &'a [Box<dyn BarStream>],
    row: Option<&'a BarSet>,
}

impl<'a> StrategyContext<'a> {
    pub(crate) fn new(
        broker: &'a mut Broker,
        streams: &'a [Box<dyn BarStream>],
        row: Option<&'a BarSet>,
    ) -> Self {
        Self {
            broker,
            streams,
            row,
        }
    }

    /// Timestamp of the row being processed.
    pub fn now(&self) -> Option<NaiveDateTime> {
        self.row.map(|r| r.dt)
    }

    /// The bars delivered on this row.
    pub fn row(&self) -> Option<&BarSet> {
        self.row
    }

    pub fn broker(&self) -> &Broker {
        &*self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut *self.broker
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(|s| s.name())
    }

    fn stream(&self, name: &str) -> Option<&dyn BarStream> {
        self.streams
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Latest bar of a stream, delivered on this row or earlier.
    pub fn bar(&self, name: &str) -> Option<&Bar> {
        self.stream(name).and_then(|s| s.current())
    }

    /// Every bar a stream has delivered so far, oldest first.
    pub fn history(&self, name: &str) -> &[Bar] {
        self.stream(name).map_or(&[], |s| s.history())
    }

    /// Whether `name` delivered a bar on this row.
    pub fn delivered(&self, name: &str) -> bool {
        self.row.is_some_and(|r| r.get(name).is_some())
    }

    pub fn submit(&mut self, req: OrderRequest) -> OrderId {
        self.broker.submit(req)
    }

    pub fn buy(&mut self, instrument: &str, size: f64) -> OrderId {
        self.broker.submit(OrderRequest::buy(instrument, size))
    }

    pub fn sell(&mut self, instrument: &str, size: f64) -> OrderId {
        self.broker.submit(OrderRequest::sell(instrument, size))
    }

    pub fn submit_bracket(&mut self, bracket: BracketRequest) -> BracketIds {
        self.broker.submit_bracket(bracket)
    }

    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.broker.cancel(id)
    }

    pub fn position(&self, instrument: &str) -> Position {
        self.broker.position(instrument)
    }

    pub fn cash(&self) -> f64 {
        self.broker.cash()
    }

    pub fn value(&self) -> f64 {
        self.broker.value()
    }
}
