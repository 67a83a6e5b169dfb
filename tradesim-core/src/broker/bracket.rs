//! Bracket orders: an entry with stop-loss and take-profit children.

use super::Broker;
use crate::domain::{OrderId, OrderRequest, OrderSide};

/// Bracket order builder: an entry plus optional stop-loss and take-profit
/// children on the opposite side. Children stay inactive until the entry
/// completes; the first child to finish cancels the other.
#[derive(Debug, Clone)]
pub struct BracketRequest {
    entry: OrderRequest,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
}

/// Ids assigned to a submitted bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BracketIds {
    pub entry: OrderId,
    pub stop: Option<OrderId>,
    pub target: Option<OrderId>,
}

impl BracketRequest {
    pub fn new(entry: OrderRequest) -> Self {
        Self {
            entry,
            stop_loss: None,
            take_profit: None,
        }
    }

    pub fn with_stop_loss(mut self, stop_price: f64) -> Self {
        self.stop_loss = Some(stop_price);
        self
    }

    pub fn with_take_profit(mut self, target_price: f64) -> Self {
        self.take_profit = Some(target_price);
        self
    }

    fn exit_side(&self) -> OrderSide {
        match self.entry.side {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl Broker {
    /// Submits the entry held back and transmits the whole group with the
    /// last child.
    pub fn submit_bracket(&mut self, bracket: BracketRequest) -> BracketIds {
        let side = bracket.exit_side();
        let has_children = bracket.stop_loss.is_some() || bracket.take_profit.is_some();
        let instrument = bracket.entry.instrument.clone();
        let size = bracket.entry.size;

        let entry = self.submit(bracket.entry.with_transmit(!has_children));

        let stop = bracket.stop_loss.map(|price| {
            let last = bracket.take_profit.is_none();
            self.submit(
                OrderRequest::stop(instrument.clone(), side, size, price)
                    .with_parent(entry)
                    .with_transmit(last),
            )
        });
        let target = bracket.take_profit.map(|price| {
            self.submit(
                OrderRequest::limit(instrument.clone(), side, size, price)
                    .with_parent(entry)
                    .with_transmit(true),
            )
        });

        BracketIds { entry, stop, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BarSet, BrokerConfig};
    use crate::domain::{Bar, NotificationReason, OrderStatus};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn ohlc(day: u32, o: f64, h: f64, l: f64, c: f64) -> BarSet {
        BarSet::single("SPY", Bar::new(ts(day), o, h, l, c, 1_000.0))
    }

    fn bracket() -> BracketRequest {
        BracketRequest::new(OrderRequest::buy("SPY", 10.0))
            .with_stop_loss(95.0)
            .with_take_profit(105.0)
    }

    #[test]
    fn children_wait_for_entry_then_activate() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&ohlc(2, 100.0, 101.0, 99.0, 100.0));
        let ids = broker.submit_bracket(bracket());
        let stop = ids.stop.unwrap();
        assert!(!broker.order(stop).unwrap().active);

        // entry fills; the low breaches the stop but children are not live yet
        broker.tick(&ohlc(3, 100.0, 101.0, 94.0, 100.0));
        assert_eq!(broker.order(ids.entry).unwrap().status, OrderStatus::Completed);
        assert!(broker.order(stop).unwrap().is_alive());

        broker.tick(&ohlc(4, 100.0, 106.0, 99.0, 104.0));
        assert_eq!(broker.order(ids.target.unwrap()).unwrap().status, OrderStatus::Completed);
        assert_eq!(broker.order(stop).unwrap().status, OrderStatus::Canceled);
        let cascade = broker
            .notifications()
            .into_iter()
            .find(|n| n.id() == stop && n.status() == OrderStatus::Canceled)
            .unwrap();
        assert_eq!(cascade.reason, NotificationReason::BracketCascade(ids.target.unwrap()));
    }

    #[test]
    fn cancelling_entry_cancels_children() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&ohlc(2, 100.0, 101.0, 99.0, 100.0));
        let ids = broker.submit_bracket(bracket());
        assert!(broker.cancel(ids.entry));
        assert_eq!(broker.order(ids.stop.unwrap()).unwrap().status, OrderStatus::Canceled);
        assert_eq!(broker.order(ids.target.unwrap()).unwrap().status, OrderStatus::Canceled);
    }

    #[test]
    fn child_of_dead_parent_is_rejected() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&ohlc(2, 100.0, 101.0, 99.0, 100.0));
        let entry = broker.submit(OrderRequest::limit("SPY", OrderSide::Buy, 1.0, 90.0));
        broker.cancel(entry);
        let child = broker.submit(OrderRequest::stop("SPY", OrderSide::Sell, 1.0, 85.0).with_parent(entry));
        assert_eq!(broker.order(child).unwrap().status, OrderStatus::Rejected);
    }
}
