//! Orders: requests, execution types, the status state machine and the
//! executed-size accumulator.

use super::ids::OrderId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remaining sizes below this count as fully executed.
const REMAINING_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> f64 {
        match self {
            OrderSide::Buy => 1.0,
            OrderSide::Sell => -1.0,
        }
    }
}

/// How an order is matched against incoming bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecType {
    /// Next bar's open (or the creation bar's close under cheat-on-close).
    Market,
    /// The session's closing price.
    Close,
    /// At the limit price or better.
    Limit,
    /// Becomes a market order once the stop price is penetrated.
    Stop,
    /// Becomes a limit order once the stop price is penetrated.
    StopLimit,
    /// Stop whose price trails the close by an amount or percentage.
    StopTrail,
    /// Stop-limit whose stop and limit trail together.
    StopTrailLimit,
    /// Forced fill at the caller-supplied price.
    Historical,
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    Partial,
    Completed,
    Canceled,
    Expired,
    /// Rejected because cash could not cover the margin.
    Margin,
    Rejected,
}

impl OrderStatus {
    /// Still able to execute.
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            OrderStatus::Created | OrderStatus::Submitted | OrderStatus::Accepted | OrderStatus::Partial
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_alive()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Time in force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "until", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validity {
    /// Good till cancelled.
    #[default]
    Gtc,
    /// Until the end of the session the order was created in.
    Day,
    /// Until (and including) the given instant.
    Until(NaiveDateTime),
}

/// Distance kept by a trailing stop from the reference price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trail {
    Amount(f64),
    /// Fraction of the price, e.g. 0.02 for 2%.
    Percent(f64),
}

impl Trail {
    fn distance(self, price: f64) -> f64 {
        match self {
            Trail::Amount(amount) => amount,
            Trail::Percent(perc) => price * perc,
        }
    }
}

/// What a strategy asks for. Turned into an [`Order`] by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: OrderSide,
    /// Unsigned requested size.
    pub size: f64,
    pub exec_type: ExecType,
    /// Limit price (Limit), stop price (Stop*), or fill price (Historical).
    pub price: Option<f64>,
    /// Limit price once a StopLimit/StopTrailLimit triggers.
    pub price_limit: Option<f64>,
    pub validity: Validity,
    pub trail: Option<Trail>,
    /// Bracket parent. The child stays inactive until the parent completes.
    pub parent: Option<OrderId>,
    /// Join the one-cancels-other group of this order.
    pub oco: Option<OrderId>,
    /// When false the order is parked until a later sibling transmits the group.
    pub transmit: bool,
}

impl OrderRequest {
    pub fn new(instrument: impl Into<String>, side: OrderSide, size: f64, exec_type: ExecType) -> Self {
        Self {
            instrument: instrument.into(),
            side,
            size,
            exec_type,
            price: None,
            price_limit: None,
            validity: Validity::Gtc,
            trail: None,
            parent: None,
            oco: None,
            transmit: true,
        }
    }

    pub fn market(instrument: impl Into<String>, side: OrderSide, size: f64) -> Self {
        Self::new(instrument, side, size, ExecType::Market)
    }

    pub fn buy(instrument: impl Into<String>, size: f64) -> Self {
        Self::market(instrument, OrderSide::Buy, size)
    }

    pub fn sell(instrument: impl Into<String>, size: f64) -> Self {
        Self::market(instrument, OrderSide::Sell, size)
    }

    pub fn close(instrument: impl Into<String>, side: OrderSide, size: f64) -> Self {
        Self::new(instrument, side, size, ExecType::Close)
    }

    pub fn limit(instrument: impl Into<String>, side: OrderSide, size: f64, price: f64) -> Self {
        Self::new(instrument, side, size, ExecType::Limit).with_price(price)
    }

    pub fn stop(instrument: impl Into<String>, side: OrderSide, size: f64, stop: f64) -> Self {
        Self::new(instrument, side, size, ExecType::Stop).with_price(stop)
    }

    pub fn stop_limit(
        instrument: impl Into<String>,
        side: OrderSide,
        size: f64,
        stop: f64,
        limit: f64,
    ) -> Self {
        let mut req = Self::new(instrument, side, size, ExecType::StopLimit).with_price(stop);
        req.price_limit = Some(limit);
        req
    }

    pub fn stop_trail(instrument: impl Into<String>, side: OrderSide, size: f64, trail: Trail) -> Self {
        let mut req = Self::new(instrument, side, size, ExecType::StopTrail);
        req.trail = Some(trail);
        req
    }

    pub fn historical(instrument: impl Into<String>, side: OrderSide, size: f64, price: f64) -> Self {
        Self::new(instrument, side, size, ExecType::Historical).with_price(price)
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_price_limit(mut self, price_limit: f64) -> Self {
        self.price_limit = Some(price_limit);
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_trail(mut self, trail: Trail) -> Self {
        self.trail = Some(trail);
        self
    }

    pub fn with_parent(mut self, parent: OrderId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_oco(mut self, member: OrderId) -> Self {
        self.oco = Some(member);
        self
    }

    pub fn with_transmit(mut self, transmit: bool) -> Self {
        self.transmit = transmit;
        self
    }

    /// Checks the request is self-consistent. The message becomes the
    /// rejection reason.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(format!("size must be positive, got {}", self.size));
        }
        let needs_price = matches!(
            self.exec_type,
            ExecType::Limit | ExecType::Stop | ExecType::StopLimit | ExecType::Historical
        );
        if needs_price && self.price.is_none() {
            return Err(format!("{:?} order requires a price", self.exec_type));
        }
        if matches!(self.exec_type, ExecType::StopLimit | ExecType::StopTrailLimit)
            && self.price_limit.is_none()
        {
            return Err(format!("{:?} order requires a limit price", self.exec_type));
        }
        if matches!(self.exec_type, ExecType::StopTrail | ExecType::StopTrailLimit) {
            match self.trail {
                None => return Err("trailing order requires a trail".into()),
                Some(Trail::Amount(a)) if !(a > 0.0) => {
                    return Err(format!("trail amount must be positive, got {a}"))
                }
                Some(Trail::Percent(p)) if !(p > 0.0 && p < 1.0) => {
                    return Err(format!("trail percent must be in (0, 1), got {p}"))
                }
                _ => {}
            }
        }
        if let Some(price) = self.price {
            if !price.is_finite() {
                return Err(format!("price must be finite, got {price}"));
            }
        }
        Ok(())
    }
}

/// Market context captured when an order is created.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreationContext {
    /// Timestamp of the instrument's latest bar.
    pub dt: Option<NaiveDateTime>,
    /// Close of the instrument's latest bar.
    pub close: Option<f64>,
    /// End of the session containing `dt`.
    pub session_end: Option<NaiveDateTime>,
}

/// Parameters as they stood at creation (prices move for trailing orders).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderData {
    pub dt: Option<NaiveDateTime>,
    /// Signed requested size.
    pub size: f64,
    /// Limit, stop or reference price.
    pub price: f64,
    pub price_limit: Option<f64>,
    /// Close of the creation bar.
    pub pclose: f64,
}

/// One fill slice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBit {
    pub dt: NaiveDateTime,
    pub size: f64,
    pub price: f64,
    pub closed: f64,
    pub closed_value: f64,
    pub closed_comm: f64,
    pub opened: f64,
    pub opened_value: f64,
    pub opened_comm: f64,
    pub pnl: f64,
    /// Position size after this slice.
    pub psize: f64,
    /// Position average price after this slice.
    pub pprice: f64,
}

impl ExecutionBit {
    pub fn value(&self) -> f64 {
        self.closed_value + self.opened_value
    }

    pub fn comm(&self) -> f64 {
        self.closed_comm + self.opened_comm
    }
}

/// Running totals over all fill slices of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutedState {
    pub dt: Option<NaiveDateTime>,
    /// Signed executed size.
    pub size: f64,
    /// Signed size still to execute.
    pub remsize: f64,
    /// Size-weighted average fill price.
    pub price: f64,
    pub value: f64,
    pub comm: f64,
    pub pnl: f64,
    pub margin: Option<f64>,
    pub psize: f64,
    pub pprice: f64,
    pub bits: Vec<ExecutionBit>,
}

impl ExecutedState {
    fn add(&mut self, bit: ExecutionBit) {
        let old_value = self.size * self.price;
        self.size += bit.size;
        self.remsize -= bit.size;
        if self.remsize.abs() < REMAINING_EPSILON {
            self.remsize = 0.0;
        }
        self.price = if self.size != 0.0 {
            (old_value + bit.size * bit.price) / self.size
        } else {
            bit.price
        };
        self.dt = Some(bit.dt);
        self.value += bit.value();
        self.comm += bit.comm();
        self.pnl += bit.pnl;
        self.psize = bit.psize;
        self.pprice = bit.pprice;
        self.bits.push(bit);
    }
}

/// A live or historical order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument: String,
    pub side: OrderSide,
    pub exec_type: ExecType,
    pub status: OrderStatus,
    pub created: OrderData,
    pub executed: ExecutedState,
    pub validity: Validity,
    /// Resolved expiry instant, `None` for good-till-cancelled.
    pub valid_until: Option<NaiveDateTime>,
    pub trail: Option<Trail>,
    /// Stop minus limit, kept constant while a StopTrailLimit trails.
    pub limit_offset: f64,
    pub parent: Option<OrderId>,
    /// Group leader of the one-cancels-other group.
    pub oco_group: Option<OrderId>,
    pub transmit: bool,
    /// Stop leg of a StopLimit has fired.
    pub triggered: bool,
    /// Session end used by Close orders.
    pub session_end: Option<NaiveDateTime>,
    /// Close remembered by a Close order while waiting for the session end.
    pub annotated_close: Option<f64>,
    /// Bracket children start inactive.
    pub active: bool,
    /// Whether status changes are reported (historical replays may be silent).
    pub notify: bool,
}

impl Order {
    /// Builds an order from a validated request.
    pub fn from_request(id: OrderId, req: &OrderRequest, ctx: CreationContext) -> Self {
        let size = req.side.sign() * req.size.abs();
        let pclose = ctx.close.unwrap_or(0.0);
        let price = req.price.unwrap_or(pclose);
        let valid_until = match req.validity {
            Validity::Gtc => None,
            Validity::Day => ctx.session_end,
            Validity::Until(dt) => Some(dt),
        };

        let mut order = Self {
            id,
            instrument: req.instrument.clone(),
            side: req.side,
            exec_type: req.exec_type,
            status: OrderStatus::Created,
            created: OrderData {
                dt: ctx.dt,
                size,
                price,
                price_limit: req.price_limit,
                pclose,
            },
            executed: ExecutedState {
                remsize: size,
                ..ExecutedState::default()
            },
            validity: req.validity,
            valid_until,
            trail: req.trail,
            limit_offset: 0.0,
            parent: req.parent,
            oco_group: None,
            transmit: req.transmit,
            triggered: false,
            session_end: ctx.session_end,
            annotated_close: None,
            active: req.parent.is_none(),
            notify: true,
        };

        if matches!(order.exec_type, ExecType::StopTrail | ExecType::StopTrailLimit) {
            if let Some(limit) = req.price_limit {
                order.limit_offset = price - limit;
            }
            order.created.price = if order.is_buy() {
                f64::INFINITY
            } else {
                f64::NEG_INFINITY
            };
            order.trail_adjust(price);
        }
        order
    }

    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Eligible for matching: alive and released by its bracket parent.
    pub fn is_active(&self) -> bool {
        self.active && self.is_alive()
    }

    /// Signed size still to execute.
    pub fn remaining(&self) -> f64 {
        self.executed.remsize
    }

    pub fn limit_price(&self) -> Option<f64> {
        match self.exec_type {
            ExecType::Limit => Some(self.created.price),
            ExecType::StopLimit | ExecType::StopTrailLimit => self.created.price_limit,
            _ => None,
        }
    }

    pub(crate) fn submit(&mut self) {
        self.status = OrderStatus::Submitted;
    }

    pub(crate) fn accept(&mut self) {
        self.status = OrderStatus::Accepted;
    }

    pub(crate) fn activate(&mut self) {
        self.active = true;
    }

    pub(crate) fn cancel(&mut self) {
        self.status = OrderStatus::Canceled;
    }

    pub(crate) fn reject(&mut self) {
        self.status = OrderStatus::Rejected;
    }

    pub(crate) fn margin(&mut self) {
        self.status = OrderStatus::Margin;
    }

    /// Expires the order if `now` is past its validity. Market orders never
    /// expire.
    pub(crate) fn expire(&mut self, now: NaiveDateTime) -> bool {
        if self.exec_type == ExecType::Market {
            return false;
        }
        match self.valid_until {
            Some(until) if now > until => {
                self.status = OrderStatus::Expired;
                self.executed.dt = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Moves a trailing stop towards `price`, never against the order.
    pub(crate) fn trail_adjust(&mut self, price: f64) {
        let distance = self.trail.map_or(0.0, |t| t.distance(price));
        let trailing_limit = self.exec_type == ExecType::StopTrailLimit;
        if self.is_buy() {
            let stop = price + distance;
            if stop < self.created.price {
                self.created.price = stop;
                if trailing_limit {
                    self.created.price_limit = Some(stop - self.limit_offset);
                }
            }
        } else {
            let stop = price - distance;
            if stop > self.created.price {
                self.created.price = stop;
                if trailing_limit {
                    self.created.price_limit = Some(stop - self.limit_offset);
                }
            }
        }
    }

    /// Records a fill slice and moves to Partial or Completed.
    pub(crate) fn execute(&mut self, bit: ExecutionBit, margin: Option<f64>) {
        if bit.size == 0.0 {
            return;
        }
        self.executed.add(bit);
        self.executed.margin = margin;
        self.status = if self.executed.remsize == 0.0 {
            OrderStatus::Completed
        } else {
            OrderStatus::Partial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn ctx(close: f64) -> CreationContext {
        CreationContext {
            dt: Some(ts(4)),
            close: Some(close),
            session_end: Some(ts(4)),
        }
    }

    fn bit(size: f64, price: f64) -> ExecutionBit {
        ExecutionBit {
            dt: ts(5),
            size,
            price,
            closed: 0.0,
            closed_value: 0.0,
            closed_comm: 0.0,
            opened: size,
            opened_value: size * price,
            opened_comm: 1.0,
            pnl: 0.0,
            psize: size,
            pprice: price,
        }
    }

    #[test]
    fn sell_size_is_negative_and_market_price_defaults_to_close() {
        let order = Order::from_request(OrderId(1), &OrderRequest::sell("ES", 3.0), ctx(101.0));
        assert_eq!(order.created.size, -3.0);
        assert_eq!(order.remaining(), -3.0);
        assert_eq!(order.created.price, 101.0);
        assert_eq!(order.created.pclose, 101.0);
        assert!(order.is_active());
    }

    #[test]
    fn partial_fills_accumulate_weighted_price() {
        let mut order = Order::from_request(OrderId(1), &OrderRequest::buy("ES", 10.0), ctx(100.0));
        order.execute(bit(4.0, 100.0), None);
        assert_eq!(order.status, OrderStatus::Partial);
        order.execute(bit(6.0, 105.0), None);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.executed.size, 10.0);
        assert!((order.executed.price - 103.0).abs() < 1e-12);
        assert_eq!(order.executed.comm, 2.0);
        assert_eq!(order.executed.bits.len(), 2);
    }

    #[test]
    fn market_orders_never_expire() {
        let req = OrderRequest::buy("ES", 1.0).with_validity(Validity::Day);
        let mut order = Order::from_request(OrderId(1), &req, ctx(100.0));
        assert!(!order.expire(ts(10)));
        assert!(order.is_alive());
    }

    #[test]
    fn day_limit_expires_after_session_end() {
        let req = OrderRequest::limit("ES", OrderSide::Buy, 1.0, 95.0).with_validity(Validity::Day);
        let mut order = Order::from_request(OrderId(1), &req, ctx(100.0));
        assert!(!order.expire(ts(4)));
        assert!(order.expire(ts(5)));
        assert_eq!(order.status, OrderStatus::Expired);
    }

    #[test]
    fn sell_trail_only_moves_up() {
        let req = OrderRequest::stop_trail("ES", OrderSide::Sell, 1.0, Trail::Amount(2.0));
        let mut order = Order::from_request(OrderId(1), &req, ctx(100.0));
        assert_eq!(order.created.price, 98.0);
        order.trail_adjust(105.0);
        assert_eq!(order.created.price, 103.0);
        order.trail_adjust(101.0);
        assert_eq!(order.created.price, 103.0);
    }

    #[test]
    fn buy_trail_limit_keeps_offset() {
        let req = OrderRequest::new("ES", OrderSide::Buy, 1.0, ExecType::StopTrailLimit)
            .with_price(100.0)
            .with_price_limit(101.0)
            .with_trail(Trail::Percent(0.1));
        let mut order = Order::from_request(OrderId(1), &req, ctx(100.0));
        assert!((order.created.price - 110.0).abs() < 1e-9);
        assert!((order.created.price_limit.unwrap() - 111.0).abs() < 1e-9);
        order.trail_adjust(90.0);
        assert!((order.created.price - 99.0).abs() < 1e-9);
        assert!((order.created.price_limit.unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn validation_catches_missing_prices() {
        assert!(OrderRequest::new("ES", OrderSide::Buy, 1.0, ExecType::Limit)
            .validate()
            .is_err());
        assert!(OrderRequest::new("ES", OrderSide::Buy, 1.0, ExecType::StopLimit)
            .with_price(10.0)
            .validate()
            .is_err());
        assert!(OrderRequest::new("ES", OrderSide::Buy, 1.0, ExecType::StopTrail)
            .validate()
            .is_err());
        assert!(OrderRequest::buy("ES", 0.0).validate().is_err());
        assert!(OrderRequest::buy("ES", 1.0).validate().is_ok());
    }

    #[test]
    fn children_start_inactive() {
        let req = OrderRequest::stop("ES", OrderSide::Sell, 1.0, 90.0).with_parent(OrderId(7));
        let order = Order::from_request(OrderId(8), &req, ctx(100.0));
        assert!(!order.is_active());
        assert!(order.is_alive());
    }
}
