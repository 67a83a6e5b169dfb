//! Simulated broker: order matching and account bookkeeping.
//!
//! One [`Broker::tick`] settles one synchronized row of bars:
//!
//! 1. Activate bracket children released by a parent fill on the previous tick
//! 2. Pre-trade cash check of newly submitted orders (shadow cash/positions)
//! 3. Accrue borrow interest on open positions
//! 4. Inject recorded historical orders whose time has come
//! 5. Scan the pending queue once: expire, skip inactive, try to execute
//! 6. Mark margined positions to the close and move cash accordingly
//! 7. Recompute value, leverage and unrealized pnl
//!
//! Per-order failures never surface as errors; they become terminal statuses
//! reported through [`Broker::notifications`].

mod accounting;
mod bracket;
pub mod config;
pub mod filler;
mod history;
pub mod market;
mod matching;
pub mod order_book;
pub mod slippage;

pub use bracket::{BracketIds, BracketRequest};
pub use config::BrokerConfig;
pub use filler::{BarPointPerc, FillerConfig, Filler, FixedBarPerc, FixedSize};
pub use history::{FundMark, HistoricalOrder};
pub use market::{BarSet, MarketBar};
pub use order_book::OrderBook;
pub use slippage::SlippageConfig;

use crate::calendar::{TradingCalendar, WeekdayCalendar};
use crate::commission::{CommissionRegistry, CommissionScheme};
use crate::domain::{
    CreationContext, IdGen, NotificationReason, Order, OrderId, OrderNotification, OrderRequest,
    OrderStatus, Position,
};
use chrono::NaiveDateTime;
use history::{FundHistory, OrderHistory};
use market::MarketState;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Account state after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub dt: Option<NaiveDateTime>,
    pub cash: f64,
    /// Cash plus unlevered position value.
    pub value: f64,
    /// Cash plus levered position value.
    pub levered_value: f64,
    /// Levered position value alone.
    pub market_value: f64,
    pub leverage: f64,
    pub unrealized_pnl: f64,
    pub fund_value: f64,
    pub fund_shares: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Valuation {
    value: f64,
    levered_value: f64,
    market_value: f64,
    leverage: f64,
    unrealized: f64,
    fund_value: f64,
    fund_shares: f64,
}

/// The matching engine. Owns cash, positions and every order; mutated only
/// through its own methods, one tick at a time.
#[derive(Debug)]
pub struct Broker {
    config: BrokerConfig,
    commissions: CommissionRegistry,
    calendar: Arc<dyn TradingCalendar>,
    filler: Option<Box<dyn Filler>>,
    ids: IdGen,
    book: OrderBook,
    positions: BTreeMap<String, Position>,
    market: BTreeMap<String, MarketState>,
    cash: f64,
    starting_cash: f64,
    /// Interest accrued per instrument since its last closing execution.
    accrued_interest: HashMap<String, f64>,
    notifications: VecDeque<OrderNotification>,
    cash_additions: VecDeque<f64>,
    order_history: Vec<OrderHistory>,
    fund_history: Option<FundHistory>,
    valuation: Valuation,
    now: Option<NaiveDateTime>,
}

impl Broker {
    pub fn new(config: BrokerConfig) -> Self {
        let filler = config.filler.as_ref().map(FillerConfig::build);
        let fund_value = config.fundstartval;
        let cash = config.cash;
        let fund_shares = if fund_value != 0.0 { cash / fund_value } else { 0.0 };
        Self {
            config,
            commissions: CommissionRegistry::default(),
            calendar: Arc::new(WeekdayCalendar::default()),
            filler,
            ids: IdGen::new(),
            book: OrderBook::new(),
            positions: BTreeMap::new(),
            market: BTreeMap::new(),
            cash,
            starting_cash: cash,
            accrued_interest: HashMap::new(),
            notifications: VecDeque::new(),
            cash_additions: VecDeque::new(),
            order_history: Vec::new(),
            fund_history: None,
            valuation: Valuation {
                value: cash,
                levered_value: cash,
                market_value: 0.0,
                leverage: 0.0,
                unrealized: 0.0,
                fund_value,
                fund_shares,
            },
            now: None,
        }
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn TradingCalendar>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_commissions(mut self, commissions: CommissionRegistry) -> Self {
        self.commissions = commissions;
        self
    }

    pub fn with_filler(mut self, filler: Box<dyn Filler>) -> Self {
        self.filler = Some(filler);
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn calendar(&self) -> Arc<dyn TradingCalendar> {
        Arc::clone(&self.calendar)
    }

    // ── Commission schemes ─────────────────────────────────────────────

    pub fn set_commission(&mut self, instrument: impl Into<String>, scheme: Box<dyn CommissionScheme>) {
        self.commissions.insert(instrument, scheme);
    }

    pub fn set_default_commission(&mut self, scheme: Box<dyn CommissionScheme>) {
        self.commissions.set_default(scheme);
    }

    pub fn commission(&self, instrument: &str) -> &dyn CommissionScheme {
        self.commissions.get(instrument)
    }

    // ── Account queries ────────────────────────────────────────────────

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn starting_cash(&self) -> f64 {
        self.starting_cash
    }

    /// Resets cash (and the fund share count) before a run.
    pub fn set_cash(&mut self, cash: f64) {
        self.cash = cash;
        self.starting_cash = cash;
        self.valuation.value = cash;
        self.valuation.levered_value = cash;
        if self.valuation.fund_value != 0.0 {
            self.valuation.fund_shares = cash / self.valuation.fund_value;
        }
    }

    /// Queues a deposit (positive) or withdrawal (negative), applied at the
    /// next valuation. In fund mode it issues or redeems shares at the
    /// current share value.
    pub fn add_cash(&mut self, amount: f64) {
        self.cash_additions.push_back(amount);
    }

    /// Cash plus unlevered position value as of the last tick.
    pub fn value(&self) -> f64 {
        self.valuation.value
    }

    pub fn levered_value(&self) -> f64 {
        self.valuation.levered_value
    }

    pub fn market_value(&self) -> f64 {
        self.valuation.market_value
    }

    pub fn leverage(&self) -> f64 {
        self.valuation.leverage
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.valuation.unrealized
    }

    pub fn fund_value(&self) -> f64 {
        self.valuation.fund_value
    }

    pub fn fund_shares(&self) -> f64 {
        self.valuation.fund_shares
    }

    /// Fund value in fund mode, otherwise the account value.
    pub fn performance_value(&self) -> f64 {
        if self.config.fundmode {
            self.valuation.fund_value
        } else {
            self.valuation.value
        }
    }

    /// Contribution of one instrument's position to [`Broker::value`].
    pub fn position_value(&self, instrument: &str) -> f64 {
        self.positions
            .get(instrument)
            .map_or(0.0, |pos| self.contribution(instrument, pos).unlevered)
    }

    /// Summed contributions of the given instruments (cash excluded).
    pub fn value_of(&self, instruments: &[&str]) -> f64 {
        instruments.iter().map(|i| self.position_value(i)).sum()
    }

    pub fn position(&self, instrument: &str) -> Position {
        self.positions.get(instrument).copied().unwrap_or_default()
    }

    pub fn positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    /// Units of `instrument` affordable with current cash at `price`.
    pub fn size_for_cash(&self, instrument: &str, price: f64) -> f64 {
        self.commissions.get(instrument).size_for_cash(price, self.cash)
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            dt: self.now,
            cash: self.cash,
            value: self.valuation.value,
            levered_value: self.valuation.levered_value,
            market_value: self.valuation.market_value,
            leverage: self.valuation.leverage,
            unrealized_pnl: self.valuation.unrealized,
            fund_value: self.valuation.fund_value,
            fund_shares: self.valuation.fund_shares,
        }
    }

    /// Timestamp of the last settled tick.
    pub fn now(&self) -> Option<NaiveDateTime> {
        self.now
    }

    /// Latest bar seen for `instrument`.
    pub fn last_bar(&self, instrument: &str) -> Option<&crate::domain::Bar> {
        self.market.get(instrument).map(|m| &m.bar)
    }

    // ── Orders ─────────────────────────────────────────────────────────

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.get(id)
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.book.open_orders()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.book.orders()
    }

    /// Drains pending status-change notifications in emission order.
    pub fn notifications(&mut self) -> Vec<OrderNotification> {
        self.notifications.drain(..).collect()
    }

    pub fn next_notification(&mut self) -> Option<OrderNotification> {
        self.notifications.pop_front()
    }

    /// Creates an order from `req` and routes it. Invalid requests and
    /// orphaned bracket children come back rejected, never as errors.
    pub fn submit(&mut self, req: OrderRequest) -> OrderId {
        let check = self.config.checksubmit;
        self.submit_with(req, check, true)
    }

    fn submit_with(&mut self, req: OrderRequest, check: bool, notify: bool) -> OrderId {
        let id = self.ids.next_order_id();
        let ctx = self.creation_context(&req.instrument);
        let mut order = Order::from_request(id, &req, ctx);
        order.notify = notify;

        if let Err(msg) = req.validate() {
            warn!(order = %id, instrument = %req.instrument, %msg, "rejecting invalid order");
            order.reject();
            self.book.insert(order);
            self.notify(id, NotificationReason::InvalidRequest(msg));
            return id;
        }

        match self.book.join_oco(id, req.oco) {
            Some(leader) => order.oco_group = Some(leader),
            None => {
                let msg = format!("unknown oco order {}", req.oco.map_or(0, |o| o.0));
                warn!(order = %id, %msg, "rejecting invalid order");
                order.reject();
                self.book.insert(order);
                self.notify(id, NotificationReason::InvalidRequest(msg));
                return id;
            }
        }
        self.book.insert(order);
        self.route(id, check);
        id
    }

    /// Cancels a live order. Returns false for unknown or terminal orders.
    pub fn cancel(&mut self, id: OrderId) -> bool {
        self.cancel_with(id, NotificationReason::Cancelled, true)
    }

    // ── History injection ──────────────────────────────────────────────

    /// Replays recorded executions: each entry becomes a Historical order
    /// once the instrument's data reaches its timestamp.
    pub fn add_order_history(&mut self, entries: impl IntoIterator<Item = HistoricalOrder>, notify: bool) {
        self.order_history.push(OrderHistory::new(entries, notify));
    }

    /// Overrides valuation with recorded fund marks. Cash is reset to the
    /// first mark's net asset value.
    pub fn set_fund_history(&mut self, marks: impl IntoIterator<Item = FundMark>) {
        let history = FundHistory::new(marks);
        if let Some(first) = history.first() {
            let nav = first.net_asset_value;
            self.valuation.fund_value = first.share_value;
            self.set_cash(nav);
        }
        self.fund_history = Some(history);
    }

    // ── Tick ───────────────────────────────────────────────────────────

    /// Settles one synchronized row of bars.
    pub fn tick(&mut self, bars: &BarSet) {
        self.now = Some(bars.dt);
        for state in self.market.values_mut() {
            state.fresh = false;
        }
        for (instrument, delivered) in &bars.bars {
            match self.market.get_mut(instrument) {
                Some(state) => state.advance(*delivered),
                None => {
                    self.market.insert(instrument.clone(), MarketState::new(*delivered));
                }
            }
        }

        self.activate_released();
        if self.config.checksubmit {
            self.check_submitted();
        }
        self.accrue_interest();
        self.process_order_history();
        self.scan_pending();
        self.adjust_cash_to_close();
        self.revalue();
    }

    fn activate_released(&mut self) {
        for id in self.book.take_to_activate() {
            if let Some(order) = self.book.get_mut(id) {
                if order.is_alive() {
                    order.activate();
                    debug!(order = %id, "bracket child activated");
                }
            }
        }
    }

    fn scan_pending(&mut self) {
        let queue = self.book.take_pending();
        let mut survivors = Vec::with_capacity(queue.len());
        for id in queue {
            let Some(order) = self.book.get(id) else {
                continue;
            };
            if !order.is_alive() {
                continue;
            }
            let Some(state) = self.market.get(&order.instrument) else {
                survivors.push(id);
                continue;
            };
            if !state.fresh {
                survivors.push(id);
                continue;
            }
            let now = state.timestamp();
            let active = order.active;

            if self.book.get_mut(id).is_some_and(|o| o.expire(now)) {
                self.notify(id, NotificationReason::Expired);
                self.oco_check(id);
                self.bracketize(id, true);
                continue;
            }
            if !active {
                survivors.push(id);
                continue;
            }

            self.try_exec(id);
            match self.book.get(id).map(|o| o.status) {
                Some(status) if status.is_alive() => survivors.push(id),
                Some(OrderStatus::Completed) => self.bracketize(id, false),
                _ => {}
            }
        }
        self.book.restore_pending(survivors);
    }

    // ── Routing ────────────────────────────────────────────────────────

    fn creation_context(&self, instrument: &str) -> CreationContext {
        match self.market.get(instrument) {
            Some(state) => {
                let dt = state.timestamp();
                CreationContext {
                    dt: Some(dt),
                    close: Some(state.close()),
                    session_end: Some(self.calendar.session_bounds(dt).1),
                }
            }
            None => CreationContext::default(),
        }
    }

    /// Joins the order to its bracket group and, if it transmits, sends every
    /// parked member of the group.
    fn route(&mut self, id: OrderId, check: bool) {
        let Some(order) = self.book.get(id) else {
            return;
        };
        let root = order.parent.unwrap_or(id);
        let transmit = order.transmit;
        if root != id && !(self.book.has_bracket(root) && self.book.is_alive(root)) {
            warn!(order = %id, parent = %root, "rejecting child of unavailable parent");
            if let Some(order) = self.book.get_mut(id) {
                order.reject();
            }
            self.notify(id, NotificationReason::ParentUnavailable(root));
            self.oco_check(id);
            return;
        }
        self.book.join_bracket(id, root);
        if !transmit {
            return;
        }
        for member in self.book.bracket_members(root) {
            let parked = self
                .book
                .get(member)
                .is_some_and(|o| o.status == OrderStatus::Created);
            if parked {
                self.transmit(member, check);
            }
        }
    }

    fn transmit(&mut self, id: OrderId, check: bool) {
        if check {
            if let Some(order) = self.book.get_mut(id) {
                order.submit();
            }
            self.book.push_submitted(id);
            self.notify(id, NotificationReason::Submitted);
        } else {
            self.accept(id);
        }
    }

    fn accept(&mut self, id: OrderId) {
        if let Some(order) = self.book.get_mut(id) {
            order.submit();
            order.accept();
        }
        self.book.push_pending(id);
        self.notify(id, NotificationReason::Accepted);
    }

    /// Pseudo-executes every submitted order against shadow cash and
    /// positions; accepts those that keep cash non-negative.
    fn check_submitted(&mut self) {
        let mut cash = self.cash;
        let mut shadow: HashMap<String, Position> = HashMap::new();
        for id in self.book.take_submitted() {
            let Some(order) = self.book.get(id) else {
                continue;
            };
            if !order.is_alive() {
                continue;
            }
            if let Some(parent) = order.parent {
                if !self.book.has_bracket(parent) {
                    if let Some(order) = self.book.get_mut(id) {
                        order.reject();
                    }
                    self.notify(id, NotificationReason::ParentUnavailable(parent));
                    self.oco_check(id);
                    continue;
                }
            }
            let instrument = order.instrument.clone();
            let base = shadow
                .get(&instrument)
                .copied()
                .unwrap_or_else(|| self.position(&instrument));
            let mut position = base;
            let after = self.pseudo_execute(order, cash, &mut position);
            if after >= 0.0 {
                cash = after;
                shadow.insert(instrument, position);
                self.accept(id);
            } else {
                warn!(order = %id, %instrument, cash = after, "pre-trade check failed");
                if let Some(order) = self.book.get_mut(id) {
                    order.margin();
                }
                self.notify(id, NotificationReason::InsufficientMargin);
                self.oco_check(id);
                self.bracketize(id, true);
            }
        }
    }

    // ── Cascades ───────────────────────────────────────────────────────

    pub(crate) fn notify(&mut self, id: OrderId, reason: NotificationReason) {
        if let Some(order) = self.book.get(id) {
            if order.notify {
                self.notifications.push_back(OrderNotification {
                    order: order.clone(),
                    reason,
                });
            }
        }
    }

    fn cancel_with(&mut self, id: OrderId, reason: NotificationReason, cascade: bool) -> bool {
        match self.book.get_mut(id) {
            Some(order) if order.is_alive() => order.cancel(),
            _ => return false,
        }
        debug!(order = %id, reason = %reason, "order cancelled");
        self.notify(id, reason);
        self.oco_check(id);
        if cascade {
            self.bracketize(id, true);
        }
        true
    }

    /// Cancels the other live members of the order's OCO group, with their
    /// bracket children, and dissolves the group.
    fn oco_check(&mut self, id: OrderId) {
        let Some(leader) = self.book.get(id).and_then(|o| o.oco_group) else {
            return;
        };
        for member in self.book.take_oco_group(leader) {
            if member == id {
                continue;
            }
            // Siblings may head their own bracket; take its children down too.
            self.cancel_with(member, NotificationReason::OcoSibling(id), true);
        }
    }

    /// Tears the bracket group down (`cancel`, or a child finished), or
    /// releases the children after the parent completed.
    fn bracketize(&mut self, id: OrderId, cancel: bool) {
        let Some(order) = self.book.get(id) else {
            return;
        };
        let root = order.parent.unwrap_or(id);
        if cancel || root != id {
            for member in self.book.take_bracket(root) {
                if member != id {
                    self.cancel_with(member, NotificationReason::BracketCascade(id), false);
                }
            }
        } else {
            for child in self.book.release_children(root) {
                self.book.push_to_activate(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, OrderSide};
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, open: f64, high: f64, low: f64, close: f64) -> BarSet {
        BarSet::single("SPY", Bar::new(ts(day), open, high, low, close, 1_000.0))
    }

    #[test]
    fn fresh_broker_value_is_cash() {
        let broker = Broker::new(BrokerConfig::with_cash(5_000.0));
        assert_eq!(broker.cash(), 5_000.0);
        assert_eq!(broker.value(), 5_000.0);
        assert_eq!(broker.fund_shares(), 50.0);
    }

    #[test]
    fn submit_emits_submitted_then_accepted() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&bar(2, 100.0, 101.0, 99.0, 100.0));
        let id = broker.submit(OrderRequest::buy("SPY", 1.0));
        let first = broker.notifications();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].reason, NotificationReason::Submitted);

        broker.tick(&bar(3, 100.0, 101.0, 99.0, 100.5));
        let reasons: Vec<_> = broker.notifications().into_iter().map(|n| n.reason).collect();
        assert_eq!(reasons, vec![NotificationReason::Accepted, NotificationReason::Executed]);
        assert_eq!(broker.order(id).unwrap().status, OrderStatus::Completed);
    }

    #[test]
    fn invalid_request_is_rejected_not_raised() {
        let mut broker = Broker::new(BrokerConfig::default());
        let id = broker.submit(OrderRequest::new("SPY", OrderSide::Buy, 1.0, crate::domain::ExecType::Limit));
        assert_eq!(broker.order(id).unwrap().status, OrderStatus::Rejected);
        let notes = broker.notifications();
        assert!(matches!(notes[0].reason, NotificationReason::InvalidRequest(_)));
    }

    #[test]
    fn cancel_terminal_is_noop() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&bar(2, 100.0, 101.0, 99.0, 100.0));
        let id = broker.submit(OrderRequest::limit("SPY", OrderSide::Buy, 1.0, 90.0));
        assert!(broker.cancel(id));
        assert!(!broker.cancel(id));
        assert!(!broker.cancel(OrderId(999)));
    }

    #[test]
    fn stale_instrument_orders_wait_for_their_own_bar() {
        let mut broker = Broker::new(BrokerConfig::default());
        broker.tick(&bar(2, 100.0, 101.0, 99.0, 100.0));
        let id = broker.submit(OrderRequest::buy("SPY", 1.0));
        let other = BarSet::single("QQQ", Bar::new(ts(3), 10.0, 11.0, 9.0, 10.0, 10.0));
        broker.tick(&other);
        assert!(broker.order(id).unwrap().is_alive());
        broker.tick(&bar(4, 100.0, 101.0, 99.0, 100.0));
        assert_eq!(broker.order(id).unwrap().status, OrderStatus::Completed);
    }
}
