//! Cash and position bookkeeping: executions, interest, mark-to-market and
//! account valuation.

use super::Broker;
use crate::domain::{
    ExecType, ExecutionBit, NotificationReason, Order, OrderId, OrderRequest, OrderSide, Position,
};
use tracing::{debug, trace};

/// Which bar an execution is stamped with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecAt {
    Current,
    /// Previous bar of the instrument (fills at an annotated close).
    Previous,
    /// The order's creation time (cheat-on-close).
    Created,
}

/// One position's share of the account value.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Contribution {
    /// Levered value (absolute unless short cash is enabled).
    pub market: f64,
    /// Value net of leverage; this is what adds up to the account value.
    pub unlevered: f64,
    pub unrealized: f64,
}

impl Broker {
    /// Applies a fill of `id` at `price`: splits it into closing and opening
    /// parts, moves cash, updates the position and records the slice. An
    /// opening part cash cannot cover is dropped and the order is margined.
    pub(super) fn execute(&mut self, id: OrderId, price: f64, at: ExecAt) {
        let Some(order) = self.book.get(id) else {
            return;
        };
        let instrument = order.instrument.clone();
        let Some(state) = self.market.get(&instrument) else {
            return;
        };
        let dt = match at {
            ExecAt::Current => state.timestamp(),
            ExecAt::Previous => state.prev.map_or(state.timestamp(), |bar| bar.timestamp),
            ExecAt::Created => order.created.dt.unwrap_or(state.timestamp()),
        };
        let size = match &self.filler {
            Some(filler) => order.side.sign() * filler.fill_size(order.remaining(), price, &state.bar),
            None => order.remaining(),
        };
        if size == 0.0 {
            return;
        }

        let scheme = self.commissions.get(&instrument);
        let shortcash = self.config.shortcash;
        let mut position = self.positions.get(&instrument).copied().unwrap_or_default();
        let pprice_orig = position.price;
        let split = position.pseudo_update(size, price);
        let closed = split.closed;
        let mut opened = split.opened;
        let pnl = scheme.profit_and_loss(-closed, pprice_orig, price);
        let mut cash = self.cash;

        let (closed_value, mut closed_comm) = if closed != 0.0 {
            let value = if shortcash {
                scheme.value_size(-closed, pprice_orig)
            } else {
                scheme.operation_cost(closed, pprice_orig)
            };
            let released = if value > 0.0 {
                value / scheme.leverage_divisor()
            } else {
                value
            };
            let stocklike = if scheme.stocklike() { 1.0 } else { 0.0 };
            let comm = scheme.commission(closed, price);
            cash += released + pnl * stocklike - comm;
            cash += scheme.cash_adjust(-closed, position.adjbase, price);
            self.cash = cash;
            (value, comm)
        } else {
            (0.0, 0.0)
        };

        let wanted = opened;
        let (opened_value, opened_comm) = if opened != 0.0 {
            let value = if shortcash {
                scheme.value_size(opened, price)
            } else {
                scheme.operation_cost(opened, price)
            };
            let locked = if value > 0.0 {
                value / scheme.leverage_divisor()
            } else {
                value
            };
            let comm = scheme.commission(opened, price);
            cash -= locked + comm;
            if cash < 0.0 {
                opened = 0.0;
                (0.0, 0.0)
            } else {
                if split.size.abs() > opened.abs() {
                    cash += scheme.cash_adjust(split.size - opened, position.adjbase, price);
                }
                position.adjbase = price;
                self.cash = cash;
                (value, comm)
            }
        } else {
            (0.0, 0.0)
        };
        let margin = scheme.nominal_margin();

        let exec_size = closed + opened;
        if exec_size != 0.0 {
            let after = position.update(exec_size, price, Some(dt));
            if closed != 0.0 && self.config.int2pnl {
                closed_comm += self.accrued_interest.remove(&instrument).unwrap_or(0.0);
            }
            self.positions.insert(instrument.clone(), position);
            let bit = ExecutionBit {
                dt,
                size: exec_size,
                price,
                closed,
                closed_value,
                closed_comm,
                opened,
                opened_value,
                opened_comm,
                pnl,
                psize: after.size,
                pprice: after.price,
            };
            if let Some(order) = self.book.get_mut(id) {
                order.execute(bit, margin);
            }
            debug!(
                order = %id,
                %instrument,
                size = exec_size,
                price,
                pnl,
                cash = self.cash,
                "order executed"
            );
            self.notify(id, NotificationReason::Executed);
            self.oco_check(id);
        }

        if wanted != 0.0 && opened == 0.0 {
            debug!(order = %id, %instrument, "insufficient cash to open");
            if let Some(order) = self.book.get_mut(id) {
                order.margin();
            }
            self.notify(id, NotificationReason::InsufficientMargin);
            self.oco_check(id);
            self.bracketize(id, true);
        }
    }

    /// Cash left after executing `order` in full at its creation price (the
    /// open under cheat-on-open), applied to the shadow `position`.
    pub(super) fn pseudo_execute(&self, order: &Order, mut cash: f64, position: &mut Position) -> f64 {
        let scheme = self.commissions.get(&order.instrument);
        let shortcash = self.config.shortcash;
        let price = match self.market.get(&order.instrument) {
            Some(state) if self.config.coo && order.exec_type == ExecType::Market => state.quote().open,
            _ => order.created.price,
        };
        let split = position.update(order.remaining(), price, None);

        if split.closed != 0.0 {
            let value = if shortcash {
                scheme.value_size(-split.closed, price)
            } else {
                scheme.operation_cost(split.closed, price)
            };
            let released = if value > 0.0 {
                value / scheme.leverage_divisor()
            } else {
                value
            };
            cash += released - scheme.commission(split.closed, price);
        }
        if split.opened != 0.0 {
            let value = if shortcash {
                scheme.value_size(split.opened, price)
            } else {
                scheme.operation_cost(split.opened, price)
            };
            let locked = if value > 0.0 {
                value / scheme.leverage_divisor()
            } else {
                value
            };
            cash -= locked + scheme.commission(split.opened, price);
        }
        cash
    }

    /// Charges interest on open positions up to each instrument's last bar.
    pub(super) fn accrue_interest(&mut self) {
        let mut total = 0.0;
        for (instrument, position) in self.positions.iter_mut() {
            if position.is_flat() {
                continue;
            }
            let Some(state) = self.market.get(instrument) else {
                continue;
            };
            let now = state.timestamp();
            let credit = self.commissions.get(instrument).credit_interest(position, now);
            if credit != 0.0 {
                *self.accrued_interest.entry(instrument.clone()).or_insert(0.0) += credit;
                total += credit;
                trace!(%instrument, credit, "interest accrued");
            }
            position.updated = Some(now);
        }
        self.cash -= total;
    }

    /// Marks margined positions to the close; cash absorbs the move.
    pub(super) fn adjust_cash_to_close(&mut self) {
        for (instrument, position) in self.positions.iter_mut() {
            if position.is_flat() {
                continue;
            }
            let Some(state) = self.market.get(instrument) else {
                continue;
            };
            let close = state.close();
            self.cash += self
                .commissions
                .get(instrument)
                .cash_adjust(position.size, position.adjbase, close);
            position.adjbase = close;
        }
    }

    /// Turns due history entries into Historical orders, accepted without a
    /// cash check.
    pub(super) fn process_order_history(&mut self) {
        let mut due = Vec::new();
        for history in &mut self.order_history {
            while let Some(entry) = history.peek() {
                let reached = self
                    .market
                    .get(&entry.instrument)
                    .is_some_and(|state| entry.dt <= state.timestamp());
                if !reached {
                    break;
                }
                if let Some(entry) = history.pop() {
                    due.push((entry, history.notify));
                }
            }
        }
        for (entry, notify) in due {
            let side = if entry.size >= 0.0 {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            let req = OrderRequest::historical(entry.instrument, side, entry.size.abs(), entry.price);
            self.submit_with(req, false, notify);
        }
    }

    pub(super) fn contribution(&self, instrument: &str, position: &Position) -> Contribution {
        let scheme = self.commissions.get(instrument);
        let price = self
            .market
            .get(instrument)
            .map_or(position.price, |state| state.close());
        let market = if self.config.shortcash {
            scheme.value_size(position.size, price)
        } else {
            scheme.position_value(position, price).abs()
        };
        let unrealized = scheme.profit_and_loss(position.size, position.price, price);
        let unlevered = if market > 0.0 {
            (market - unrealized) / scheme.leverage_divisor() + unrealized
        } else {
            market
        };
        Contribution {
            market,
            unlevered,
            unrealized,
        }
    }

    /// Applies queued cash additions and recomputes the account valuation.
    pub(super) fn revalue(&mut self) {
        while let Some(amount) = self.cash_additions.pop_front() {
            if self.valuation.fund_value != 0.0 {
                self.valuation.fund_shares += amount / self.valuation.fund_value;
            }
            self.cash += amount;
        }

        let mut market = 0.0;
        let mut unlevered = 0.0;
        let mut unrealized = 0.0;
        for (instrument, position) in &self.positions {
            let c = self.contribution(instrument, position);
            market += c.market;
            unlevered += c.unlevered;
            unrealized += c.unrealized;
        }

        let mark = match (self.fund_history.as_mut(), self.now) {
            (Some(history), Some(now)) => history.advance(now),
            _ => None,
        };
        match mark {
            Some(mark) => {
                self.valuation.value = mark.net_asset_value;
                self.cash = mark.net_asset_value - unlevered;
                self.valuation.fund_value = mark.share_value;
                if mark.share_value != 0.0 {
                    self.valuation.fund_shares = mark.net_asset_value / mark.share_value;
                }
            }
            None => {
                self.valuation.value = self.cash + unlevered;
                if self.valuation.fund_shares != 0.0 {
                    self.valuation.fund_value = self.valuation.value / self.valuation.fund_shares;
                }
            }
        }

        self.valuation.levered_value = self.cash + market;
        self.valuation.market_value = market;
        self.valuation.unrealized = unrealized;
        self.valuation.leverage = market / if unlevered != 0.0 { unlevered } else { 1.0 };
    }
}

#[cfg(test)]
mod tests {
    use crate::broker::{BarSet, Broker, BrokerConfig, HistoricalOrder};
    use crate::commission::{CommissionInfo, CommissionSpec};
    use crate::domain::{Bar, NotificationReason, OrderRequest, OrderStatus};
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(16, 0, 0)
            .unwrap()
    }

    fn bar(day: u32, open: f64, close: f64) -> BarSet {
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;
        BarSet::single("SPY", Bar::new(ts(day), open, high, low, close, 1_000.0))
    }

    fn broker(shortcash: bool) -> Broker {
        Broker::new(BrokerConfig {
            cash: 10_000.0,
            checksubmit: false,
            shortcash,
            ..BrokerConfig::default()
        })
    }

    #[test]
    fn long_round_trip_books_pnl() {
        let mut b = broker(true);
        b.tick(&bar(2, 100.0, 100.0));
        b.submit(OrderRequest::buy("SPY", 10.0));
        b.tick(&bar(3, 100.0, 105.0));
        assert_eq!(b.cash(), 9_000.0);
        assert_eq!(b.value(), 10_050.0);
        assert_eq!(b.unrealized_pnl(), 50.0);
        b.submit(OrderRequest::sell("SPY", 10.0));
        b.tick(&bar(4, 110.0, 108.0));
        assert_eq!(b.cash(), 10_100.0);
        assert_eq!(b.value(), 10_100.0);
        assert!(b.position("SPY").is_flat());
    }

    #[test]
    fn short_with_shortcash_credits_cash_and_has_negative_value() {
        let mut b = broker(true);
        b.tick(&bar(2, 100.0, 100.0));
        b.submit(OrderRequest::sell("SPY", 10.0));
        b.tick(&bar(3, 100.0, 90.0));
        assert_eq!(b.cash(), 11_000.0);
        assert_eq!(b.position_value("SPY"), -900.0);
        assert_eq!(b.value(), 10_100.0);
    }

    #[test]
    fn short_without_shortcash_locks_cash_and_has_positive_value() {
        let mut b = broker(false);
        b.tick(&bar(2, 100.0, 100.0));
        b.submit(OrderRequest::sell("SPY", 10.0));
        b.tick(&bar(3, 100.0, 90.0));
        assert_eq!(b.cash(), 9_000.0);
        assert_eq!(b.position_value("SPY"), 1_100.0);
        assert_eq!(b.value(), 10_100.0);
    }

    #[test]
    fn futures_margin_and_daily_settlement() {
        let mut b = broker(true);
        b.set_commission("SPY", Box::new(CommissionInfo::futures(2.0, 2_000.0, 10.0)));
        b.tick(&bar(2, 100.0, 100.0));
        b.submit(OrderRequest::buy("SPY", 1.0));
        b.tick(&bar(3, 100.0, 104.0));
        // margin 2000 + commission 2, then +4 * 10 settled at the close
        assert_eq!(b.cash(), 10_000.0 - 2_000.0 - 2.0 + 40.0);
        assert_eq!(b.value(), 10_000.0 - 2.0 + 40.0);
    }

    #[test]
    fn unaffordable_open_is_margined() {
        let mut b = Broker::new(BrokerConfig {
            cash: 500.0,
            checksubmit: false,
            ..BrokerConfig::default()
        });
        b.tick(&bar(2, 100.0, 100.0));
        let id = b.submit(OrderRequest::buy("SPY", 10.0));
        b.tick(&bar(3, 100.0, 100.0));
        assert_eq!(b.order(id).unwrap().status, OrderStatus::Margin);
        assert_eq!(b.cash(), 500.0);
        let reasons: Vec<_> = b.notifications().into_iter().map(|n| n.reason).collect();
        assert_eq!(reasons.last(), Some(&NotificationReason::InsufficientMargin));
    }

    #[test]
    fn checksubmit_rejects_before_matching() {
        let mut b = Broker::new(BrokerConfig::with_cash(500.0));
        b.tick(&bar(2, 100.0, 100.0));
        let id = b.submit(OrderRequest::buy("SPY", 10.0));
        b.tick(&bar(3, 100.0, 100.0));
        assert_eq!(b.order(id).unwrap().status, OrderStatus::Margin);
        assert!(b.order(id).unwrap().executed.bits.is_empty());
    }

    #[test]
    fn short_interest_accrues_and_lands_in_commission() {
        let mut b = broker(true);
        let spec = CommissionSpec {
            interest: 0.365,
            ..CommissionSpec::default()
        };
        b.set_commission("SPY", Box::new(CommissionInfo::from_spec(&spec)));
        b.tick(&bar(2, 100.0, 100.0));
        b.submit(OrderRequest::sell("SPY", 10.0));
        b.tick(&bar(3, 100.0, 100.0));
        let cash_after_open = b.cash();
        b.tick(&bar(4, 100.0, 100.0));
        // 0.1% per day on 1000 of borrowed stock
        assert!((cash_after_open - b.cash() - 1.0).abs() < 1e-9);
        let id = b.submit(OrderRequest::buy("SPY", 10.0));
        b.tick(&bar(5, 100.0, 100.0));
        let order = b.order(id).unwrap();
        assert!((order.executed.comm - 2.0).abs() < 1e-9);
    }

    #[test]
    fn add_cash_issues_fund_shares() {
        let mut b = broker(true);
        b.tick(&bar(2, 100.0, 100.0));
        assert_eq!(b.fund_shares(), 100.0);
        b.add_cash(1_000.0);
        b.tick(&bar(3, 100.0, 100.0));
        assert_eq!(b.cash(), 11_000.0);
        assert_eq!(b.fund_shares(), 110.0);
        assert_eq!(b.fund_value(), 100.0);
    }

    #[test]
    fn order_history_replays_at_recorded_price() {
        let mut b = broker(true);
        b.add_order_history(
            [
                HistoricalOrder::new(ts(3), "SPY", 5.0, 101.5),
                HistoricalOrder::new(ts(5), "SPY", -5.0, 99.0),
            ],
            true,
        );
        b.tick(&bar(2, 100.0, 100.0));
        assert!(b.position("SPY").is_flat());
        b.tick(&bar(3, 100.0, 100.0));
        assert_eq!(b.position("SPY").size, 5.0);
        assert_eq!(b.position("SPY").price, 101.5);
        b.tick(&bar(4, 100.0, 100.0));
        b.tick(&bar(5, 100.0, 100.0));
        assert!(b.position("SPY").is_flat());
        assert_eq!(b.cash(), 10_000.0 - 5.0 * 2.5);
    }
}
