//! Order-type matching rules against the instrument's current bar.
//!
//! Each rule only decides *whether* and *at what price* an order fills;
//! the bookkeeping lives in `accounting`.

use super::accounting::ExecAt;
use super::market::Quote;
use super::Broker;
use crate::domain::{ExecType, OrderId};
use chrono::NaiveDateTime;

/// Order fields read while matching, copied out so the broker can be
/// mutated during execution.
#[derive(Debug, Clone, Copy)]
struct Ticket {
    exec_type: ExecType,
    buy: bool,
    price: f64,
    price_limit: Option<f64>,
    pclose: f64,
    created_dt: Option<NaiveDateTime>,
    triggered: bool,
    session_end: Option<NaiveDateTime>,
    annotated_close: Option<f64>,
}

impl Broker {
    /// Attempts to fill `id` on the current bar of its instrument.
    pub(super) fn try_exec(&mut self, id: OrderId) {
        let Some(order) = self.book.get(id) else {
            return;
        };
        let Some(state) = self.market.get(&order.instrument) else {
            return;
        };
        let quote = state.quote();
        let bar_dt = state.timestamp();
        let ticket = Ticket {
            exec_type: order.exec_type,
            buy: order.is_buy(),
            price: order.created.price,
            price_limit: order.created.price_limit,
            pclose: order.created.pclose,
            created_dt: order.created.dt,
            triggered: order.triggered,
            session_end: order.session_end,
            annotated_close: order.annotated_close,
        };

        match ticket.exec_type {
            ExecType::Market => self.exec_market(id, &ticket, quote, bar_dt),
            ExecType::Close => self.exec_close(id, &ticket, quote, bar_dt),
            ExecType::Limit => self.exec_limit(id, ticket.buy, quote, ticket.price),
            ExecType::StopLimit | ExecType::StopTrailLimit if ticket.triggered => {
                if let Some(limit) = ticket.price_limit {
                    self.exec_limit(id, ticket.buy, quote, limit);
                }
            }
            ExecType::Stop | ExecType::StopTrail => self.exec_stop(id, &ticket, quote),
            ExecType::StopLimit | ExecType::StopTrailLimit => self.exec_stop_limit(id, &ticket, quote),
            ExecType::Historical => self.execute(id, ticket.price, ExecAt::Current),
        }
    }

    fn exec_market(&mut self, id: OrderId, t: &Ticket, q: Quote, bar_dt: NaiveDateTime) {
        let slip = &self.config.slippage;
        if self.config.coc {
            let price = if t.buy {
                slip.slip_up(q.high, t.pclose, slip.slip_open, false)
            } else {
                slip.slip_down(q.low, t.pclose, slip.slip_open, false)
            };
            if let Some(price) = price {
                self.execute(id, price, ExecAt::Created);
            }
            return;
        }
        if !self.config.coo && t.created_dt.is_some_and(|created| bar_dt <= created) {
            return;
        }
        let price = if t.buy {
            slip.slip_up(q.high, q.open, slip.slip_open, false)
        } else {
            slip.slip_down(q.low, q.open, slip.slip_open, false)
        };
        if let Some(price) = price {
            self.execute(id, price, ExecAt::Current);
        }
    }

    /// Fills at the close of the first bar at or past the end of the
    /// creation session. Without such a bar the close is annotated, and a
    /// later bar fills at that annotated close.
    fn exec_close(&mut self, id: OrderId, t: &Ticket, q: Quote, bar_dt: NaiveDateTime) {
        if t.created_dt.map_or(true, |created| bar_dt > created) {
            let session_end = match t.session_end {
                Some(end) => end,
                None => {
                    let end = self.calendar.session_bounds(bar_dt).1;
                    if let Some(order) = self.book.get_mut(id) {
                        order.session_end = Some(end);
                    }
                    end
                }
            };
            if bar_dt >= session_end {
                match t.annotated_close {
                    Some(close) if bar_dt > session_end => self.execute(id, close, ExecAt::Previous),
                    _ => self.execute(id, q.close, ExecAt::Current),
                }
                return;
            }
        }
        if let Some(order) = self.book.get_mut(id) {
            order.annotated_close = Some(q.close);
        }
    }

    /// Limit at or through the open fills at the better of the bar extreme and
    /// the limit; a limit inside the range fills exactly at the limit.
    fn exec_limit(&mut self, id: OrderId, buy: bool, q: Quote, limit: f64) {
        let slip = &self.config.slippage;
        let price = if buy {
            if limit >= q.open {
                let base = q.high.min(limit);
                slip.slip_up(base, base, slip.slip_open, true)
            } else if limit >= q.low {
                slip.slip_up(limit, limit, true, true)
            } else {
                None
            }
        } else if limit <= q.open {
            let base = q.low.max(limit);
            slip.slip_down(base, base, slip.slip_open, true)
        } else if limit <= q.high {
            slip.slip_down(limit, limit, true, true)
        } else {
            None
        };
        if let Some(price) = price {
            self.execute(id, price, ExecAt::Current);
        }
    }

    fn exec_stop(&mut self, id: OrderId, t: &Ticket, q: Quote) {
        let slip = &self.config.slippage;
        let stop = t.price;
        let price = if t.buy {
            if q.open >= stop {
                slip.slip_up(q.high, q.open, slip.slip_open, false)
            } else if q.high >= stop {
                slip.slip_up(q.high, stop, true, false)
            } else {
                None
            }
        } else if q.open <= stop {
            slip.slip_down(q.low, q.open, slip.slip_open, false)
        } else if q.low <= stop {
            slip.slip_down(q.low, stop, true, false)
        } else {
            None
        };
        if let Some(price) = price {
            self.execute(id, price, ExecAt::Current);
        }
        if t.exec_type == ExecType::StopTrail {
            self.trail_if_alive(id, q.close);
        }
    }

    /// Triggers on the stop, then fills as a limit. Same-bar fills after an
    /// intrabar trigger are only taken where the bar's direction pins the price.
    fn exec_stop_limit(&mut self, id: OrderId, t: &Ticket, q: Quote) {
        let stop = t.price;
        let Some(limit) = t.price_limit else {
            return;
        };
        let slip = self.config.slippage.clone();
        let triggered_at_open = if t.buy { q.open >= stop } else { q.open <= stop };
        let triggered_intrabar = if t.buy { q.high >= stop } else { q.low <= stop };

        if triggered_at_open {
            self.set_triggered(id);
            self.exec_limit(id, t.buy, q, limit);
        } else if triggered_intrabar {
            self.set_triggered(id);
            let price = if t.buy {
                if limit >= stop {
                    slip.slip_up(q.high, stop, true, true)
                } else if q.open > q.close && limit >= q.close {
                    Some(limit)
                } else {
                    None
                }
            } else if limit <= stop {
                slip.slip_down(q.low, stop, true, true)
            } else if q.open <= q.close && limit <= q.close {
                Some(limit)
            } else {
                None
            };
            if let Some(price) = price {
                self.execute(id, price, ExecAt::Current);
            }
        }

        if t.exec_type == ExecType::StopTrailLimit {
            self.trail_if_alive(id, q.close);
        }
    }

    fn set_triggered(&mut self, id: OrderId) {
        if let Some(order) = self.book.get_mut(id) {
            order.triggered = true;
        }
    }

    fn trail_if_alive(&mut self, id: OrderId, close: f64) {
        if let Some(order) = self.book.get_mut(id) {
            if order.is_alive() {
                order.trail_adjust(close);
            }
        }
    }
}
