//! In-process broker for backtests.
//!
//! Implements [`OrderRouter`] and [`AccountPort`]. Orders are acknowledged
//! on submission and matched against each subsequent bar:
//!
//! - market orders fill at the open
//! - sell stops trigger on `low <= stop` and fill at `min(open, stop)`
//! - sell limits trigger on `high >= limit` and fill at `max(open, limit)`
//! - trailing stops ratchet to `high - distance` after the trigger check
//!
//! Within a bar, market orders go first, then stops, then limits. Sells are
//! capped at the held quantity.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::domain::error::TrendpilotError;
use crate::domain::ohlcv::Bar;
use crate::domain::order_intent::{OrderId, OrderIntent, OrderKind, OrderStatus, OrderUpdate, Side};
use crate::ports::account_port::AccountPort;
use crate::ports::order_port::OrderRouter;

#[derive(Debug, Clone)]
struct WorkingOrder {
    intent: OrderIntent,
    /// Current trigger level of a trailing stop.
    trail_stop: Option<f64>,
}

impl WorkingOrder {
    fn pass(&self) -> u8 {
        match self.intent.kind {
            OrderKind::Market => 0,
            OrderKind::Stop { .. } | OrderKind::TrailingStop { .. } => 1,
            OrderKind::Limit { .. } => 2,
        }
    }
}

#[derive(Debug)]
pub struct SimBroker {
    symbol: String,
    cash: f64,
    held: u64,
    commission_pct: f64,
    last_price: Option<f64>,
    clock: Option<NaiveDateTime>,
    working: Vec<WorkingOrder>,
    updates: VecDeque<OrderUpdate>,
    commission_paid: f64,
}

impl SimBroker {
    pub fn new(symbol: &str, initial_capital: f64, commission_pct: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            cash: initial_capital,
            held: 0,
            commission_pct,
            last_price: None,
            clock: None,
            working: Vec::new(),
            updates: VecDeque::new(),
            commission_paid: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn held(&self) -> u64 {
        self.held
    }

    pub fn commission_paid(&self) -> f64 {
        self.commission_paid
    }

    pub fn working_orders(&self) -> Vec<OrderId> {
        self.working.iter().map(|o| o.intent.id).collect()
    }

    /// Cash plus the position marked at the last seen close.
    pub fn equity(&self) -> f64 {
        self.cash + self.held as f64 * self.last_price.unwrap_or(0.0)
    }

    fn transport_error(&self, reason: String) -> TrendpilotError {
        TrendpilotError::Transport {
            symbol: self.symbol.clone(),
            timestamp: self.clock.unwrap_or_default(),
            reason,
        }
    }

    /// Match working orders against `bar`, then mark to its close.
    pub fn on_bar(&mut self, bar: &Bar) {
        self.clock = Some(bar.timestamp);

        let mut working = std::mem::take(&mut self.working);
        // stable: submission order is kept within each pass
        working.sort_by_key(WorkingOrder::pass);

        let mut still_working = Vec::with_capacity(working.len());
        for mut order in working {
            if self.try_fill(&mut order, bar) {
                continue;
            }
            if let OrderKind::TrailingStop { distance } = order.intent.kind {
                let ratchet = bar.high - distance;
                order.trail_stop = Some(order.trail_stop.map_or(ratchet, |s| s.max(ratchet)));
            }
            still_working.push(order);
        }
        self.working = still_working;
        self.last_price = Some(bar.close);
    }

    /// Returns true when the order left the book.
    fn try_fill(&mut self, order: &mut WorkingOrder, bar: &Bar) -> bool {
        let intent = &order.intent;
        if intent.side == Side::Buy {
            return match intent.kind {
                OrderKind::Market => {
                    self.buy(intent.id, intent.quantity, bar.open, bar.timestamp);
                    true
                }
                _ => {
                    self.push(intent.id, OrderStatus::Rejected {
                        reason: "only market buys are supported".into(),
                    });
                    true
                }
            };
        }

        if self.held == 0 {
            debug!(id = %intent.id, "nothing held, canceling exit order");
            self.push(intent.id, OrderStatus::Canceled);
            return true;
        }

        let price = match intent.kind {
            OrderKind::Market => Some(bar.open),
            OrderKind::Stop { price } => (bar.low <= price).then(|| bar.open.min(price)),
            OrderKind::TrailingStop { distance } => {
                let stop = *order.trail_stop.get_or_insert(bar.open - distance);
                (bar.low <= stop).then(|| bar.open.min(stop))
            }
            OrderKind::Limit { price } => (bar.high >= price).then(|| bar.open.max(price)),
        };

        match price {
            Some(price) => {
                let quantity = intent.quantity.min(self.held);
                self.sell(intent.id, quantity, price, bar.timestamp);
                true
            }
            None => false,
        }
    }

    fn buy(&mut self, id: OrderId, quantity: u64, price: f64, time: NaiveDateTime) {
        let notional = price * quantity as f64;
        let commission = notional * self.commission_pct;
        if notional + commission > self.cash {
            warn!(symbol = %self.symbol, %id, notional, cash = self.cash, "insufficient cash");
            self.push(id, OrderStatus::Rejected {
                reason: format!("insufficient cash: need {:.2}, have {:.2}", notional + commission, self.cash),
            });
            return;
        }
        self.cash -= notional + commission;
        self.commission_paid += commission;
        self.held += quantity;
        self.push(id, OrderStatus::Filled { price, time, quantity });
    }

    fn sell(&mut self, id: OrderId, quantity: u64, price: f64, time: NaiveDateTime) {
        let notional = price * quantity as f64;
        let commission = notional * self.commission_pct;
        self.cash += notional - commission;
        self.commission_paid += commission;
        self.held -= quantity;
        self.push(id, OrderStatus::Filled { price, time, quantity });
    }

    fn push(&mut self, id: OrderId, status: OrderStatus) {
        self.updates.push_back(OrderUpdate { id, status });
    }
}

impl OrderRouter for SimBroker {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), TrendpilotError> {
        if intent.quantity == 0 {
            return Err(self.transport_error(format!("order {} has zero quantity", intent.id)));
        }
        if self.working.iter().any(|o| o.intent.id == intent.id) {
            return Err(self.transport_error(format!("duplicate order id {}", intent.id)));
        }

        let trail_stop = match intent.kind {
            OrderKind::TrailingStop { distance } => self.last_price.map(|p| p - distance),
            _ => None,
        };
        self.working.push(WorkingOrder {
            intent: intent.clone(),
            trail_stop,
        });
        self.push(intent.id, OrderStatus::Submitted);
        Ok(())
    }

    fn cancel(&mut self, id: OrderId) -> Result<(), TrendpilotError> {
        match self.working.iter().position(|o| o.intent.id == id) {
            Some(idx) => {
                self.working.remove(idx);
                self.push(id, OrderStatus::Canceled);
            }
            None => {
                // already filled or canceled; answer so the caller stops waiting
                self.push(id, OrderStatus::Rejected {
                    reason: "no such working order".into(),
                });
            }
        }
        Ok(())
    }

    fn poll_updates(&mut self) -> Vec<OrderUpdate> {
        self.updates.drain(..).collect()
    }
}

impl AccountPort for SimBroker {
    fn available_capital(&self) -> Result<f64, TrendpilotError> {
        Ok(self.equity())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order_intent::OrderRole;
    use chrono::{Duration, NaiveDate};

    fn ts(i: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + Duration::minutes(i)
    }

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: ts(i),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    fn intent(id: u64, side: Side, quantity: u64, kind: OrderKind) -> OrderIntent {
        let role = match (side, kind) {
            (Side::Buy, _) => OrderRole::Entry,
            (_, OrderKind::Market) => OrderRole::MarketExit,
            (_, OrderKind::Limit { .. }) => OrderRole::TakeProfit,
            (_, OrderKind::Stop { .. }) => OrderRole::InitialStop,
            (_, OrderKind::TrailingStop { .. }) => OrderRole::TrailingStop,
        };
        OrderIntent {
            id: OrderId(id),
            role,
            side,
            quantity,
            kind,
        }
    }

    fn filled_at(updates: &[OrderUpdate], id: u64) -> Option<(f64, u64)> {
        updates.iter().find_map(|u| match u.status {
            OrderStatus::Filled { price, quantity, .. } if u.id == OrderId(id) => Some((price, quantity)),
            _ => None,
        })
    }

    fn broker_long(quantity: u64) -> SimBroker {
        let mut broker = SimBroker::new("TEST", 100_000.0, 0.0);
        broker
            .submit(&intent(1, Side::Buy, quantity, OrderKind::Market))
            .unwrap();
        broker.on_bar(&bar(0, 100.0, 101.0, 99.0, 100.0));
        broker.poll_updates();
        broker
    }

    #[test]
    fn market_buy_fills_at_next_open() {
        let mut broker = SimBroker::new("TEST", 10_000.0, 0.001);
        broker
            .submit(&intent(1, Side::Buy, 10, OrderKind::Market))
            .unwrap();
        let acks = broker.poll_updates();
        assert_eq!(acks[0].status, OrderStatus::Submitted);

        broker.on_bar(&bar(1, 50.0, 52.0, 49.0, 51.0));
        let updates = broker.poll_updates();
        assert_eq!(filled_at(&updates, 1), Some((50.0, 10)));
        assert_eq!(broker.held(), 10);
        assert!((broker.cash() - (10_000.0 - 500.0 - 0.5)).abs() < 1e-9);
        assert!((broker.equity() - (broker.cash() + 510.0)).abs() < 1e-9);
        assert!((broker.available_capital().unwrap() - broker.equity()).abs() < f64::EPSILON);
    }

    #[test]
    fn insufficient_cash_rejects() {
        let mut broker = SimBroker::new("TEST", 100.0, 0.0);
        broker
            .submit(&intent(1, Side::Buy, 10, OrderKind::Market))
            .unwrap();
        broker.on_bar(&bar(1, 50.0, 52.0, 49.0, 51.0));
        let updates = broker.poll_updates();
        assert!(matches!(updates[1].status, OrderStatus::Rejected { .. }));
        assert_eq!(broker.held(), 0);
    }

    #[test]
    fn stop_fills_at_worse_of_open_and_stop() {
        let mut broker = broker_long(100);
        broker
            .submit(&intent(2, Side::Sell, 100, OrderKind::Stop { price: 97.0 }))
            .unwrap();
        broker.on_bar(&bar(1, 98.0, 98.5, 97.5, 98.0));
        assert_eq!(filled_at(&broker.poll_updates(), 2), None);

        // gap down through the stop
        broker.on_bar(&bar(2, 95.0, 96.0, 94.0, 95.5));
        assert_eq!(filled_at(&broker.poll_updates(), 2), Some((95.0, 100)));
        assert_eq!(broker.held(), 0);
    }

    #[test]
    fn limit_fills_at_better_of_open_and_limit() {
        let mut broker = broker_long(100);
        broker
            .submit(&intent(2, Side::Sell, 50, OrderKind::Limit { price: 104.5 }))
            .unwrap();
        broker.on_bar(&bar(1, 103.0, 105.0, 102.0, 104.0));
        assert_eq!(filled_at(&broker.poll_updates(), 2), Some((104.5, 50)));
        assert_eq!(broker.held(), 50);
    }

    #[test]
    fn stop_is_checked_before_limit() {
        let mut broker = broker_long(100);
        broker
            .submit(&intent(2, Side::Sell, 100, OrderKind::Limit { price: 104.0 }))
            .unwrap();
        broker
            .submit(&intent(3, Side::Sell, 100, OrderKind::Stop { price: 97.0 }))
            .unwrap();
        broker.poll_updates();
        // wide bar touches both levels
        broker.on_bar(&bar(1, 100.0, 105.0, 96.0, 100.0));
        let updates = broker.poll_updates();
        assert_eq!(filled_at(&updates, 3), Some((97.0, 100)));
        assert_eq!(updates[1].id, OrderId(2));
        assert_eq!(updates[1].status, OrderStatus::Canceled);
    }

    #[test]
    fn trailing_stop_ratchets_up_only() {
        let mut broker = broker_long(50);
        broker
            .submit(&intent(2, Side::Sell, 50, OrderKind::TrailingStop { distance: 6.0 }))
            .unwrap();
        broker.poll_updates();

        // initial level: last close 100 - 6 = 94, ratchet to 108 - 6 = 102
        broker.on_bar(&bar(1, 104.0, 108.0, 103.0, 107.0));
        // lower high does not lower the stop
        broker.on_bar(&bar(2, 106.0, 106.5, 102.5, 104.0));
        assert!(broker.poll_updates().is_empty());

        broker.on_bar(&bar(3, 103.0, 103.5, 101.0, 101.5));
        assert_eq!(filled_at(&broker.poll_updates(), 2), Some((102.0, 50)));
    }

    #[test]
    fn sells_capped_at_holdings() {
        let mut broker = broker_long(30);
        broker
            .submit(&intent(2, Side::Sell, 100, OrderKind::Market))
            .unwrap();
        broker.on_bar(&bar(1, 101.0, 102.0, 100.0, 101.0));
        assert_eq!(filled_at(&broker.poll_updates(), 2), Some((101.0, 30)));
    }

    #[test]
    fn cancel_unknown_answers_rejected() {
        let mut broker = SimBroker::new("TEST", 1000.0, 0.0);
        broker.cancel(OrderId(9)).unwrap();
        let updates = broker.poll_updates();
        assert!(matches!(updates[0].status, OrderStatus::Rejected { .. }));
    }

    #[test]
    fn cancel_working_order() {
        let mut broker = broker_long(10);
        broker
            .submit(&intent(2, Side::Sell, 10, OrderKind::Stop { price: 90.0 }))
            .unwrap();
        broker.cancel(OrderId(2)).unwrap();
        let updates = broker.poll_updates();
        assert_eq!(updates.last().unwrap().status, OrderStatus::Canceled);
        assert!(broker.working_orders().is_empty());
    }

    #[test]
    fn duplicate_and_zero_orders_are_transport_errors() {
        let mut broker = SimBroker::new("TEST", 1000.0, 0.0);
        let order = intent(1, Side::Buy, 1, OrderKind::Market);
        broker.submit(&order).unwrap();
        let err = broker.submit(&order).unwrap_err();
        assert!(matches!(err, TrendpilotError::Transport { .. }));
        let err = broker
            .submit(&intent(2, Side::Buy, 0, OrderKind::Market))
            .unwrap_err();
        assert!(err.is_recoverable());
    }
}
