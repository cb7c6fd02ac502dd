//! Open position state and closed trade records.

use chrono::NaiveDateTime;

use crate::domain::order_intent::{OrderId, OrderRole};

/// An exit order working against the open position.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitOrder {
    pub id: OrderId,
    pub role: OrderRole,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub entry_order: OrderId,
    /// Signal reference price until the entry fill replaces it.
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_filled: bool,
    /// Units still held.
    pub size: u64,
    /// Units bought at entry.
    pub original_size: u64,
    /// ATR at the entry bar, reused when the stop is promoted.
    pub entry_atr: Option<f64>,
    pub initial_stop_price: Option<f64>,
    pub take_profit1_price: Option<f64>,
    pub take_profit1_hit: bool,
    pub trailing_active: bool,
    pub exit_orders: Vec<ExitOrder>,
    /// (price, quantity) for every exit fill so far.
    pub exit_fills: Vec<(f64, u64)>,
}

impl Position {
    /// Fractional gain of `price` over the entry price.
    pub fn gain(&self, price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }

    pub fn has_protective_stop(&self) -> bool {
        self.exit_orders.iter().any(|o| o.role.is_protective_stop())
    }

    pub fn exit_order(&self, id: OrderId) -> Option<&ExitOrder> {
        self.exit_orders.iter().find(|o| o.id == id)
    }

    pub fn remove_exit_order(&mut self, id: OrderId) -> Option<ExitOrder> {
        let idx = self.exit_orders.iter().position(|o| o.id == id)?;
        Some(self.exit_orders.remove(idx))
    }

    /// Size-weighted average of all exit fills.
    pub fn average_exit_price(&self) -> Option<f64> {
        let qty: u64 = self.exit_fills.iter().map(|(_, q)| q).sum();
        if qty == 0 {
            return None;
        }
        let notional: f64 = self.exit_fills.iter().map(|(p, q)| p * *q as f64).sum();
        Some(notional / qty as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRecord {
    pub symbol: String,
    pub entry_time: NaiveDateTime,
    pub entry_price: f64,
    pub size: u64,
    pub exit_time: NaiveDateTime,
    pub exit_price: f64,
    pub pnl: f64,
    pub return_pct: f64,
    pub exit_reason: String,
}

impl TradeRecord {
    pub fn new(
        symbol: &str,
        position: &Position,
        exit_price: f64,
        exit_time: NaiveDateTime,
        exit_reason: OrderRole,
    ) -> Self {
        let size = position.original_size;
        let pnl = (exit_price - position.entry_price) * size as f64;
        let notional = position.entry_price * size as f64;
        let return_pct = if notional > 0.0 {
            pnl / notional * 100.0
        } else {
            0.0
        };
        TradeRecord {
            symbol: symbol.to_string(),
            entry_time: position.entry_time,
            entry_price: position.entry_price,
            size,
            exit_time,
            exit_price,
            pnl,
            return_pct,
            exit_reason: exit_reason.to_string(),
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
