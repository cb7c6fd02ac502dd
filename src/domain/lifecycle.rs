//! Position lifecycle state machine.
//!
//! ```text
//! FLAT → ENTERED → PARTIAL_TP_HIT → TRAILING → FLAT
//!           └──────────────────────────────────┘
//! ```
//!
//! The manager exclusively owns the single open [`Position`]. It decides,
//! the order intent builder translates, and order updates drive the
//! transitions. While any order it emitted is still unacknowledged no new
//! entry or exit is decided.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::domain::indicator::IndicatorSet;
use crate::domain::ohlcv::Bar;
use crate::domain::order_intent::{
    Instruction, OrderId, OrderRole, OrderStatus, OrderUpdate,
};
use crate::domain::position::{ExitOrder, Position, TradeRecord};
use crate::domain::signal::EntrySignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Flat,
    Entered,
    PartialTpHit,
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrailMode {
    /// Trailing stop at `atr * multiplier` below the running high.
    Atr { multiplier: f64 },
    /// Fixed stop at the entry price.
    Breakeven,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitPolicy {
    /// Market exit once the close moves `take_profit_pct` up or
    /// `stop_loss_pct` down from entry (fractions).
    PercentBand {
        take_profit_pct: f64,
        stop_loss_pct: f64,
    },
    /// Full-size ATR take-profit and stop; the first fill cancels the other.
    AtrBracket {
        stop_multiplier: f64,
        take_profit_multiplier: f64,
    },
    /// Initial ATR stop plus a half-size take-profit, then promotion of the
    /// remainder to a trailing or breakeven stop.
    Staged {
        stop_multiplier: f64,
        risk_reward_ratio: f64,
        trail: TrailMode,
    },
}

impl ExitPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ExitPolicy::PercentBand { .. } => "percent_band",
            ExitPolicy::AtrBracket { .. } => "atr_bracket",
            ExitPolicy::Staged { .. } => "staged",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeProfit {
    pub price: f64,
    pub quantity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryPlan {
    pub quantity: u64,
    pub reference_price: f64,
    pub stop_price: Option<f64>,
    pub take_profit: Option<TakeProfit>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtectiveStop {
    Trailing { distance: f64 },
    Fixed { price: f64 },
}

/// What the lifecycle wants done. Translated by
/// [`build_instructions`](crate::domain::order_intent::build_instructions).
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Hold,
    Enter(EntryPlan),
    Promote {
        cancel: Vec<OrderId>,
        replacement: ProtectiveStop,
        quantity: u64,
    },
    Close {
        cancel: Vec<OrderId>,
        quantity: u64,
    },
    Cancel(Vec<OrderId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    /// Resting order waiting for the router to accept it.
    AwaitingAck,
    /// Market order waiting for a terminal status.
    AwaitingFill,
    AwaitingCancel,
}

#[derive(Debug, Clone)]
pub struct LifecycleManager {
    symbol: String,
    policy: ExitPolicy,
    state: LifecycleState,
    position: Option<Position>,
    in_flight: BTreeMap<OrderId, InFlight>,
    trades: Vec<TradeRecord>,
}

impl LifecycleManager {
    pub fn new(symbol: &str, policy: ExitPolicy) -> Self {
        Self {
            symbol: symbol.to_string(),
            policy,
            state: LifecycleState::Flat,
            position: None,
            in_flight: BTreeMap::new(),
            trades: Vec::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn policy(&self) -> &ExitPolicy {
        &self.policy
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn trades(&self) -> &[TradeRecord] {
        &self.trades
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn in_flight_ids(&self) -> Vec<OrderId> {
        self.in_flight.keys().copied().collect()
    }

    /// Open a position from a sized entry signal.
    ///
    /// # Panics
    ///
    /// When called while not `Flat`; a second concurrent position would
    /// corrupt the lifecycle.
    pub fn enter(
        &mut self,
        signal: &EntrySignal,
        atr: Option<f64>,
        quantity: u64,
        time: NaiveDateTime,
    ) -> Decision {
        assert_eq!(
            self.state,
            LifecycleState::Flat,
            "entry requested for {} while a position is open",
            self.symbol
        );
        assert!(self.position.is_none(), "flat lifecycle holds a position");

        if quantity == 0 {
            debug!(symbol = %self.symbol, "entry sized to zero, skipping");
            return Decision::Hold;
        }
        let price = signal.price;

        let (stop_price, take_profit) = match self.policy {
            ExitPolicy::PercentBand { .. } => (None, None),
            ExitPolicy::AtrBracket {
                stop_multiplier,
                take_profit_multiplier,
            } => {
                let Some(atr) = atr else {
                    return Decision::Hold;
                };
                let tp = TakeProfit {
                    price: price + atr * take_profit_multiplier,
                    quantity,
                };
                (Some(price - atr * stop_multiplier), Some(tp))
            }
            ExitPolicy::Staged {
                stop_multiplier,
                risk_reward_ratio,
                ..
            } => {
                let Some(atr) = atr else {
                    return Decision::Hold;
                };
                let stop = price - atr * stop_multiplier;
                let tp_qty = quantity / 2;
                let tp = (tp_qty > 0).then(|| TakeProfit {
                    price: price + (price - stop) * risk_reward_ratio,
                    quantity: tp_qty,
                });
                (Some(stop), tp)
            }
        };

        info!(
            symbol = %self.symbol,
            quantity,
            price,
            stop = ?stop_price,
            take_profit = ?take_profit.map(|t| t.price),
            pattern = %signal.pattern,
            "entering position"
        );

        self.position = Some(Position {
            // replaced by `attach` once the entry order has an id
            entry_order: OrderId(0),
            entry_price: price,
            entry_time: time,
            entry_filled: false,
            size: quantity,
            original_size: quantity,
            entry_atr: atr,
            initial_stop_price: stop_price,
            take_profit1_price: take_profit.map(|t| t.price),
            take_profit1_hit: false,
            trailing_active: false,
            exit_orders: Vec::new(),
            exit_fills: Vec::new(),
        });
        self.state = LifecycleState::Entered;

        Decision::Enter(EntryPlan {
            quantity,
            reference_price: price,
            stop_price,
            take_profit,
        })
    }

    /// Record the ids of instructions about to be routed.
    pub fn attach(&mut self, instructions: &[Instruction]) {
        for instruction in instructions {
            match instruction {
                Instruction::Submit(intent) => {
                    let flight = if intent.kind.is_market() {
                        InFlight::AwaitingFill
                    } else {
                        InFlight::AwaitingAck
                    };
                    self.in_flight.insert(intent.id, flight);

                    let Some(position) = self.position.as_mut() else {
                        continue;
                    };
                    if intent.role == OrderRole::Entry {
                        position.entry_order = intent.id;
                    } else {
                        position.exit_orders.push(ExitOrder {
                            id: intent.id,
                            role: intent.role,
                            quantity: intent.quantity,
                        });
                    }
                }
                Instruction::Cancel(id) => {
                    self.in_flight.insert(*id, InFlight::AwaitingCancel);
                }
            }
        }
    }

    /// Per-bar exit evaluation while holding a position.
    pub fn evaluate(&mut self, bar: &Bar, indicators: &IndicatorSet) -> Decision {
        if self.has_in_flight() {
            return Decision::Hold;
        }
        let Some(position) = self.position.as_mut() else {
            return Decision::Hold;
        };
        if !position.entry_filled {
            return Decision::Hold;
        }

        match (self.state, self.policy) {
            (
                LifecycleState::Entered,
                ExitPolicy::PercentBand {
                    take_profit_pct,
                    stop_loss_pct,
                },
            ) => {
                let gain = position.gain(bar.close);
                if gain >= take_profit_pct || gain <= -stop_loss_pct {
                    info!(symbol = %self.symbol, gain, close = bar.close, "percent band exit");
                    return Decision::Close {
                        cancel: Vec::new(),
                        quantity: position.size,
                    };
                }
                Decision::Hold
            }
            (LifecycleState::PartialTpHit, ExitPolicy::Staged { trail, .. }) => {
                let cancel: Vec<OrderId> = position
                    .exit_orders
                    .iter()
                    .filter(|o| o.role.is_stage_one())
                    .map(|o| o.id)
                    .collect();
                position.exit_orders.retain(|o| !o.role.is_stage_one());

                let replacement = match trail {
                    TrailMode::Atr { multiplier } => {
                        let atr = indicators.atr.or(position.entry_atr).unwrap_or(0.0);
                        ProtectiveStop::Trailing {
                            distance: atr * multiplier,
                        }
                    }
                    TrailMode::Breakeven => ProtectiveStop::Fixed {
                        price: position.entry_price,
                    },
                };

                position.trailing_active = true;
                self.state = LifecycleState::Trailing;
                info!(
                    symbol = %self.symbol,
                    remaining = position.size,
                    replacement = ?replacement,
                    "promoting to stage two stop"
                );
                Decision::Promote {
                    cancel,
                    replacement,
                    quantity: position.size,
                }
            }
            (_, ExitPolicy::AtrBracket { .. } | ExitPolicy::Staged { .. })
                if !position.has_protective_stop() =>
            {
                warn!(symbol = %self.symbol, "no protective stop working, closing position");
                let cancel = position.exit_orders.iter().map(|o| o.id).collect();
                position.exit_orders.clear();
                Decision::Close {
                    cancel,
                    quantity: position.size,
                }
            }
            _ => Decision::Hold,
        }
    }

    /// Apply a status update from the order router.
    pub fn on_order_update(&mut self, update: &OrderUpdate) -> Decision {
        self.settle_in_flight(update);

        let Some(position) = self.position.as_mut() else {
            debug!(id = %update.id, "update for order without an open position");
            return Decision::Hold;
        };

        if update.id == position.entry_order {
            return self.on_entry_update(update);
        }

        let Some(order) = position.exit_order(update.id).cloned() else {
            debug!(id = %update.id, "update for an order no longer tracked");
            return Decision::Hold;
        };

        match &update.status {
            OrderStatus::Submitted => Decision::Hold,
            OrderStatus::Filled {
                price,
                time,
                quantity,
            } => self.on_exit_fill(order, *price, *time, *quantity),
            OrderStatus::Canceled => {
                position.remove_exit_order(update.id);
                Decision::Hold
            }
            OrderStatus::Rejected { reason } => {
                warn!(symbol = %self.symbol, id = %update.id, role = %order.role, %reason, "exit order rejected");
                position.remove_exit_order(update.id);
                Decision::Hold
            }
        }
    }

    fn settle_in_flight(&mut self, update: &OrderUpdate) {
        let Some(flight) = self.in_flight.get(&update.id).copied() else {
            return;
        };
        let settled = match flight {
            InFlight::AwaitingAck => true,
            InFlight::AwaitingFill => update.status.is_terminal(),
            InFlight::AwaitingCancel => update.status.is_terminal(),
        };
        if settled {
            self.in_flight.remove(&update.id);
        }
    }

    fn on_entry_update(&mut self, update: &OrderUpdate) -> Decision {
        let Some(position) = self.position.as_mut() else {
            return Decision::Hold;
        };
        match &update.status {
            OrderStatus::Submitted => Decision::Hold,
            OrderStatus::Filled {
                price,
                time,
                quantity,
            } => {
                position.entry_price = *price;
                position.entry_time = *time;
                position.entry_filled = true;
                if *quantity != position.original_size {
                    debug!(
                        planned = position.original_size,
                        filled = quantity,
                        "entry filled at a different size"
                    );
                    position.size = *quantity;
                    position.original_size = *quantity;
                }
                info!(symbol = %self.symbol, price, quantity, "entry filled");
                Decision::Hold
            }
            OrderStatus::Canceled | OrderStatus::Rejected { .. } => {
                warn!(symbol = %self.symbol, status = ?update.status, "entry did not fill, standing down");
                let cancel: Vec<OrderId> = position.exit_orders.iter().map(|o| o.id).collect();
                self.position = None;
                self.state = LifecycleState::Flat;
                if cancel.is_empty() {
                    Decision::Hold
                } else {
                    Decision::Cancel(cancel)
                }
            }
        }
    }

    fn on_exit_fill(
        &mut self,
        order: ExitOrder,
        price: f64,
        time: NaiveDateTime,
        quantity: u64,
    ) -> Decision {
        let Some(position) = self.position.as_mut() else {
            return Decision::Hold;
        };

        let filled = quantity.min(position.size);
        position.size -= filled;
        position.exit_fills.push((price, filled));

        if quantity >= order.quantity {
            position.remove_exit_order(order.id);
        } else if let Some(o) = position.exit_orders.iter_mut().find(|o| o.id == order.id) {
            o.quantity -= quantity;
        }

        if position.size == 0 {
            return self.close(time, order.role);
        }

        if order.role == OrderRole::TakeProfit
            && self.state == LifecycleState::Entered
            && matches!(self.policy, ExitPolicy::Staged { .. })
        {
            position.take_profit1_hit = true;
            self.state = LifecycleState::PartialTpHit;
            info!(symbol = %self.symbol, price, remaining = position.size, "first take-profit filled");
        }
        Decision::Hold
    }

    fn close(&mut self, time: NaiveDateTime, reason: OrderRole) -> Decision {
        let Some(position) = self.position.take() else {
            return Decision::Hold;
        };
        let exit_price = position
            .average_exit_price()
            .unwrap_or(position.entry_price);
        let trade = TradeRecord::new(&self.symbol, &position, exit_price, time, reason);
        info!(
            symbol = %self.symbol,
            exit_price,
            pnl = trade.pnl,
            return_pct = trade.return_pct,
            reason = %reason,
            "position closed"
        );
        self.trades.push(trade);
        self.state = LifecycleState::Flat;

        let cancel: Vec<OrderId> = position.exit_orders.iter().map(|o| o.id).collect();
        if cancel.is_empty() {
            Decision::Hold
        } else {
            Decision::Cancel(cancel)
        }
    }
}
