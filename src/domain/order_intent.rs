//! Order intents and their translation from lifecycle decisions.
//!
//! The core never talks to a broker. It emits [`Instruction`]s (submit or
//! cancel) tagged with its own [`OrderId`]s, and reads back [`OrderUpdate`]s
//! keyed by the same ids.

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::lifecycle::{Decision, EntryPlan, ProtectiveStop};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic id source owned by the engine.
#[derive(Debug, Clone, Default)]
pub struct OrderIdSequence {
    next: u64,
}

impl OrderIdSequence {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> OrderId {
        if self.next == 0 {
            self.next = 1;
        }
        let id = OrderId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    Market,
    Limit { price: f64 },
    Stop { price: f64 },
    TrailingStop { distance: f64 },
}

impl OrderKind {
    /// Market orders stay outstanding until they reach a terminal status;
    /// resting orders only until the router accepts them.
    pub fn is_market(&self) -> bool {
        matches!(self, OrderKind::Market)
    }
}

/// What an order is for within the position's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Entry,
    InitialStop,
    TakeProfit,
    TrailingStop,
    BreakevenStop,
    MarketExit,
}

impl OrderRole {
    pub fn is_protective_stop(self) -> bool {
        matches!(
            self,
            OrderRole::InitialStop | OrderRole::TrailingStop | OrderRole::BreakevenStop
        )
    }

    /// Exit orders that belong to the first stage of a staged exit.
    pub fn is_stage_one(self) -> bool {
        matches!(self, OrderRole::InitialStop | OrderRole::TakeProfit)
    }
}

impl fmt::Display for OrderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderRole::Entry => "entry",
            OrderRole::InitialStop => "initial_stop",
            OrderRole::TakeProfit => "take_profit",
            OrderRole::TrailingStop => "trailing_stop",
            OrderRole::BreakevenStop => "breakeven_stop",
            OrderRole::MarketExit => "market_exit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub id: OrderId,
    pub role: OrderRole,
    pub side: Side,
    pub quantity: u64,
    pub kind: OrderKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Submit(OrderIntent),
    Cancel(OrderId),
}

/// Everything the driver must route after one evaluation step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Action {
    pub instructions: Vec<Instruction>,
}

impl Action {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn submissions(&self) -> impl Iterator<Item = &OrderIntent> {
        self.instructions.iter().filter_map(|i| match i {
            Instruction::Submit(intent) => Some(intent),
            Instruction::Cancel(_) => None,
        })
    }

    pub fn cancellations(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.instructions.iter().filter_map(|i| match i {
            Instruction::Cancel(id) => Some(*id),
            Instruction::Submit(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatus {
    /// Accepted by the router and working.
    Submitted,
    Filled {
        price: f64,
        time: NaiveDateTime,
        quantity: u64,
    },
    Canceled,
    Rejected {
        reason: String,
    },
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Submitted)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdate {
    pub id: OrderId,
    pub status: OrderStatus,
}

/// Translate a lifecycle decision into routable instructions.
///
/// Cancels always precede submissions, so a stop replacement never leaves two
/// stage exits working at once.
pub fn build_instructions(decision: &Decision, ids: &mut OrderIdSequence) -> Vec<Instruction> {
    match decision {
        Decision::Hold => Vec::new(),
        Decision::Enter(plan) => entry_bracket(plan, ids),
        Decision::Promote {
            cancel,
            replacement,
            quantity,
        } => {
            let mut out: Vec<Instruction> = cancel.iter().copied().map(Instruction::Cancel).collect();
            let (role, kind) = match replacement {
                ProtectiveStop::Trailing { distance } => (
                    OrderRole::TrailingStop,
                    OrderKind::TrailingStop {
                        distance: *distance,
                    },
                ),
                ProtectiveStop::Fixed { price } => {
                    (OrderRole::BreakevenStop, OrderKind::Stop { price: *price })
                }
            };
            out.push(Instruction::Submit(OrderIntent {
                id: ids.next_id(),
                role,
                side: Side::Sell,
                quantity: *quantity,
                kind,
            }));
            out
        }
        Decision::Close { cancel, quantity } => {
            let mut out: Vec<Instruction> = cancel.iter().copied().map(Instruction::Cancel).collect();
            out.push(Instruction::Submit(OrderIntent {
                id: ids.next_id(),
                role: OrderRole::MarketExit,
                side: Side::Sell,
                quantity: *quantity,
                kind: OrderKind::Market,
            }));
            out
        }
        Decision::Cancel(ids_to_cancel) => ids_to_cancel
            .iter()
            .copied()
            .map(Instruction::Cancel)
            .collect(),
    }
}

fn entry_bracket(plan: &EntryPlan, ids: &mut OrderIdSequence) -> Vec<Instruction> {
    let mut out = vec![Instruction::Submit(OrderIntent {
        id: ids.next_id(),
        role: OrderRole::Entry,
        side: Side::Buy,
        quantity: plan.quantity,
        kind: OrderKind::Market,
    })];

    if let Some(tp) = plan.take_profit {
        out.push(Instruction::Submit(OrderIntent {
            id: ids.next_id(),
            role: OrderRole::TakeProfit,
            side: Side::Sell,
            quantity: tp.quantity,
            kind: OrderKind::Limit { price: tp.price },
        }));
    }

    if let Some(stop) = plan.stop_price {
        out.push(Instruction::Submit(OrderIntent {
            id: ids.next_id(),
            role: OrderRole::InitialStop,
            side: Side::Sell,
            quantity: plan.quantity,
            kind: OrderKind::Stop { price: stop },
        }));
    }

    out
}
