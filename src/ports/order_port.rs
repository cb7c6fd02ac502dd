//! Order routing port trait.
//!
//! The router owns transport. The engine hands it intents tagged with the
//! engine's own [`OrderId`]s and later pulls status updates keyed by the
//! same ids.

use crate::domain::error::TrendpilotError;
use crate::domain::order_intent::{Instruction, OrderId, OrderIntent, OrderUpdate};

pub trait OrderRouter {
    fn submit(&mut self, intent: &OrderIntent) -> Result<(), TrendpilotError>;

    fn cancel(&mut self, id: OrderId) -> Result<(), TrendpilotError>;

    /// Status updates produced since the last poll, in order.
    fn poll_updates(&mut self) -> Vec<OrderUpdate>;

    /// Route one instruction.
    fn route(&mut self, instruction: &Instruction) -> Result<(), TrendpilotError> {
        match instruction {
            Instruction::Submit(intent) => self.submit(intent),
            Instruction::Cancel(id) => self.cancel(*id),
        }
    }
}
