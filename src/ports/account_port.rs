//! Capital / account query port trait.

use crate::domain::error::TrendpilotError;

pub trait AccountPort {
    /// Capital available for sizing a new entry.
    fn available_capital(&self) -> Result<f64, TrendpilotError>;
}
