//! Configuration access port trait.
//!
//! Typed getters return `default` when the key is absent. A key that is
//! present but does not parse is a `ConfigInvalid` error naming the key.

use crate::domain::error::TrendpilotError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, TrendpilotError>;
    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, TrendpilotError>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, TrendpilotError>;
}
