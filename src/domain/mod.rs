//! Core domain types and decision logic.

pub mod backtest;
pub mod config;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod indicator;
pub mod lifecycle;
pub mod metrics;
pub mod ohlcv;
pub mod order_intent;
pub mod position;
pub mod signal;
pub mod sizing;
