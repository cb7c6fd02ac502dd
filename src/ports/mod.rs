//! Port traits for the collaborators the engine talks to.

pub mod account_port;
pub mod config_port;
pub mod data_port;
pub mod order_port;
pub mod report_port;
pub mod trade_log_port;
