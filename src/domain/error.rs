//! Error types for the decision core and its collaborators.
//!
//! Missing indicator data and zero-sized orders are not errors; they are
//! represented as `None` and `0` respectively.

use chrono::NaiveDateTime;

/// Top-level error type for trendpilot.
#[derive(Debug, thiserror::Error)]
pub enum TrendpilotError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("transport failure for {symbol} at {timestamp}: {reason}")]
    Transport {
        symbol: String,
        timestamp: NaiveDateTime,
        reason: String,
    },

    #[error("bar at {received} does not follow previous bar at {previous}")]
    OutOfOrderBar {
        previous: NaiveDateTime,
        received: NaiveDateTime,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TrendpilotError {
    /// True for failures the driver may log and move past.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrendpilotError::Transport { .. } | TrendpilotError::OutOfOrderBar { .. }
        )
    }
}

impl From<&TrendpilotError> for std::process::ExitCode {
    fn from(err: &TrendpilotError) -> Self {
        let code: u8 = match err {
            TrendpilotError::Io(_) => 1,
            TrendpilotError::ConfigParse { .. }
            | TrendpilotError::ConfigMissing { .. }
            | TrendpilotError::ConfigInvalid { .. } => 2,
            TrendpilotError::Data { .. }
            | TrendpilotError::Csv(_)
            | TrendpilotError::OutOfOrderBar { .. } => 3,
            TrendpilotError::Transport { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
