//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different kinds of errors that can occur, from configuration problems to
//! hardware faults and persistence failures.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically file parsing or type mismatches
//!   in the configuration sources.
//! - **`Configuration`**: Semantic errors in the configuration that pass parsing but are
//!   logically wrong (e.g. a channel bound with `low > high`). Caught by validation at startup.
//! - **`Instrument`**: A plant read failed. The acquirer does not retry these; the whole
//!   acquisition batch is aborted.
//! - **`StabilityExhausted`**: A stable channel kept disagreeing with itself for too many
//!   consecutive sweeps.
//! - **`Cancelled`**: The acquisition was cancelled between two channel reads.
//! - **`Storage`** / **`Sqlite`** / **`Csv`** / **`LayoutMismatch`** / **`NotFound`**: persistence
//!   and export failures.
//!
//! A single stability violation is *not* an error: it is reported as a sweep outcome and the
//! sweep is retried.

use crate::channel::ChannelId;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrument error on channel {channel}: {message}")]
    Instrument { channel: ChannelId, message: String },

    #[error("Channel {channel} was unstable for {attempts} consecutive sweeps")]
    StabilityExhausted { channel: ChannelId, attempts: u32 },

    #[error("Acquisition cancelled")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Stored column layout does not match channel registry (expected [{expected}], found [{found}])")]
    LayoutMismatch { expected: String, found: String },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Whether the operator can simply try again (as opposed to fixing configuration
    /// or hardware first).
    pub fn can_recover(&self) -> bool {
        matches!(
            self,
            DaqError::StabilityExhausted { .. }
                | DaqError::Cancelled
                | DaqError::InvalidRequest(_)
                | DaqError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_error_names_channel() {
        let err = DaqError::Instrument {
            channel: 43,
            message: "timeout".into(),
        };
        assert_eq!(err.to_string(), "Instrument error on channel 43: timeout");
        assert!(!err.can_recover());
    }

    #[test]
    fn stability_exhaustion_is_recoverable() {
        let err = DaqError::StabilityExhausted {
            channel: 71,
            attempts: 10,
        };
        assert!(err.can_recover());
        assert!(err.to_string().contains("71"));
    }

    #[test]
    fn layout_mismatch_lists_both_layouts() {
        let err = DaqError::LayoutMismatch {
            expected: "temperature, pressure".into(),
            found: "temperature".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("expected [temperature, pressure]"));
        assert!(msg.contains("found [temperature]"));
    }
}
