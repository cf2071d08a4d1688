//! Channel declarations.
//!
//! A channel is one logical instrument signal on the plant, identified by a stable
//! integer id. Channels come in three classes:
//!
//! - **Base**: read once per sweep, optionally checked against an expected envelope.
//! - **Multi-sample**: read `samples` times in one burst, reduced to mean and variance.
//! - **Stable**: read one or more times per sweep; every reading within a sweep must agree.
//!
//! The set of channels and the order in which a sweep visits them live in
//! [`registry::ChannelRegistry`].

pub mod registry;

use crate::error::{AppResult, DaqError};
use crate::validation::is_ordered_bound;
use serde::Serialize;
use std::fmt;

pub use registry::{ChannelRegistry, FieldRole, FieldSpec};

/// Plant channel identifier.
pub type ChannelId = u32;

/// Expected physical envelope of a base channel, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelBound {
    low: f64,
    high: f64,
}

impl ChannelBound {
    /// Build a bound, rejecting `low > high` and non-finite values.
    pub fn new(low: f64, high: f64) -> AppResult<Self> {
        is_ordered_bound(low, high).map_err(|e| {
            DaqError::Configuration(format!("bound ({low}, {high}) is invalid: {e}"))
        })?;
        Ok(Self { low, high })
    }

    /// Lower edge.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper edge.
    pub fn high(&self) -> f64 {
        self.high
    }

    /// `true` when `value < low` or `value > high`.
    pub fn is_violated_by(&self, value: f64) -> bool {
        value < self.low || value > self.high
    }
}

impl fmt::Display for ChannelBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Channel class with its class-specific parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelKind {
    /// Single reading per sweep
    Base {
        /// Envelope that triggers an alert when left
        bound: Option<ChannelBound>,
    },
    /// Burst of readings reduced to mean and variance
    MultiSample {
        /// Burst size, at least 1
        samples: usize,
    },
    /// Repeated readings that must agree within one sweep
    Stable,
}

impl ChannelKind {
    /// Number of fields this channel contributes to an encoded frame.
    pub fn field_count(&self) -> usize {
        match self {
            ChannelKind::Base { .. } => 1,
            ChannelKind::MultiSample { .. } => 2,
            ChannelKind::Stable => 0,
        }
    }
}

/// A registered channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    /// Plant channel identifier
    pub id: ChannelId,
    /// Column name used in storage
    pub name: String,
    /// Header shown to the operator
    pub label: String,
    /// Channel class
    pub kind: ChannelKind,
}

impl Channel {
    /// Convenience constructor for a base channel.
    pub fn base(id: ChannelId, name: impl Into<String>, bound: Option<ChannelBound>) -> Self {
        let name = name.into();
        Self {
            id,
            label: name.clone(),
            name,
            kind: ChannelKind::Base { bound },
        }
    }

    /// Convenience constructor for a multi-sample channel.
    pub fn multi_sample(id: ChannelId, name: impl Into<String>, samples: usize) -> Self {
        let name = name.into();
        Self {
            id,
            label: name.clone(),
            name,
            kind: ChannelKind::MultiSample { samples },
        }
    }

    /// Convenience constructor for a stable channel.
    pub fn stable(id: ChannelId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            label: name.clone(),
            name,
            kind: ChannelKind::Stable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_rejects_inverted_pair() {
        assert!(ChannelBound::new(98.0, 50.0).is_err());
        assert!(ChannelBound::new(50.0, 98.0).is_ok());
    }

    #[test]
    fn bound_violation_is_strictly_outside() {
        let bound = ChannelBound::new(-21.0, 25.0).unwrap();
        assert!(bound.is_violated_by(26.0));
        assert!(bound.is_violated_by(-21.5));
        assert!(!bound.is_violated_by(0.0));
        assert!(!bound.is_violated_by(25.0));
        assert!(!bound.is_violated_by(-21.0));
    }

    #[test]
    fn field_counts() {
        assert_eq!(Channel::base(1, "t", None).kind.field_count(), 1);
        assert_eq!(Channel::multi_sample(6, "s", 7).kind.field_count(), 2);
        assert_eq!(Channel::stable(8, "r").kind.field_count(), 0);
    }
}
