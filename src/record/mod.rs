//! Session and frame records.
//!
//! A [`Session`] is created once per acquisition request; every [`FrameRecord`]
//! produced by that request references it. Frame values are stored in the encoded
//! field order of the channel registry.

pub mod table;
pub mod value;

use crate::acquisition::round4;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub use table::{ColumnSpec, Row, Table, TableSchema};
pub use value::{CellValue, ColumnKind};

/// Auto-incrementing session identifier ("research number").
pub type SessionId = i64;
/// Auto-incrementing frame identifier.
pub type FrameId = i64;

/// Session as requested, before persistence assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    /// Day of the acquisition
    pub date: NaiveDate,
    /// Operator name
    pub operator: String,
    /// Free-text comment
    pub comment: String,
}

/// Persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Research number
    pub id: SessionId,
    /// Day of the acquisition
    pub date: NaiveDate,
    /// Operator name
    pub operator: String,
    /// Free-text comment
    pub comment: String,
}

/// Frame as encoded, before persistence assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFrame {
    /// Owning session
    pub session_id: SessionId,
    /// Wall-clock time of capture
    pub captured_at: NaiveTime,
    /// Encoded fields in layout order
    pub values: Vec<f64>,
}

/// Persisted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Frame id
    pub id: FrameId,
    /// Owning session
    pub session_id: SessionId,
    /// Wall-clock time of capture
    pub captured_at: NaiveTime,
    /// Encoded fields in layout order
    pub values: Vec<f64>,
}

/// Partial edit of a persisted frame. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameUpdate {
    /// Move the frame to another session
    pub session_id: Option<SessionId>,
    /// Correct the capture time
    pub captured_at: Option<NaiveTime>,
    /// Replace every encoded field; rounded to four decimals like encoder output
    pub values: Option<Vec<f64>>,
}

impl FrameUpdate {
    /// Whether the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.session_id.is_none() && self.captured_at.is_none() && self.values.is_none()
    }

    /// Apply to a record in place.
    pub fn apply_to(&self, record: &mut FrameRecord) {
        if let Some(session_id) = self.session_id {
            record.session_id = session_id;
        }
        if let Some(captured_at) = self.captured_at {
            record.captured_at = captured_at;
        }
        if let Some(values) = &self.values {
            record.values = values.iter().copied().map(round4).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_rounds_values_like_the_encoder() {
        let mut record = FrameRecord {
            id: 1,
            session_id: 1,
            captured_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            values: vec![0.0, 0.0],
        };
        let update = FrameUpdate {
            values: Some(vec![101.333_333, f64::NAN]),
            ..Default::default()
        };
        update.apply_to(&mut record);
        assert_eq!(record.values[0], 101.3333);
        assert!(record.values[1].is_nan());
        assert_eq!(record.session_id, 1);
    }
}
